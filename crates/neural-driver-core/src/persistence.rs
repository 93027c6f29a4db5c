//! Durable storage of trained networks and recorded sample corpora.
//!
//! Storage goes through an injected [`BlobStore`] so callers decide where bytes
//! live. Networks are stored under `brains/<identifier>.json` and corpora under
//! `records/<identifier>.json`; both are whole-document overwrites.

use crate::activation::Activation;
use crate::config::{self, ConfigError, NetworkConfig};
use crate::nn::{MlpError, MultilayerPerceptron};
use crate::samples::SampleStore;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::{error::Error, fmt, fs, io};

const BRAINS_DIR: &str = "brains";
const RECORDS_DIR: &str = "records";

/// Byte storage addressed by relative keys such as `brains/car.json`.
pub trait BlobStore {
    /// `Ok(None)` when nothing is stored under `key`.
    fn read(&self, key: &str) -> io::Result<Option<Vec<u8>>>;
    fn write(&mut self, key: &str, bytes: &[u8]) -> io::Result<()>;
}

/// Files below a root directory; parent directories are created on write.
#[derive(Clone, Debug)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        key.split('/')
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }
}

impl BlobStore for DirStore {
    fn read(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, key: &str, bytes: &[u8]) -> io::Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, bytes)
    }
}

/// In-process store, mainly for tests and bindings.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    blobs: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.blobs.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl BlobStore for MemoryStore {
    fn read(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self.blobs.get(key).cloned())
    }

    fn write(&mut self, key: &str, bytes: &[u8]) -> io::Result<()> {
        self.blobs.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

pub fn network_key(identifier: &str) -> String {
    format!("{BRAINS_DIR}/{identifier}.json")
}

pub fn samples_key(identifier: &str) -> String {
    format!("{RECORDS_DIR}/{identifier}.json")
}

#[derive(Debug)]
pub enum PersistenceError {
    /// Nothing has been saved under `key` yet.
    NotFound { key: String },
    Io { key: String, source: io::Error },
    Format {
        key: String,
        source: serde_json::Error,
    },
    /// The stored parameters do not fit the stored configuration.
    Shape(MlpError),
    /// NaN or infinite parameters have no JSON form; saving is refused.
    NonFinite { identifier: String },
    /// The identifier cannot be used as a storage key.
    Identifier(ConfigError),
}

impl PersistenceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, PersistenceError::NotFound { .. })
    }
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceError::NotFound { key } => write!(f, "no snapshot stored under '{key}'"),
            PersistenceError::Io { key, source } => write!(f, "storage error for '{key}': {source}"),
            PersistenceError::Format { key, source } => {
                write!(f, "malformed document '{key}': {source}")
            }
            PersistenceError::Shape(e) => write!(f, "stored network is inconsistent: {e}"),
            PersistenceError::NonFinite { identifier } => write!(
                f,
                "network '{identifier}' has non-finite parameters and cannot be saved"
            ),
            PersistenceError::Identifier(e) => write!(f, "{e}"),
        }
    }
}

impl Error for PersistenceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PersistenceError::NotFound { .. } | PersistenceError::NonFinite { .. } => None,
            PersistenceError::Identifier(e) => Some(e),
            PersistenceError::Io { source, .. } => Some(source),
            PersistenceError::Format { source, .. } => Some(source),
            PersistenceError::Shape(e) => Some(e),
        }
    }
}

/// Persisted form of a network: its configuration flattened next to the
/// learned parameters.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NetworkSnapshot {
    pub identifier: String,
    pub input_size: usize,
    pub output_size: usize,
    pub hidden_layer_sizes: Vec<usize>,
    pub learning_rate: f32,
    #[serde(default)]
    pub activation: Activation,
    /// Per layer, per neuron, per incoming connection.
    pub weights: Vec<Vec<Vec<f32>>>,
    /// Per layer, per neuron.
    pub biases: Vec<Vec<f32>>,
}

impl From<&MultilayerPerceptron> for NetworkSnapshot {
    fn from(net: &MultilayerPerceptron) -> Self {
        let cfg = net.config();
        Self {
            identifier: cfg.identifier.clone(),
            input_size: cfg.input_size,
            output_size: cfg.output_size,
            hidden_layer_sizes: cfg.hidden_layer_sizes.clone(),
            learning_rate: cfg.learning_rate,
            activation: cfg.activation,
            weights: net.weights().to_vec(),
            biases: net.biases().to_vec(),
        }
    }
}

impl NetworkSnapshot {
    pub fn config(&self) -> NetworkConfig {
        NetworkConfig {
            identifier: self.identifier.clone(),
            input_size: self.input_size,
            output_size: self.output_size,
            hidden_layer_sizes: self.hidden_layer_sizes.clone(),
            learning_rate: self.learning_rate,
            activation: self.activation,
        }
    }

    pub fn into_network(self) -> Result<MultilayerPerceptron, MlpError> {
        let config = self.config();
        MultilayerPerceptron::from_parts(config, self.weights, self.biases)
    }
}

/// Serialize a network's configuration and parameters. Fails rather than
/// writing a document that could not be decoded again.
pub fn encode_network(net: &MultilayerPerceptron) -> Result<Vec<u8>, PersistenceError> {
    let identifier = &net.config().identifier;
    let finite = net.weights().iter().flatten().flatten().all(|w| w.is_finite())
        && net.biases().iter().flatten().all(|b| b.is_finite());
    if !finite {
        return Err(PersistenceError::NonFinite {
            identifier: identifier.clone(),
        });
    }
    serde_json::to_vec(&NetworkSnapshot::from(net)).map_err(|source| PersistenceError::Format {
        key: network_key(identifier),
        source,
    })
}

fn checked_key(identifier: &str, key: fn(&str) -> String) -> Result<String, PersistenceError> {
    config::validate_identifier(identifier).map_err(PersistenceError::Identifier)?;
    Ok(key(identifier))
}

pub fn decode_network(bytes: &[u8]) -> Result<MultilayerPerceptron, PersistenceError> {
    decode_network_at("<bytes>", bytes)
}

fn decode_network_at(key: &str, bytes: &[u8]) -> Result<MultilayerPerceptron, PersistenceError> {
    let snapshot: NetworkSnapshot =
        serde_json::from_slice(bytes).map_err(|source| PersistenceError::Format {
            key: key.to_string(),
            source,
        })?;
    snapshot.into_network().map_err(PersistenceError::Shape)
}

fn read_required<S: BlobStore + ?Sized>(store: &S, key: &str) -> Result<Vec<u8>, PersistenceError> {
    store
        .read(key)
        .map_err(|source| PersistenceError::Io {
            key: key.to_string(),
            source,
        })?
        .ok_or_else(|| PersistenceError::NotFound {
            key: key.to_string(),
        })
}

fn write_blob<S: BlobStore + ?Sized>(
    store: &mut S,
    key: &str,
    bytes: &[u8],
) -> Result<(), PersistenceError> {
    store.write(key, bytes).map_err(|source| PersistenceError::Io {
        key: key.to_string(),
        source,
    })
}

pub fn save_network<S: BlobStore + ?Sized>(
    store: &mut S,
    net: &MultilayerPerceptron,
) -> Result<(), PersistenceError> {
    let key = checked_key(&net.config().identifier, network_key)?;
    let bytes = encode_network(net)?;
    write_blob(store, &key, &bytes)?;
    log::info!("saved network to '{key}'");
    Ok(())
}

pub fn load_network<S: BlobStore + ?Sized>(
    store: &S,
    identifier: &str,
) -> Result<MultilayerPerceptron, PersistenceError> {
    let key = checked_key(identifier, network_key)?;
    let bytes = read_required(store, &key)?;
    let net = decode_network_at(&key, &bytes)?;
    log::info!("restored network from '{key}'");
    Ok(net)
}

/// Whether a network came from storage or from fresh random initialization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrainSource {
    Restored,
    Fresh,
}

/// Restore the snapshot saved for `config.identifier`, or build a randomly
/// initialized network when none exists. Storage and format failures are
/// returned instead of falling back.
///
/// A restored network keeps its stored configuration; `config` only names it.
pub fn load_or_init<S: BlobStore + ?Sized, R: Rng + ?Sized>(
    store: &S,
    config: &NetworkConfig,
    rng: &mut R,
) -> Result<(MultilayerPerceptron, BrainSource), PersistenceError> {
    match load_network(store, &config.identifier) {
        Ok(net) => Ok((net, BrainSource::Restored)),
        Err(PersistenceError::NotFound { key }) => {
            log::info!("no snapshot at '{key}', initializing fresh network");
            let net = MultilayerPerceptron::try_new(config.clone(), rng)
                .map_err(|e| PersistenceError::Shape(e.into()))?;
            Ok((net, BrainSource::Fresh))
        }
        Err(e) => Err(e),
    }
}

pub fn save_samples<S: BlobStore + ?Sized>(
    store: &mut S,
    identifier: &str,
    samples: &SampleStore,
) -> Result<(), PersistenceError> {
    let key = checked_key(identifier, samples_key)?;
    let bytes = serde_json::to_vec(samples).map_err(|source| PersistenceError::Format {
        key: key.clone(),
        source,
    })?;
    write_blob(store, &key, &bytes)?;
    log::info!("saved {} samples to '{key}'", samples.len());
    Ok(())
}

pub fn load_samples<S: BlobStore + ?Sized>(
    store: &S,
    identifier: &str,
) -> Result<SampleStore, PersistenceError> {
    let key = checked_key(identifier, samples_key)?;
    let bytes = read_required(store, &key)?;
    serde_json::from_slice(&bytes).map_err(|source| PersistenceError::Format { key, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::create_rng;
    use crate::samples::Sample;

    fn config(identifier: &str) -> NetworkConfig {
        NetworkConfig {
            identifier: identifier.into(),
            input_size: 3,
            output_size: 2,
            hidden_layer_sizes: vec![5, 4],
            learning_rate: 0.05,
            ..NetworkConfig::default()
        }
    }

    /// Store whose every operation fails, standing in for a broken disk.
    struct FailingStore;

    impl BlobStore for FailingStore {
        fn read(&self, _key: &str) -> io::Result<Option<Vec<u8>>> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
        }

        fn write(&mut self, _key: &str, _bytes: &[u8]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
        }
    }

    #[test]
    fn network_round_trip_is_exact() {
        let mut net = MultilayerPerceptron::seeded(config("car"), 17).expect("valid config");
        net.back_propagate(&[0.1, 0.2, 0.3], &[0.4, -0.4])
            .expect("valid sample");

        let bytes = encode_network(&net).expect("finite parameters");
        let mut restored = decode_network(&bytes).expect("snapshot decodes");
        assert_eq!(restored.config(), net.config());
        assert_eq!(restored.weights(), net.weights());
        assert_eq!(restored.biases(), net.biases());

        let probes = [[0.0, 0.0, 0.0], [1.0, -1.0, 0.5], [0.33, 0.66, 0.99]];
        for probe in &probes {
            let a = net.feed_forward(probe).expect("valid input").to_vec();
            let b = restored.feed_forward(probe).expect("valid input").to_vec();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn snapshot_uses_documented_field_names() {
        let net = MultilayerPerceptron::seeded(config("kart"), 1).expect("valid config");
        let bytes = encode_network(&net).expect("finite parameters");
        let value: serde_json::Value = serde_json::from_slice(&bytes).expect("snapshot is json");
        for field in [
            "identifier",
            "input_size",
            "output_size",
            "hidden_layer_sizes",
            "learning_rate",
            "weights",
            "biases",
        ] {
            assert!(value.get(field).is_some(), "missing field {field}");
        }
        assert_eq!(value["weights"][0].as_array().map(Vec::len), Some(5));
        assert_eq!(value["weights"][0][0].as_array().map(Vec::len), Some(3));
    }

    #[test]
    fn load_missing_network_is_not_found() {
        let store = MemoryStore::new();
        let err = load_network(&store, "ghost").expect_err("nothing stored");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "no snapshot stored under 'brains/ghost.json'");
    }

    #[test]
    fn load_or_init_prefers_stored_snapshot() {
        let mut store = MemoryStore::new();
        let mut rng = create_rng(3);

        let (fresh, source) = load_or_init(&store, &config("car"), &mut rng).expect("fresh init");
        assert_eq!(source, BrainSource::Fresh);
        save_network(&mut store, &fresh).expect("memory store accepts writes");
        assert!(store.contains("brains/car.json"));

        let (restored, source) =
            load_or_init(&store, &config("car"), &mut rng).expect("snapshot exists");
        assert_eq!(source, BrainSource::Restored);
        assert_eq!(restored.weights(), fresh.weights());
    }

    #[test]
    fn io_failures_are_surfaced_not_swallowed() {
        let mut rng = create_rng(0);
        let err = load_or_init(&FailingStore, &config("car"), &mut rng)
            .expect_err("read failure must propagate");
        assert!(matches!(err, PersistenceError::Io { .. }));

        let net = MultilayerPerceptron::seeded(config("car"), 0).expect("valid config");
        let before = net.weights().to_vec();
        let err = save_network(&mut FailingStore, &net).expect_err("write failure");
        assert!(matches!(err, PersistenceError::Io { .. }));
        assert_eq!(net.weights(), before.as_slice());
    }

    #[test]
    fn non_finite_network_is_not_saved_over_a_good_snapshot() {
        let mut store = MemoryStore::new();
        let mut net = MultilayerPerceptron::seeded(config("car"), 5).expect("valid config");
        save_network(&mut store, &net).expect("finite network saves");
        let good = load_network(&store, "car").expect("good snapshot");

        net.back_propagate(&[f32::NAN, 0.0, 0.0], &[0.5, 0.5])
            .expect("shapes are valid");
        assert!(net.weights().iter().flatten().flatten().any(|w| w.is_nan()));

        let err = save_network(&mut store, &net).expect_err("NaN has no json form");
        assert!(matches!(
            err,
            PersistenceError::NonFinite { ref identifier } if identifier == "car"
        ));
        assert!(matches!(
            encode_network(&net),
            Err(PersistenceError::NonFinite { .. })
        ));
        let still = load_network(&store, "car").expect("previous snapshot survives");
        assert_eq!(still.weights(), good.weights());
    }

    #[test]
    fn path_like_identifiers_are_refused_by_the_store_helpers() {
        let mut store = MemoryStore::new();
        let err = load_network(&store, "../escape").expect_err("unsafe identifier");
        assert!(matches!(
            err,
            PersistenceError::Identifier(ConfigError::UnsafeIdentifier(_))
        ));
        let err = save_samples(&mut store, "records/../x", &SampleStore::new())
            .expect_err("unsafe identifier");
        assert!(matches!(err, PersistenceError::Identifier(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn corrupt_snapshot_is_a_format_error() {
        let mut store = MemoryStore::new();
        store
            .write(&network_key("car"), b"{ not json")
            .expect("memory store accepts writes");
        let err = load_network(&store, "car").expect_err("corrupt document");
        assert!(matches!(err, PersistenceError::Format { .. }));
    }

    #[test]
    fn inconsistent_snapshot_is_a_shape_error() {
        let net = MultilayerPerceptron::seeded(config("car"), 2).expect("valid config");
        let mut snapshot = NetworkSnapshot::from(&net);
        snapshot.hidden_layer_sizes = vec![5, 3];
        let bytes = serde_json::to_vec(&snapshot).expect("snapshot serializes");
        let err = decode_network(&bytes).expect_err("shape no longer matches");
        assert!(matches!(err, PersistenceError::Shape(MlpError::ShapeMismatch { .. })));
    }

    #[test]
    fn samples_round_trip_and_overwrite() {
        let mut store = MemoryStore::new();
        let first: SampleStore = vec![Sample::new(vec![0.25, 0.5], vec![1.0, -1.0])].into();
        save_samples(&mut store, "car", &first).expect("save");
        assert_eq!(load_samples(&store, "car").expect("load"), first);

        let second: SampleStore = vec![
            Sample::new(vec![0.0, 0.0], vec![0.0, 0.0]),
            Sample::new(vec![0.1, 0.9], vec![0.3, 0.7]),
        ]
        .into();
        save_samples(&mut store, "car", &second).expect("save");
        assert_eq!(load_samples(&store, "car").expect("load"), second);

        assert!(load_samples(&store, "kart")
            .expect_err("no corpus for kart")
            .is_not_found());
    }

    #[test]
    fn dir_store_creates_namespaces_on_disk() {
        let root = std::env::temp_dir().join(format!(
            "neural-driver-dirstore-{}-{}",
            std::process::id(),
            line!()
        ));
        let mut store = DirStore::new(&root);
        assert_eq!(store.read("brains/car.json").expect("readable"), None);

        let net = MultilayerPerceptron::seeded(config("car"), 9).expect("valid config");
        save_network(&mut store, &net).expect("write to temp dir");
        assert!(root.join("brains").join("car.json").is_file());
        let restored = load_network(&store, "car").expect("read back");
        assert_eq!(restored.biases(), net.biases());

        fs::remove_dir_all(&root).expect("cleanup temp dir");
    }
}
