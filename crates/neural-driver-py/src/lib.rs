use neural_driver_core::config::AgentSettings;
use neural_driver_core::config::NetworkConfig;
use neural_driver_core::nn::MultilayerPerceptron;
use neural_driver_core::persistence::{self, DirStore, PersistenceError};
use neural_driver_core::samples::{Sample, SampleStore};
use neural_driver_core::train::train;
use pyo3::exceptions::{PyIOError, PyValueError};
use pyo3::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;
use std::path::PathBuf;

/// PyO3 module exposing neural-driver-core to Python.
#[pyfunction]
fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[pyfunction]
fn default_config_json() -> PyResult<String> {
    serde_json::to_string(&AgentSettings::default())
        .map_err(|e| PyValueError::new_err(format!("failed to serialize default config: {e}")))
}

#[pyfunction]
fn validate_config_json(config_json: &str) -> PyResult<bool> {
    let settings: AgentSettings = serde_json::from_str(config_json)
        .map_err(|e| PyValueError::new_err(format!("invalid config json: {e}")))?;
    settings
        .validate()
        .map(|_| true)
        .map_err(|e| PyValueError::new_err(format!("invalid agent configuration: {e}")))
}

fn persistence_err(err: PersistenceError) -> PyErr {
    match err {
        PersistenceError::NotFound { .. } | PersistenceError::Io { .. } => {
            PyIOError::new_err(err.to_string())
        }
        PersistenceError::Format { .. }
        | PersistenceError::Shape(_)
        | PersistenceError::NonFinite { .. }
        | PersistenceError::Identifier(_) => PyValueError::new_err(err.to_string()),
    }
}

fn samples_from_pairs(pairs: Vec<(Vec<f32>, Vec<f32>)>) -> SampleStore {
    pairs
        .into_iter()
        .map(|(input, output)| Sample::new(input, output))
        .collect()
}

/// A multilayer perceptron owned by Python.
#[pyclass(name = "Network")]
struct PyNetwork {
    inner: MultilayerPerceptron,
}

#[pymethods]
impl PyNetwork {
    /// Build a randomly initialized network from a `NetworkConfig` JSON
    /// document. Without a seed, one is drawn from the OS.
    #[new]
    #[pyo3(signature = (config_json, seed=None))]
    fn new(config_json: &str, seed: Option<u64>) -> PyResult<Self> {
        let config: NetworkConfig = serde_json::from_str(config_json)
            .map_err(|e| PyValueError::new_err(format!("invalid network config json: {e}")))?;
        let seed = seed.unwrap_or_else(|| rand::rng().random());
        let mut rng = ChaCha12Rng::seed_from_u64(seed);
        let inner = MultilayerPerceptron::try_new(config, &mut rng)
            .map_err(|e| PyValueError::new_err(format!("invalid network configuration: {e}")))?;
        Ok(Self { inner })
    }

    #[getter]
    fn identifier(&self) -> String {
        self.inner.config().identifier.clone()
    }

    #[getter]
    fn layer_sizes(&self) -> Vec<usize> {
        self.inner.layer_sizes().to_vec()
    }

    #[getter]
    fn last_cost(&self) -> f32 {
        self.inner.last_cost()
    }

    fn feed_forward(&mut self, input: Vec<f32>) -> PyResult<Vec<f32>> {
        self.inner
            .feed_forward(&input)
            .map(<[f32]>::to_vec)
            .map_err(|e| PyValueError::new_err(e.to_string()))
    }

    /// One gradient step; returns the cost before the update.
    fn back_propagate(&mut self, input: Vec<f32>, expected: Vec<f32>) -> PyResult<f32> {
        self.inner
            .back_propagate(&input, &expected)
            .map_err(|e| PyValueError::new_err(e.to_string()))
    }

    /// Offline epochs over `(input, output)` pairs; returns the final mean cost.
    fn train(&mut self, samples: Vec<(Vec<f32>, Vec<f32>)>, epochs: usize) -> PyResult<f32> {
        let samples = samples_from_pairs(samples);
        train(&mut self.inner, &samples, epochs)
            .map(|report| report.final_cost)
            .map_err(|e| PyValueError::new_err(e.to_string()))
    }

    fn to_json(&self) -> PyResult<String> {
        let bytes = persistence::encode_network(&self.inner).map_err(persistence_err)?;
        String::from_utf8(bytes)
            .map_err(|e| PyValueError::new_err(format!("snapshot is not utf-8: {e}")))
    }

    #[staticmethod]
    fn from_json(json: &str) -> PyResult<Self> {
        persistence::decode_network(json.as_bytes())
            .map(|inner| Self { inner })
            .map_err(persistence_err)
    }

    /// Save under `<root>/brains/<identifier>.json`.
    fn save(&self, root: PathBuf) -> PyResult<()> {
        persistence::save_network(&mut DirStore::new(root), &self.inner).map_err(persistence_err)
    }

    #[staticmethod]
    fn load(root: PathBuf, identifier: &str) -> PyResult<Self> {
        persistence::load_network(&DirStore::new(root), identifier)
            .map(|inner| Self { inner })
            .map_err(persistence_err)
    }
}

#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(version, m)?)?;
    m.add_function(wrap_pyfunction!(default_config_json, m)?)?;
    m.add_function(wrap_pyfunction!(validate_config_json, m)?)?;
    m.add_class::<PyNetwork>()?;
    Ok(())
}
