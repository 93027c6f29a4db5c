use crate::activation::Activation;
use serde::{Deserialize, Serialize};
use std::{error::Error, fmt};

/// Shape and hyperparameters of a network, plus the name it is persisted under.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Unique name used as the persistence key.
    pub identifier: String,
    /// Number of observation values fed to the input layer.
    pub input_size: usize,
    /// Number of action values produced by the output layer.
    pub output_size: usize,
    /// Neuron count of each hidden layer, input side first. May be empty.
    pub hidden_layer_sizes: Vec<usize>,
    /// Step size of the per-sample gradient descent update.
    pub learning_rate: f32,
    /// Activation applied to every non-input layer.
    pub activation: Activation,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            identifier: "car".to_string(),
            input_size: 5,
            output_size: 2,
            hidden_layer_sizes: vec![6, 4],
            learning_rate: 0.01,
            activation: Activation::Tanh,
        }
    }
}

impl NetworkConfig {
    /// `[input_size] ++ hidden_layer_sizes ++ [output_size]`.
    pub fn layer_sizes(&self) -> Vec<usize> {
        let mut sizes = Vec::with_capacity(self.hidden_layer_sizes.len() + 2);
        sizes.push(self.input_size);
        sizes.extend_from_slice(&self.hidden_layer_sizes);
        sizes.push(self.output_size);
        sizes
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_identifier(&self.identifier)?;
        if self.input_size == 0 {
            return Err(ConfigError::ZeroInputSize);
        }
        if self.output_size == 0 {
            return Err(ConfigError::ZeroOutputSize);
        }
        if let Some(index) = self.hidden_layer_sizes.iter().position(|&s| s == 0) {
            return Err(ConfigError::ZeroHiddenLayer { index });
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ConfigError::InvalidLearningRate(self.learning_rate));
        }
        Ok(())
    }
}

/// Identifiers become file names under a store root, so they must be a single
/// non-empty path segment.
pub fn validate_identifier(identifier: &str) -> Result<(), ConfigError> {
    if identifier.trim().is_empty() {
        return Err(ConfigError::EmptyIdentifier);
    }
    if identifier.contains(['/', '\\']) || identifier.contains("..") {
        return Err(ConfigError::UnsafeIdentifier(identifier.to_string()));
    }
    Ok(())
}

/// Where the action vector of a tick comes from.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    PlayerControlled,
    #[default]
    NetworkControlled,
}

/// How (and whether) an agent trains its network.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TrainingMode {
    #[default]
    Disabled,
    /// Full-batch epochs over a recorded corpus once, before the first tick.
    Offline { epochs: usize },
    /// One backpropagation step per tick on the sample just used for inference.
    Continuous,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentSettings {
    /// Network shape and persistence key.
    pub network: NetworkConfig,
    /// Source of the per-tick action vector.
    pub mode: ControlMode,
    /// Append `(input, output)` pairs to the sample store while network-controlled.
    pub recording: bool,
    /// Training policy.
    pub training: TrainingMode,
    /// Deterministic seed for weight initialization.
    pub seed: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            mode: ControlMode::NetworkControlled,
            recording: false,
            training: TrainingMode::Disabled,
            seed: 42,
        }
    }
}

impl AgentSettings {
    pub const DEFAULT_EPOCHS: usize = 10_000;

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.network.validate()?;
        if let TrainingMode::Offline { epochs: 0 } = self.training {
            return Err(ConfigError::ZeroEpochs);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    EmptyIdentifier,
    /// Contains a path separator or `..`.
    UnsafeIdentifier(String),
    ZeroInputSize,
    ZeroOutputSize,
    ZeroHiddenLayer { index: usize },
    InvalidLearningRate(f32),
    ZeroEpochs,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EmptyIdentifier => write!(f, "network identifier must not be empty"),
            ConfigError::UnsafeIdentifier(id) => write!(
                f,
                "network identifier '{id}' must not contain '/', '\\' or '..'"
            ),
            ConfigError::ZeroInputSize => write!(f, "input_size must be positive"),
            ConfigError::ZeroOutputSize => write!(f, "output_size must be positive"),
            ConfigError::ZeroHiddenLayer { index } => {
                write!(f, "hidden layer {index} must have at least one neuron")
            }
            ConfigError::InvalidLearningRate(rate) => {
                write!(f, "learning_rate must be finite and positive, got {rate}")
            }
            ConfigError::ZeroEpochs => write!(f, "offline training needs at least one epoch"),
        }
    }
}

impl Error for ConfigError {}
