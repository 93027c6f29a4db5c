pub mod activation;
pub mod agent;
pub mod config;
pub mod fleet;
pub mod nn;
pub mod persistence;
pub mod rng;
pub mod samples;
pub mod track;
pub mod train;

pub use activation::Activation;
pub use agent::{AgentError, AgentLoop, AgentStats, Environment, PlayerInput, TickReport};
pub use config::{AgentSettings, ConfigError, ControlMode, NetworkConfig, TrainingMode};
pub use fleet::Fleet;
pub use nn::{MlpError, MultilayerPerceptron};
pub use persistence::{BlobStore, BrainSource, DirStore, MemoryStore, PersistenceError};
pub use samples::{Sample, SampleStore};
pub use track::{Track, TrackConfig};
pub use train::{train, TrainError, TrainReport};
