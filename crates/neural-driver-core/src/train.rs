use crate::nn::{MlpError, MultilayerPerceptron};
use crate::samples::SampleStore;
use serde::{Deserialize, Serialize};
use std::{error::Error, fmt};

/// Epoch interval between `debug` progress lines.
const LOG_EVERY_EPOCHS: usize = 1_000;

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct TrainReport {
    pub epochs: usize,
    pub samples: usize,
    /// Mean per-sample cost over the last epoch (0 when nothing ran).
    pub final_cost: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrainError {
    /// Training was requested but no sample source is configured.
    MissingTrainingData,
}

impl fmt::Display for TrainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainError::MissingTrainingData => {
                write!(f, "no training data available, training skipped")
            }
        }
    }
}

impl Error for TrainError {}

/// Full-batch offline training: every epoch backpropagates each sample once,
/// in stored order. No shuffling, early stopping or convergence check.
///
/// The whole corpus is shape-checked first, so a bad sample leaves the
/// network untouched.
pub fn train(
    network: &mut MultilayerPerceptron,
    samples: &SampleStore,
    epochs: usize,
) -> Result<TrainReport, MlpError> {
    samples.validate_shape(network.input_size(), network.output_size())?;

    let mut final_cost = 0.0f32;
    for epoch in 1..=epochs {
        let mut epoch_cost = 0.0f32;
        for sample in samples {
            epoch_cost += network.back_propagate(&sample.input, &sample.output)?;
        }
        if !samples.is_empty() {
            epoch_cost /= samples.len() as f32;
        }
        final_cost = epoch_cost;
        if epoch % LOG_EVERY_EPOCHS == 0 {
            log::debug!(
                "network '{}' epoch {epoch}/{epochs}: mean cost {epoch_cost:.6}",
                network.config().identifier
            );
        }
    }

    log::info!(
        "trained network '{}' for {epochs} epochs on {} samples (final mean cost {final_cost:.6})",
        network.config().identifier,
        samples.len()
    );
    Ok(TrainReport {
        epochs,
        samples: samples.len(),
        final_cost,
    })
}
