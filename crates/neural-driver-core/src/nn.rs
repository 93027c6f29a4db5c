//! Fully connected feedforward network with per-sample gradient descent.
//!
//! Layer 0 is the input layer and carries no parameters. For every later layer
//! `i`, `weights[i - 1][j][k]` connects neuron `k` of layer `i - 1` to neuron
//! `j` of layer `i`, and `biases[i - 1][j]` is neuron `j`'s bias.

use crate::config::{ConfigError, NetworkConfig};
use crate::rng::create_rng;
use rand::Rng;
use std::{error::Error, fmt};

/// Fresh parameters are drawn from `U[-INIT_RANGE, INIT_RANGE]`.
const INIT_RANGE: f32 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub enum MlpError {
    /// A vector's length disagrees with the network shape.
    ShapeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    InvalidConfig(ConfigError),
}

impl fmt::Display for MlpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlpError::ShapeMismatch {
                what,
                got,
                expected,
            } => write!(f, "shape mismatch for {what}: got {got}, expected {expected}"),
            MlpError::InvalidConfig(e) => write!(f, "invalid network config: {e}"),
        }
    }
}

impl From<ConfigError> for MlpError {
    fn from(err: ConfigError) -> Self {
        MlpError::InvalidConfig(err)
    }
}

impl Error for MlpError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlpError::InvalidConfig(e) => Some(e),
            _ => None,
        }
    }
}

fn check_len(what: &'static str, got: usize, expected: usize) -> Result<(), MlpError> {
    if got == expected {
        Ok(())
    } else {
        Err(MlpError::ShapeMismatch {
            what,
            got,
            expected,
        })
    }
}

#[derive(Clone, Debug)]
pub struct MultilayerPerceptron {
    config: NetworkConfig,
    layer_sizes: Vec<usize>,
    activations: Vec<Vec<f32>>,
    weights: Vec<Vec<Vec<f32>>>,
    biases: Vec<Vec<f32>>,
    // Backprop scratch, one error signal per neuron. Index 0 is never read.
    gammas: Vec<Vec<f32>>,
    last_cost: f32,
}

impl MultilayerPerceptron {
    pub fn new<R: Rng + ?Sized>(config: NetworkConfig, rng: &mut R) -> Self {
        Self::try_new(config, rng).unwrap_or_else(|e| panic!("{e}"))
    }

    /// Build a network with every weight and bias drawn from `U[-0.5, 0.5]`.
    pub fn try_new<R: Rng + ?Sized>(
        config: NetworkConfig,
        rng: &mut R,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let layer_sizes = config.layer_sizes();

        let weights = layer_sizes
            .windows(2)
            .map(|pair| {
                (0..pair[1])
                    .map(|_| {
                        (0..pair[0])
                            .map(|_| rng.random_range(-INIT_RANGE..=INIT_RANGE))
                            .collect()
                    })
                    .collect()
            })
            .collect();
        let biases = layer_sizes[1..]
            .iter()
            .map(|&size| {
                (0..size)
                    .map(|_| rng.random_range(-INIT_RANGE..=INIT_RANGE))
                    .collect()
            })
            .collect();

        Ok(Self::assemble(config, layer_sizes, weights, biases))
    }

    /// Seeded construction, reproducible across runs.
    pub fn seeded(config: NetworkConfig, seed: u64) -> Result<Self, ConfigError> {
        Self::try_new(config, &mut create_rng(seed))
    }

    /// Restore a network from previously learned parameters, bypassing random
    /// initialization. Every nested length is checked against `config`.
    pub fn from_parts(
        config: NetworkConfig,
        weights: Vec<Vec<Vec<f32>>>,
        biases: Vec<Vec<f32>>,
    ) -> Result<Self, MlpError> {
        config.validate()?;
        let layer_sizes = config.layer_sizes();
        let param_layers = layer_sizes.len() - 1;
        check_len("weight layers", weights.len(), param_layers)?;
        check_len("bias layers", biases.len(), param_layers)?;
        for (i, pair) in layer_sizes.windows(2).enumerate() {
            check_len("weight rows", weights[i].len(), pair[1])?;
            for row in &weights[i] {
                check_len("weight row", row.len(), pair[0])?;
            }
            check_len("biases", biases[i].len(), pair[1])?;
        }
        Ok(Self::assemble(config, layer_sizes, weights, biases))
    }

    fn assemble(
        config: NetworkConfig,
        layer_sizes: Vec<usize>,
        weights: Vec<Vec<Vec<f32>>>,
        biases: Vec<Vec<f32>>,
    ) -> Self {
        let activations: Vec<Vec<f32>> = layer_sizes.iter().map(|&s| vec![0.0; s]).collect();
        Self {
            gammas: activations.clone(),
            activations,
            config,
            layer_sizes,
            weights,
            biases,
            last_cost: 0.0,
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn layer_sizes(&self) -> &[usize] {
        &self.layer_sizes
    }

    pub fn input_size(&self) -> usize {
        self.config.input_size
    }

    pub fn output_size(&self) -> usize {
        self.config.output_size
    }

    pub fn weights(&self) -> &[Vec<Vec<f32>>] {
        &self.weights
    }

    pub fn biases(&self) -> &[Vec<f32>] {
        &self.biases
    }

    /// Activations left behind by the most recent forward pass.
    pub fn activations(&self, layer: usize) -> Option<&[f32]> {
        self.activations.get(layer).map(Vec::as_slice)
    }

    /// Halved squared error computed by the most recent `back_propagate`.
    /// Monitoring only; the update never reads it.
    pub fn last_cost(&self) -> f32 {
        self.last_cost
    }

    pub fn parameter_count(&self) -> usize {
        self.layer_sizes
            .windows(2)
            .map(|pair| pair[0] * pair[1] + pair[1])
            .sum()
    }

    /// Forward pass. The returned slice is the output layer's activations and
    /// stays valid until the next call that mutates the network.
    pub fn feed_forward(&mut self, input: &[f32]) -> Result<&[f32], MlpError> {
        check_len("input", input.len(), self.config.input_size)?;
        self.activations[0].copy_from_slice(input);
        self.propagate_forward();
        Ok(self.output())
    }

    fn output(&self) -> &[f32] {
        self.activations
            .last()
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn propagate_forward(&mut self) {
        let act = self.config.activation;
        for layer in 1..self.layer_sizes.len() {
            let (before, after) = self.activations.split_at_mut(layer);
            let prev = &before[layer - 1];
            let current = &mut after[0];
            let weights = &self.weights[layer - 1];
            let biases = &self.biases[layer - 1];
            for ((a, row), &b) in current.iter_mut().zip(weights).zip(biases) {
                let z = b + row.iter().zip(prev).map(|(w, x)| w * x).sum::<f32>();
                *a = act.apply(z);
            }
        }
    }

    /// One step of online gradient descent towards `expected` for `input`.
    ///
    /// Runs a fresh forward pass, derives every layer's error signal from the
    /// current (pre-update) weights, then applies the update. Returns the
    /// halved squared error measured before the update.
    pub fn back_propagate(&mut self, input: &[f32], expected: &[f32]) -> Result<f32, MlpError> {
        check_len("input", input.len(), self.config.input_size)?;
        check_len("expected output", expected.len(), self.config.output_size)?;
        self.activations[0].copy_from_slice(input);
        self.propagate_forward();

        let act = self.config.activation;
        let last = self.layer_sizes.len() - 1;

        let mut cost = 0.0f32;
        for ((gamma, &a), &y) in self.gammas[last]
            .iter_mut()
            .zip(&self.activations[last])
            .zip(expected)
        {
            let diff = a - y;
            cost += diff * diff;
            *gamma = diff * act.derivative_from_output(a);
        }
        self.last_cost = cost * 0.5;

        for layer in (1..last).rev() {
            let (lower, upper) = self.gammas.split_at_mut(layer + 1);
            let next = &upper[0];
            let next_weights = &self.weights[layer];
            for (j, (gamma, &a)) in lower[layer]
                .iter_mut()
                .zip(&self.activations[layer])
                .enumerate()
            {
                let back: f32 = next
                    .iter()
                    .zip(next_weights)
                    .map(|(g, row)| g * row[j])
                    .sum();
                *gamma = back * act.derivative_from_output(a);
            }
        }

        let lr = self.config.learning_rate;
        for layer in 1..=last {
            let prev = &self.activations[layer - 1];
            for ((row, bias), &gamma) in self.weights[layer - 1]
                .iter_mut()
                .zip(self.biases[layer - 1].iter_mut())
                .zip(&self.gammas[layer])
            {
                *bias -= lr * gamma;
                for (w, &x) in row.iter_mut().zip(prev) {
                    *w -= lr * gamma * x;
                }
            }
        }

        Ok(self.last_cost)
    }
}
