use serde::{Deserialize, Serialize};

/// Neuron activation kinds.
///
/// Each variant owns a forward function and a derivative expressed in terms of
/// the activation's own output, so backpropagation never needs the
/// pre-activation value. Adding a variant means adding an arm to both matches.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Tanh,
}

impl Activation {
    pub fn apply(self, z: f32) -> f32 {
        match self {
            Activation::Tanh => z.tanh(),
        }
    }

    /// Derivative evaluated at an already-activated value `a = apply(z)`.
    pub fn derivative_from_output(self, a: f32) -> f32 {
        match self {
            Activation::Tanh => 1.0 - a * a,
        }
    }
}
