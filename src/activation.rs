//! Nonlinearities applied between the two affine layers.
//!
//! Every variant is elementwise, which is what lets the planner fuse the
//! activation into the first affine's write step.

use serde::{Deserialize, Serialize};

/// The elementwise nonlinearity of the hidden layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Activation {
    /// Rectified Linear Unit activation function: f(x) = max(0, x).
    #[default]
    Relu,
    /// Sigmoid activation function: f(x) = 1 / (1 + exp(-x)).
    Sigmoid,
    /// Hyperbolic tangent activation function: f(x) = tanh(x).
    Tanh,
}

impl Activation {
    /// Get activation by string name, case-insensitive.
    pub fn get_by_name(type_name: &str) -> Option<Self> {
        match type_name.to_ascii_uppercase().as_str() {
            "RELU" => Some(Activation::Relu),
            "SIGMOID" => Some(Activation::Sigmoid),
            "TANH" => Some(Activation::Tanh),
            _ => None,
        }
    }

    /// Apply the activation function to a single value.
    #[inline(always)]
    pub fn apply_single(self, x: f32) -> f32 {
        match self {
            Activation::Relu => x.max(0.0),
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Activation::Tanh => x.tanh(),
        }
    }

    /// Apply the activation function to a slice of values in place.
    pub fn apply_in_place(self, values: &mut [f32]) {
        for val in values.iter_mut() {
            *val = self.apply_single(*val);
        }
    }

    /// Apply the activation function from `input` into `output`.
    ///
    /// Both slices must have the same length.
    pub fn apply_into(self, input: &[f32], output: &mut [f32]) {
        debug_assert_eq!(input.len(), output.len());
        for (out, &x) in output.iter_mut().zip(input) {
            *out = self.apply_single(x);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELTA: f32 = 0.00005;

    #[test]
    fn test_relu() {
        assert!((Activation::Relu.apply_single(1.0) - 1.0).abs() < DELTA);
        assert!((Activation::Relu.apply_single(-1.0) - 0.0).abs() < DELTA);
        assert!((Activation::Relu.apply_single(0.5) - 0.5).abs() < DELTA);
    }

    #[test]
    fn test_sigmoid() {
        assert!((Activation::Sigmoid.apply_single(1.0) - 0.7311).abs() < DELTA);
        assert!((Activation::Sigmoid.apply_single(0.0) - 0.5).abs() < DELTA);
        assert!((Activation::Sigmoid.apply_single(-0.5) - 0.3775).abs() < DELTA);
    }

    #[test]
    fn test_tanh() {
        assert!((Activation::Tanh.apply_single(0.0) - 0.0).abs() < DELTA);
        assert!((Activation::Tanh.apply_single(1.0) - 1.0_f32.tanh()).abs() < DELTA);
    }

    #[test]
    fn test_in_place_matches_into() {
        let input = [-2.0, -0.5, 0.0, 0.5, 2.0];
        for activation in [Activation::Relu, Activation::Sigmoid, Activation::Tanh] {
            let mut in_place = input;
            activation.apply_in_place(&mut in_place);
            let mut out = [0.0f32; 5];
            activation.apply_into(&input, &mut out);
            assert_eq!(in_place, out);
        }
    }

    #[test]
    fn test_get_by_name() {
        assert_eq!(Activation::get_by_name("RELU"), Some(Activation::Relu));
        assert_eq!(Activation::get_by_name("relu"), Some(Activation::Relu));
        assert_eq!(Activation::get_by_name("Tanh"), Some(Activation::Tanh));
        assert_eq!(Activation::get_by_name("SOFTMAX"), None);
    }
}
