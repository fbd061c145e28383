//! Immutable description of the two-layer feed-forward network.
//!
//! The network is always `affine -> activation -> affine`. Parameters are
//! accepted in the conventional `in_features x out_features` row-major layout
//! and stored output-major, one contiguous row of `in_features` weights per
//! output unit, so that every output value is a single contiguous dot product.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::activation::Activation;
use crate::errors::{ShapeError, ShapeResult};
use crate::tensor::checked_elements;

/// Standard deviation used for seeded weight initialization.
const SEEDED_WEIGHT_STD: f32 = 0.01;

/// Layer widths of the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDims {
    pub input_dim: usize,
    pub hidden_dim: usize,
    pub output_dim: usize,
}

impl ModelDims {
    pub fn new(input_dim: usize, hidden_dim: usize, output_dim: usize) -> Self {
        Self {
            input_dim,
            hidden_dim,
            output_dim,
        }
    }

    /// Checks that every dimension is non-zero.
    pub fn validate(&self) -> ShapeResult<()> {
        for (dimension, value) in [
            ("input", self.input_dim),
            ("hidden", self.hidden_dim),
            ("output", self.output_dim),
        ] {
            if value == 0 {
                return Err(ShapeError::ZeroDimension { dimension });
            }
        }
        Ok(())
    }
}

impl Default for ModelDims {
    fn default() -> Self {
        Self::new(1024, 4096, 1024)
    }
}

/// Parameters of one affine layer, stored output-major.
#[derive(Debug, Clone)]
pub struct DenseLayer {
    in_features: usize,
    out_features: usize,
    weights: Vec<f32>,
    bias: Vec<f32>,
}

impl DenseLayer {
    fn from_row_major(
        name: &'static str,
        bias_name: &'static str,
        in_features: usize,
        out_features: usize,
        weights: &[f32],
        bias: Vec<f32>,
    ) -> ShapeResult<Self> {
        let expected = checked_elements(name, in_features, out_features)?;
        if weights.len() != expected {
            return Err(ShapeError::ParameterLengthMismatch {
                parameter: name,
                expected,
                actual: weights.len(),
            });
        }
        if bias.len() != out_features {
            return Err(ShapeError::ParameterLengthMismatch {
                parameter: bias_name,
                expected: out_features,
                actual: bias.len(),
            });
        }

        let mut packed = vec![0.0f32; expected];
        for (i, row) in weights.chunks_exact(out_features).enumerate() {
            for (j, &w) in row.iter().enumerate() {
                packed[j * in_features + i] = w;
            }
        }

        Ok(Self {
            in_features,
            out_features,
            weights: packed,
            bias,
        })
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }

    /// Weights as `out_features` contiguous rows of `in_features` values.
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Weight connecting input feature `input` to output unit `output`.
    pub fn weight(&self, input: usize, output: usize) -> f32 {
        self.weights[output * self.in_features + input]
    }

    pub fn bias(&self) -> &[f32] {
        &self.bias
    }
}

/// Read-only layer shapes and parameter values shared by both engines.
#[derive(Debug, Clone)]
pub struct ModelSpec {
    dims: ModelDims,
    layer1: DenseLayer,
    activation: Activation,
    layer2: DenseLayer,
}

impl ModelSpec {
    /// Builds a model from row-major `w1 (input x hidden)`, `b1 (hidden)`,
    /// `w2 (hidden x output)` and `b2 (output)`.
    pub fn new(
        dims: ModelDims,
        w1: &[f32],
        b1: Vec<f32>,
        w2: &[f32],
        b2: Vec<f32>,
    ) -> ShapeResult<Self> {
        dims.validate()?;
        let layer1 =
            DenseLayer::from_row_major("w1", "b1", dims.input_dim, dims.hidden_dim, w1, b1)?;
        let layer2 =
            DenseLayer::from_row_major("w2", "b2", dims.hidden_dim, dims.output_dim, w2, b2)?;

        Ok(Self {
            dims,
            layer1,
            activation: Activation::default(),
            layer2,
        })
    }

    /// Deterministic model with `N(0, 0.01^2)` weights and zero biases.
    pub fn seeded(dims: ModelDims, seed: u64) -> ShapeResult<Self> {
        dims.validate()?;
        let w1_len = checked_elements("w1", dims.input_dim, dims.hidden_dim)?;
        let w2_len = checked_elements("w2", dims.hidden_dim, dims.output_dim)?;
        let mut rng = StdRng::seed_from_u64(seed);
        let w1 = randn(w1_len, SEEDED_WEIGHT_STD, &mut rng);
        let w2 = randn(w2_len, SEEDED_WEIGHT_STD, &mut rng);
        Self::new(
            dims,
            &w1,
            vec![0.0; dims.hidden_dim],
            &w2,
            vec![0.0; dims.output_dim],
        )
    }

    /// Replaces the hidden-layer nonlinearity.
    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn dims(&self) -> ModelDims {
        self.dims
    }

    pub fn input_dim(&self) -> usize {
        self.dims.input_dim
    }

    pub fn hidden_dim(&self) -> usize {
        self.dims.hidden_dim
    }

    pub fn output_dim(&self) -> usize {
        self.dims.output_dim
    }

    pub fn layer1(&self) -> &DenseLayer {
        &self.layer1
    }

    pub fn layer2(&self) -> &DenseLayer {
        &self.layer2
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }
}

/// Samples `len` values from `N(0, std^2)` with the Box-Muller transform.
fn randn(len: usize, std: f32, rng: &mut impl Rng) -> Vec<f32> {
    let mut values = Vec::with_capacity(len);
    while values.len() < len {
        let u1: f32 = rng.r#gen::<f32>().max(f32::MIN_POSITIVE);
        let u2: f32 = rng.r#gen::<f32>();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * std::f32::consts::PI * u2;
        values.push(r * theta.cos() * std);
        if values.len() < len {
            values.push(r * theta.sin() * std);
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_dims() -> ModelDims {
        ModelDims::new(2, 3, 1)
    }

    #[test]
    fn test_weights_are_stored_output_major() {
        // w1 rows are inputs, columns are hidden units
        let w1 = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let model = ModelSpec::new(
            small_dims(),
            &w1,
            vec![0.0; 3],
            &[1.0, 1.0, 1.0],
            vec![0.0],
        )
        .unwrap();

        assert_eq!(model.layer1().weights(), &[1.0f32, 4.0, 2.0, 5.0, 3.0, 6.0]);
        assert_eq!(model.layer1().weight(1, 2), 6.0);
        assert_eq!(model.layer1().weight(0, 1), 2.0);
    }

    #[test]
    fn test_bias_length_mismatch() {
        let result = ModelSpec::new(
            small_dims(),
            &[0.0; 6],
            vec![0.0; 2],
            &[0.0; 3],
            vec![0.0],
        );
        assert!(matches!(
            result,
            Err(ShapeError::ParameterLengthMismatch {
                parameter: "b1",
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_weight_length_mismatch() {
        let result = ModelSpec::new(
            small_dims(),
            &[0.0; 6],
            vec![0.0; 3],
            &[0.0; 4],
            vec![0.0],
        );
        assert!(matches!(
            result,
            Err(ShapeError::ParameterLengthMismatch { parameter: "w2", .. })
        ));
    }

    #[test]
    fn test_zero_dimension() {
        let result = ModelSpec::seeded(ModelDims::new(4, 0, 2), 42);
        assert!(matches!(
            result,
            Err(ShapeError::ZeroDimension { dimension: "hidden" })
        ));
    }

    #[test]
    fn test_oversized_layer_is_rejected() {
        let result = ModelSpec::seeded(ModelDims::new(usize::MAX / 2, 4, 1), 42);
        assert!(matches!(
            result,
            Err(ShapeError::TensorTooLarge { tensor: "w1", .. })
        ));

        let result = ModelSpec::new(
            ModelDims::new(1, usize::MAX / 2, 4),
            &[],
            Vec::new(),
            &[],
            Vec::new(),
        );
        assert!(matches!(
            result,
            Err(ShapeError::TensorTooLarge { tensor: "w1", .. })
        ));
    }

    #[test]
    fn test_seeded_is_deterministic() {
        let dims = ModelDims::new(8, 16, 4);
        let a = ModelSpec::seeded(dims, 42).unwrap();
        let b = ModelSpec::seeded(dims, 42).unwrap();
        let c = ModelSpec::seeded(dims, 7).unwrap();

        assert_eq!(a.layer1().weights(), b.layer1().weights());
        assert_eq!(a.layer2().weights(), b.layer2().weights());
        assert_ne!(a.layer1().weights(), c.layer1().weights());
        assert!(a.layer1().bias().iter().all(|&b| b == 0.0));
        assert!(a.layer1().weights().iter().all(|w| w.abs() < 0.1));
    }
}
