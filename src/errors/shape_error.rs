//! Shape errors raised at the model and engine boundaries.

use thiserror::Error;

/// Dimension mismatches between inputs, parameters and plans.
///
/// A `ShapeError` is fatal to the call that raised it but never leaves an
/// engine in a partially written state: every check runs before any write.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("The {dimension} dimension must be greater than 0")]
    ZeroDimension { dimension: &'static str },

    #[error("The {parameter} has {actual} values but its shape requires {expected}")]
    ParameterLengthMismatch {
        parameter: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("A batch must contain at least one row")]
    EmptyBatch,

    #[error("Input rows must have {expected} features, got {actual}")]
    InputWidthMismatch { expected: usize, actual: usize },

    #[error("Input buffer of {len} values cannot be split into rows of {width} features")]
    RaggedInput { len: usize, width: usize },

    #[error(
        "The buffer plan was built for {plan_input}x{plan_hidden}x{plan_output}, \
         but the model is {model_input}x{model_hidden}x{model_output}"
    )]
    PlanModelMismatch {
        plan_input: usize,
        plan_hidden: usize,
        plan_output: usize,
        model_input: usize,
        model_hidden: usize,
        model_output: usize,
    },

    #[error("The engine was planned for batch size {planned}, got a batch of {actual} rows")]
    BatchSizeMismatch { planned: usize, actual: usize },

    #[error(
        "The {tensor} tensor of {rows}x{features} values exceeds {max_elements} elements"
    )]
    TensorTooLarge {
        tensor: &'static str,
        rows: usize,
        features: usize,
        max_elements: usize,
    },

    #[error("Outputs cannot be compared: the first has {left} values, the second {right}")]
    OutputLengthMismatch { left: usize, right: usize },
}
