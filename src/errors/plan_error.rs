//! Errors raised while building or checking a buffer plan.

use thiserror::Error;

use super::ShapeError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("The batch size must be greater than 0, got {batch_size}")]
    InvalidBatchSize { batch_size: usize },

    #[error(
        "Tensors '{first}' and '{second}' have overlapping lifetimes but share buffer {buffer}"
    )]
    OverlappingLifetimes {
        first: String,
        second: String,
        buffer: usize,
    },

    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error(
        "Tensor '{tensor}' is placed in buffer {buffer}, but the plan has {buffer_count} buffers"
    )]
    UnknownBuffer {
        tensor: String,
        buffer: usize,
        buffer_count: usize,
    },

    #[error("Tensor '{tensor}' needs {required} elements but buffer {buffer} holds {capacity}")]
    BufferTooSmall {
        tensor: String,
        buffer: usize,
        required: usize,
        capacity: usize,
    },
}
