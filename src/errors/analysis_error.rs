//! Errors surfaced by a complete analysis session and the CLI.

use thiserror::Error;

use super::{PlanError, ShapeError};

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(
        "Invalid input format: {reason}. Expected comma-separated floats (e.g. '1.0, 0.5, -0.2')"
    )]
    InvalidInput { reason: String },

    #[error("Configuration validation error for field '{field}': {message}")]
    InvalidConfig { field: String, message: String },

    #[error("Failed to parse configuration file '{path}': {source}")]
    ConfigParse {
        path: String,
        source: serde_json::Error,
    },

    #[error("Failed to serialize the report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
