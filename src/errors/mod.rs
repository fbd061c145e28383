//! Error types for the planned inference library.
//!
//! Each concern gets its own error enum instead of a generic wrapper like
//! `anyhow` or `Box<dyn Error>`, so callers can match on the exact failure.

mod analysis_error;
mod plan_error;
mod shape_error;

pub use analysis_error::AnalysisError;
pub use plan_error::PlanError;
pub use shape_error::ShapeError;

/// Result type alias for operations that validate tensor and model shapes.
pub type ShapeResult<T> = std::result::Result<T, ShapeError>;

/// Result type alias for buffer plan construction.
pub type PlanResult<T> = std::result::Result<T, PlanError>;

/// Result type alias for a full analysis session.
pub type AnalysisResult<T> = std::result::Result<T, AnalysisError>;
