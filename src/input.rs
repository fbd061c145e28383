//! Parsing and tiling of user-supplied feature values.

use crate::errors::{AnalysisError, AnalysisResult};
use crate::tensor::Batch;

/// Parses a comma-separated list of floats such as `"1.0, 0.5, -0.2"`.
pub fn parse_input_string(input: &str) -> AnalysisResult<Vec<f32>> {
    input
        .split(',')
        .map(|token| {
            let token = token.trim();
            token
                .parse::<f32>()
                .map_err(|_| AnalysisError::InvalidInput {
                    reason: format!("'{}' is not a number", token),
                })
        })
        .collect()
}

/// Builds a `(batch_size, input_dim)` batch from a short feature list.
///
/// The values are cycled when shorter than `input_dim` and truncated when
/// longer; the resulting row is repeated for every element of the batch.
pub fn tile_input(values: &[f32], batch_size: usize, input_dim: usize) -> AnalysisResult<Batch> {
    if values.is_empty() {
        return Err(AnalysisError::InvalidInput {
            reason: "input data cannot be empty".to_string(),
        });
    }

    let row: Vec<f32> = values.iter().copied().cycle().take(input_dim).collect();
    Ok(Batch::repeat_row(&row, batch_size)?)
}

/// First 50 characters of the raw input, as shown in reports.
pub fn input_preview(input: &str) -> String {
    let head: String = input.chars().take(50).collect();
    format!("{}...", head)
}
