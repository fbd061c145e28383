//! Elementwise comparison of two engine outputs.

use log::{debug, warn};
use serde::Serialize;

use crate::errors::{ShapeError, ShapeResult};

/// Outcome of a comparison. A failed check is data, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VerificationResult {
    pub passed: bool,
    /// Largest absolute difference; `+inf` when either side holds a NaN.
    pub max_abs_diff: f32,
    pub tolerance: f32,
    /// Index of the element with the largest difference.
    pub worst_index: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verifier {
    tolerance: f32,
}

impl Default for Verifier {
    fn default() -> Self {
        Self {
            tolerance: f32::EPSILON,
        }
    }
}

impl Verifier {
    pub fn new(tolerance: f32) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    /// Compares `eager` and `planned` elementwise.
    ///
    /// Passes iff every absolute difference is at most the tolerance.
    pub fn compare(&self, eager: &[f32], planned: &[f32]) -> ShapeResult<VerificationResult> {
        if eager.len() != planned.len() {
            return Err(ShapeError::OutputLengthMismatch {
                left: eager.len(),
                right: planned.len(),
            });
        }

        let mut max_abs_diff = 0.0f32;
        let mut worst_index = None;
        for (i, (&a, &b)) in eager.iter().zip(planned).enumerate() {
            let diff = if a.is_nan() || b.is_nan() {
                f32::INFINITY
            } else {
                (a - b).abs()
            };
            if worst_index.is_none() || diff > max_abs_diff {
                max_abs_diff = diff;
                worst_index = Some(i);
            }
        }

        let passed = max_abs_diff <= self.tolerance;
        if passed {
            debug!(
                "Outputs match: max difference {:.2e} within tolerance {:.2e}",
                max_abs_diff, self.tolerance
            );
        } else {
            warn!(
                "Outputs diverge: max difference {:.2e} at index {:?} exceeds tolerance {:.2e}",
                max_abs_diff, worst_index, self.tolerance
            );
        }

        Ok(VerificationResult {
            passed,
            max_abs_diff,
            tolerance: self.tolerance,
            worst_index,
        })
    }
}
