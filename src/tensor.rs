//! Batched input rows handed to the engines.

use crate::errors::{ShapeError, ShapeResult};

/// Maximum number of `f32` values a single tensor may hold.
///
/// Three tensors of this size still fit, in bytes, inside one allocation.
pub const MAX_TENSOR_ELEMENTS: usize = isize::MAX as usize / (4 * std::mem::size_of::<f32>());

/// Number of values in a `rows x features` tensor, rejecting sizes that
/// overflow or exceed [`MAX_TENSOR_ELEMENTS`].
pub(crate) fn checked_elements(
    tensor: &'static str,
    rows: usize,
    features: usize,
) -> ShapeResult<usize> {
    rows.checked_mul(features)
        .filter(|&elements| elements <= MAX_TENSOR_ELEMENTS)
        .ok_or(ShapeError::TensorTooLarge {
            tensor,
            rows,
            features,
            max_elements: MAX_TENSOR_ELEMENTS,
        })
}

/// A row-major batch of feature vectors.
///
/// The batch may be empty; the engines reject empty batches when they
/// validate their input, so the failure is reported where it matters.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    data: Vec<f32>,
    width: usize,
}

impl Batch {
    /// Wraps `data` as rows of `width` values.
    pub fn new(data: Vec<f32>, width: usize) -> ShapeResult<Self> {
        if width == 0 {
            return Err(ShapeError::ZeroDimension { dimension: "input" });
        }
        if !data.len().is_multiple_of(width) {
            return Err(ShapeError::RaggedInput {
                len: data.len(),
                width,
            });
        }
        Ok(Self { data, width })
    }

    /// Builds a batch by repeating one feature vector `rows` times.
    pub fn repeat_row(row: &[f32], rows: usize) -> ShapeResult<Self> {
        let mut data = Vec::with_capacity(checked_elements("input", rows, row.len())?);
        for _ in 0..rows {
            data.extend_from_slice(row);
        }
        Self::new(data, row.len())
    }

    pub fn rows(&self) -> usize {
        self.data.len() / self.width
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn row(&self, index: usize) -> Option<&[f32]> {
        let start = index.checked_mul(self.width)?;
        self.data.get(start..start + self.width)
    }

    /// Checks the batch against an engine's expected row width.
    pub(crate) fn validate_for(&self, input_dim: usize) -> ShapeResult<()> {
        if self.width != input_dim {
            return Err(ShapeError::InputWidthMismatch {
                expected: input_dim,
                actual: self.width,
            });
        }
        if self.data.is_empty() {
            return Err(ShapeError::EmptyBatch);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ragged_input() {
        let result = Batch::new(vec![1.0, 2.0, 3.0], 2);
        assert_eq!(result, Err(ShapeError::RaggedInput { len: 3, width: 2 }));
    }

    #[test]
    fn test_repeat_row() {
        let batch = Batch::repeat_row(&[1.0, 2.0], 3).unwrap();
        assert_eq!(batch.rows(), 3);
        assert_eq!(batch.row(2), Some(&[1.0, 2.0][..]));
        assert_eq!(batch.row(3), None);
    }

    #[test]
    fn test_repeat_row_rejects_oversized_batch() {
        let result = Batch::repeat_row(&[1.0; 1024], usize::MAX / 2);
        assert!(matches!(
            result,
            Err(ShapeError::TensorTooLarge {
                tensor: "input",
                features: 1024,
                ..
            })
        ));
    }

    #[test]
    fn test_checked_elements() {
        assert_eq!(checked_elements("output", 32, 1024), Ok(32 * 1024));
        assert!(checked_elements("output", usize::MAX, 2).is_err());
        assert!(checked_elements("output", MAX_TENSOR_ELEMENTS + 1, 1).is_err());
        assert_eq!(
            checked_elements("output", MAX_TENSOR_ELEMENTS, 1),
            Ok(MAX_TENSOR_ELEMENTS)
        );
    }

    #[test]
    fn test_validate_for() {
        let batch = Batch::new(vec![0.0; 4], 2).unwrap();
        assert!(batch.validate_for(2).is_ok());
        assert_eq!(
            batch.validate_for(3),
            Err(ShapeError::InputWidthMismatch {
                expected: 3,
                actual: 2
            })
        );

        let empty = Batch::new(Vec::new(), 2).unwrap();
        assert_eq!(empty.validate_for(2), Err(ShapeError::EmptyBatch));
    }
}
