//! Tabular dataset types shared by every model
//!
//! - [`FeatureMatrix`] - row-major `f32` features paired with binary labels
//! - [`block_sizes`] / [`block_ranges`] - contiguous row partitioning for workers

mod partition;

pub use partition::{block_ranges, block_sizes};

use crate::error::{EnsembleError, Result};
use ndarray::{s, Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Shape of a dataset, broadcast to workers before the rows are scattered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetShape {
    pub n_samples: usize,
    pub n_features: usize,
}

/// Immutable feature matrix with one binary label per row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    features: Array2<f32>,
    labels: Array1<i32>,
}

impl FeatureMatrix {
    /// Build a matrix, checking row counts, binary labels and finite features
    pub fn new(features: Array2<f32>, labels: Array1<i32>) -> Result<Self> {
        if features.nrows() != labels.len() {
            return Err(EnsembleError::ShapeError {
                expected: format!("labels length = {}", features.nrows()),
                actual: format!("labels length = {}", labels.len()),
            });
        }

        if let Some((row, label)) = labels.iter().enumerate().find(|(_, &l)| l != 0 && l != 1) {
            return Err(EnsembleError::DataError(format!(
                "label {} at row {} is not binary",
                label, row
            )));
        }

        if let Some(((row, col), value)) = features.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(EnsembleError::DataError(format!(
                "feature {} at row {} is not finite ({})",
                col, row, value
            )));
        }

        Ok(Self { features, labels })
    }

    /// Build from a flat row-major buffer
    pub fn from_flat(features: Vec<f32>, labels: Vec<i32>, n_features: usize) -> Result<Self> {
        if n_features == 0 && !features.is_empty() {
            return Err(EnsembleError::ShapeError {
                expected: "n_features > 0".to_string(),
                actual: "n_features = 0".to_string(),
            });
        }
        let n_samples = labels.len();
        if features.len() != n_samples * n_features {
            return Err(EnsembleError::ShapeError {
                expected: format!("{} values ({} x {})", n_samples * n_features, n_samples, n_features),
                actual: format!("{} values", features.len()),
            });
        }
        let features = Array2::from_shape_vec((n_samples, n_features), features)?;
        Self::new(features, Array1::from_vec(labels))
    }

    pub fn n_samples(&self) -> usize {
        self.features.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.n_samples() == 0
    }

    pub fn shape(&self) -> DatasetShape {
        DatasetShape {
            n_samples: self.n_samples(),
            n_features: self.n_features(),
        }
    }

    pub fn features(&self) -> &Array2<f32> {
        &self.features
    }

    pub fn labels(&self) -> &Array1<i32> {
        &self.labels
    }

    pub fn row(&self, i: usize) -> ArrayView1<'_, f32> {
        self.features.row(i)
    }

    pub fn label(&self, i: usize) -> i32 {
        self.labels[i]
    }

    #[inline]
    pub fn value(&self, row: usize, feature: usize) -> f32 {
        self.features[[row, feature]]
    }

    /// Copy a contiguous row range into a new matrix
    pub fn slice_rows(&self, rows: Range<usize>) -> Result<Self> {
        if rows.start > rows.end || rows.end > self.n_samples() {
            return Err(EnsembleError::ShapeError {
                expected: format!("row range within 0..{}", self.n_samples()),
                actual: format!("{}..{}", rows.start, rows.end),
            });
        }
        Ok(Self {
            features: self.features.slice(s![rows.clone(), ..]).to_owned(),
            labels: self.labels.slice(s![rows]).to_owned(),
        })
    }

    /// Split into `n_blocks` contiguous blocks whose sizes differ by at most one
    pub fn split_blocks(&self, n_blocks: usize) -> Result<Vec<Self>> {
        block_ranges(self.n_samples(), n_blocks)
            .into_iter()
            .map(|range| self.slice_rows(range))
            .collect()
    }

    /// Contiguous train/test split; the last `test_ratio` share of rows becomes the test set.
    /// A ratio of 1 keeps every row for testing. An empty test set is an error.
    pub fn train_test_split(&self, test_ratio: f64) -> Result<(Self, Self)> {
        if !(test_ratio > 0.0 && test_ratio <= 1.0) {
            return Err(EnsembleError::InvalidParameter {
                name: "test_ratio".to_string(),
                value: test_ratio.to_string(),
                reason: "must be in (0, 1]".to_string(),
            });
        }
        let n = self.n_samples();
        let test_size = ((n as f64 * test_ratio) as usize).min(n);
        if test_size == 0 {
            return Err(EnsembleError::DataError(format!(
                "test ratio {} of {} rows leaves no test rows",
                test_ratio, n
            )));
        }
        let train_size = n - test_size;
        Ok((self.slice_rows(0..train_size)?, self.slice_rows(train_size..n)?))
    }

    /// Count of positive labels
    pub fn n_positive(&self) -> usize {
        self.labels.iter().filter(|&&l| l == 1).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample() -> FeatureMatrix {
        FeatureMatrix::new(
            array![[0.0, 1.0], [2.0, 3.0], [4.0, 5.0], [6.0, 7.0]],
            array![0, 1, 0, 1],
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_label_length_mismatch() {
        let result = FeatureMatrix::new(array![[0.0], [1.0]], array![0]);
        assert!(matches!(result, Err(EnsembleError::ShapeError { .. })));
    }

    #[test]
    fn test_rejects_non_binary_labels() {
        let result = FeatureMatrix::new(array![[0.0], [1.0]], array![0, 2]);
        assert!(matches!(result, Err(EnsembleError::DataError(_))));
    }

    #[test]
    fn test_from_flat_is_row_major() {
        let m = FeatureMatrix::from_flat(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![0, 1], 3).unwrap();
        assert_eq!(m.n_samples(), 2);
        assert_eq!(m.n_features(), 3);
        assert_eq!(m.value(1, 0), 4.0);
    }

    #[test]
    fn test_from_flat_rejects_ragged_buffer() {
        assert!(FeatureMatrix::from_flat(vec![1.0, 2.0, 3.0], vec![0, 1], 2).is_err());
    }

    #[test]
    fn test_split_blocks_covers_all_rows() {
        let m = sample();
        let blocks = m.split_blocks(3).unwrap();
        let sizes: Vec<usize> = blocks.iter().map(|b| b.n_samples()).collect();
        assert_eq!(sizes, vec![2, 1, 1]);
        assert_eq!(blocks[1].row(0).to_vec(), vec![4.0, 5.0]);
        assert_eq!(blocks[2].label(0), 1);
    }

    #[test]
    fn test_train_test_split() {
        let (train, test) = sample().train_test_split(0.25).unwrap();
        assert_eq!(train.n_samples(), 3);
        assert_eq!(test.n_samples(), 1);
        assert_eq!(test.row(0).to_vec(), vec![6.0, 7.0]);
    }

    #[test]
    fn test_full_ratio_keeps_every_row_for_testing() {
        let (train, test) = sample().train_test_split(1.0).unwrap();
        assert!(train.is_empty());
        assert_eq!(test.n_samples(), 4);
    }

    #[test]
    fn test_split_rejects_empty_test_set() {
        assert!(matches!(
            sample().train_test_split(0.0),
            Err(EnsembleError::InvalidParameter { .. })
        ));
        assert!(matches!(sample().train_test_split(0.1), Err(EnsembleError::DataError(_))));
        assert!(sample().train_test_split(1.5).is_err());
    }

    #[test]
    fn test_rejects_non_finite_features() {
        for bad in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            let result = FeatureMatrix::new(array![[0.0, 1.0], [bad, 2.0]], array![0, 1]);
            assert!(matches!(result, Err(EnsembleError::DataError(_))), "{} accepted", bad);
        }
    }
}
