//! Common model interface

use crate::data::FeatureMatrix;
use crate::error::{EnsembleError, Result};
use std::path::Path;

/// Capabilities shared by every classifier of the ensemble
pub trait Model: Send + Sync {
    /// Human-readable model name
    fn name(&self) -> &'static str;

    /// Feature count the model was trained on (0 before training or loading)
    fn n_features(&self) -> usize;

    fn is_fitted(&self) -> bool;

    /// Train on the given matrix, replacing any previous parameters
    fn train(&mut self, data: &FeatureMatrix) -> Result<()>;

    /// Predict the class of a single sample
    fn predict(&self, sample: &[f32]) -> Result<i32>;

    /// Persist parameters at `path` (a file prefix for the forest)
    fn save(&self, path: &Path) -> Result<()>;

    /// Replace parameters with the ones persisted at `path`
    fn load(&mut self, path: &Path) -> Result<()>;

    /// Deep copy behind a trait object
    fn clone_box(&self) -> Box<dyn Model>;

    /// Predict every row of a matrix
    fn predict_batch(&self, data: &FeatureMatrix) -> Result<Vec<i32>> {
        (0..data.n_samples())
            .map(|i| match data.row(i).as_slice() {
                Some(row) => self.predict(row),
                None => self.predict(&data.row(i).to_vec()),
            })
            .collect()
    }
}

impl Clone for Box<dyn Model> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Check a sample against the trained feature count
pub(crate) fn check_sample(model: &dyn Model, sample: &[f32]) -> Result<()> {
    if !model.is_fitted() {
        return Err(EnsembleError::ModelNotFitted);
    }
    if sample.len() != model.n_features() {
        return Err(EnsembleError::FeatureMismatch {
            expected: model.n_features(),
            actual: sample.len(),
        });
    }
    Ok(())
}

/// Reject matrices no model can train on
pub(crate) fn check_training_data(data: &FeatureMatrix) -> Result<()> {
    if data.is_empty() {
        return Err(EnsembleError::TrainingError(
            "training set has no samples".to_string(),
        ));
    }
    if data.n_features() == 0 {
        return Err(EnsembleError::TrainingError(
            "training set has no features".to_string(),
        ));
    }
    Ok(())
}
