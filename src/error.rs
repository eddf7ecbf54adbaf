//! Error types for the hybrid ensemble

use thiserror::Error;

/// Result type alias for ensemble operations
pub type Result<T> = std::result::Result<T, EnsembleError>;

/// Main error type for training, persistence, orchestration and inference
#[derive(Error, Debug)]
pub enum EnsembleError {
    #[error("Invalid data: {0}")]
    DataError(String),

    #[error("Training failed: {0}")]
    TrainingError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("I/O failure: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt or unreadable model data: {0}")]
    SerializationError(String),

    #[error("Shape mismatch: expected {expected}, found {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Feature count mismatch: model expects {expected}, got {actual}")]
    FeatureMismatch { expected: usize, actual: usize },

    #[error("Required column missing: {0}")]
    FeatureNotFound(String),

    #[error("Model has not been trained or loaded")]
    ModelNotFitted,

    #[error("Parameter {name} = {value} rejected: {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Worker {rank} failed: {reason}")]
    WorkerError { rank: usize, reason: String },

    #[error("Could not build worker thread pool: {0}")]
    ThreadPoolError(String),

    #[error("No models could be loaded")]
    NoModelsAvailable,
}

impl EnsembleError {
    /// Fatal configuration errors abort the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EnsembleError::ConfigError(_)
                | EnsembleError::FeatureMismatch { .. }
                | EnsembleError::FeatureNotFound(_)
        )
    }
}

impl From<polars::error::PolarsError> for EnsembleError {
    fn from(err: polars::error::PolarsError) -> Self {
        EnsembleError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for EnsembleError {
    fn from(err: serde_json::Error) -> Self {
        EnsembleError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for EnsembleError {
    fn from(err: ndarray::ShapeError) -> Self {
        EnsembleError::ShapeError {
            expected: "a consistent array shape".to_string(),
            actual: err.to_string(),
        }
    }
}

impl From<rayon::ThreadPoolBuildError> for EnsembleError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        EnsembleError::ThreadPoolError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_column_message() {
        let err = EnsembleError::FeatureNotFound("Approval".to_string());
        assert_eq!(err.to_string(), "Required column missing: Approval");
        assert!(err.is_fatal());
    }

    #[test]
    fn test_io_failures_are_not_fatal() {
        let err: EnsembleError = std::io::Error::new(std::io::ErrorKind::NotFound, "mlp_model.bin").into();
        assert!(matches!(err, EnsembleError::IoError(_)));
        assert!(!err.is_fatal());
        assert!(!EnsembleError::NoModelsAvailable.is_fatal());
    }

    #[test]
    fn test_feature_mismatch_is_fatal() {
        let err = EnsembleError::FeatureMismatch { expected: 5, actual: 4 };
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "Feature count mismatch: model expects 5, got 4"
        );
    }
}
