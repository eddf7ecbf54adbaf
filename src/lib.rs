//! Hybrid-parallel ensemble classifier for loan approval
//!
//! Three heterogeneous models are trained concurrently, each by its own worker
//! on a disjoint block of rows, and combined by majority vote at prediction time.
//!
//! # Modules
//!
//! ## Data
//! - [`data`] - Feature matrices and row partitioning
//! - [`preprocessing`] - Z-score column statistics
//! - [`utils`] - CSV loading, binary codecs, thread pools
//!
//! ## Models
//! - [`training`] - Decision tree, random forest, MLP, logistic regression
//!
//! ## Coordination
//! - [`orchestrator`] - Message-passing workers and concurrent training
//! - [`ensemble`] - Majority-vote prediction and risk scoring
//! - [`evaluation`] - Metrics and distributed evaluation
//!
//! ## Interface
//! - [`cli`] - Command-line interface

pub mod error;

pub mod data;
pub mod preprocessing;
pub mod utils;

pub mod training;

pub mod ensemble;
pub mod evaluation;
pub mod orchestrator;

pub mod cli;

pub use error::{EnsembleError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{EnsembleError, Result};

    pub use crate::data::FeatureMatrix;
    pub use crate::preprocessing::ColumnStats;
    pub use crate::utils::DataLoader;

    pub use crate::training::{
        EnsembleConfig, FeedForwardNetwork, ForestConfig, LinearConfig, LogisticRegression, Model, ModelKind,
        NetworkConfig, OrchestratorConfig, RandomForest,
    };

    pub use crate::ensemble::{Decision, EnsemblePredictor, LoanApplication};
    pub use crate::evaluation::{evaluate, evaluate_distributed, EvaluationMetrics};
    pub use crate::orchestrator::{TrainingOrchestrator, TrainingSummary};
}
