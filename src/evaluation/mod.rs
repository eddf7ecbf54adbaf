//! Model evaluation
//!
//! Accuracy, precision, recall, F1 and the confusion matrix of a model over a
//! held-out set, computed in parallel per sample. Several model files can be
//! spread round-robin across workers with the results gathered on the root.

mod evaluator;
mod metrics;

pub use evaluator::{
    assigned_files, evaluate, evaluate_distributed, format_report, load_model, save_report,
    validate_model_file, FileEvaluation, ModelFileCheck,
};
pub use metrics::{ConfusionMatrix, EvaluationMetrics};

/// Default location of the evaluation report
pub const DEFAULT_REPORT_PATH: &str = "results/evaluation_results.txt";

/// Share of rows held out by the evaluation command
pub const DEFAULT_TEST_RATIO: f64 = 0.2;
