//! Model training module
//!
//! The three classifiers of the ensemble:
//! - Random forest of Gini decision trees
//! - Feed-forward sigmoid network (MLP)
//! - Logistic regression
//!
//! All of them implement [`Model`], which is what the orchestrator, the
//! ensemble and the evaluator work with.

mod config;
mod models;
pub mod decision_tree;
pub mod linear_models;
pub mod neural_network;
pub mod random_forest;

pub use config::{
    EnsembleConfig, ForestConfig, LinearConfig, ModelKind, NetworkConfig, OrchestratorConfig,
    FOREST_MODEL_FILE, LINEAR_MODEL_FILE, NETWORK_MODEL_FILE,
};
pub use decision_tree::{gini_impurity, majority_label, DecisionTree, TreeNode};
pub use linear_models::LogisticRegression;
pub use models::Model;
pub use neural_network::FeedForwardNetwork;
pub use random_forest::RandomForest;

/// Build an untrained model of the given kind
pub fn new_model(kind: ModelKind, config: &EnsembleConfig) -> Box<dyn Model> {
    match kind {
        ModelKind::Forest => Box::new(RandomForest::new(config.forest.clone())),
        ModelKind::Network => Box::new(FeedForwardNetwork::new(config.network.clone())),
        ModelKind::Linear => Box::new(LogisticRegression::new(config.linear.clone())),
    }
}
