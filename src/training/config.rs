//! Model and run configuration

use crate::error::{EnsembleError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Prefix of the per-tree forest files
pub const FOREST_MODEL_FILE: &str = "random_forest_model.bin";
pub const NETWORK_MODEL_FILE: &str = "mlp_model.bin";
pub const LINEAR_MODEL_FILE: &str = "logistic_regression_model.bin";

/// The three model families of the ensemble
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    Forest,
    Network,
    Linear,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [ModelKind::Forest, ModelKind::Network, ModelKind::Linear];

    /// Fixed file name (or file prefix for the forest) inside a model directory
    pub fn file_name(&self) -> &'static str {
        match self {
            ModelKind::Forest => FOREST_MODEL_FILE,
            ModelKind::Network => NETWORK_MODEL_FILE,
            ModelKind::Linear => LINEAR_MODEL_FILE,
        }
    }

    pub fn short_name(&self) -> &'static str {
        match self {
            ModelKind::Forest => "RF",
            ModelKind::Network => "MLP",
            ModelKind::Linear => "LR",
        }
    }

    /// Infer the model family from a model file name
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        if name.contains("random_forest") {
            ModelKind::Forest
        } else if name.contains("mlp") {
            ModelKind::Network
        } else {
            ModelKind::Linear
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelKind::Forest => "Random Forest",
            ModelKind::Network => "MLP",
            ModelKind::Linear => "Logistic Regression",
        };
        write!(f, "{}", name)
    }
}

fn invalid(name: &str, value: impl ToString, reason: &str) -> EnsembleError {
    EnsembleError::InvalidParameter {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Decision forest hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Base seed; tree `i` uses `seed + i`
    pub random_state: Option<u64>,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 10,
            min_samples_leaf: 2,
            random_state: None,
        }
    }
}

impl ForestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_n_trees(mut self, n: usize) -> Self {
        self.n_trees = n;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_min_samples_leaf(mut self, n: usize) -> Self {
        self.min_samples_leaf = n;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_trees == 0 {
            return Err(invalid("n_trees", self.n_trees, "must be at least 1"));
        }
        Ok(())
    }
}

/// Feed-forward network hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub hidden_layers: Vec<usize>,
    pub output_size: usize,
    pub epochs: usize,
    pub learning_rate: f32,
    /// Layers at least this wide are processed in parallel over neurons
    pub parallel_threshold: usize,
    pub random_state: Option<u64>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![16, 8],
            output_size: 2,
            epochs: 100,
            learning_rate: 0.01,
            parallel_threshold: 64,
            random_state: None,
        }
    }
}

impl NetworkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hidden_layers(mut self, layers: Vec<usize>) -> Self {
        self.hidden_layers = layers;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_learning_rate(mut self, lr: f32) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_parallel_threshold(mut self, width: usize) -> Self {
        self.parallel_threshold = width;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.output_size == 0 {
            return Err(invalid("output_size", self.output_size, "must be at least 1"));
        }
        if let Some(i) = self.hidden_layers.iter().position(|&n| n == 0) {
            return Err(invalid(&format!("hidden_layers[{}]", i), 0, "layers cannot be empty"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(invalid("learning_rate", self.learning_rate, "must be positive"));
        }
        Ok(())
    }
}

/// Logistic regression hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearConfig {
    pub learning_rate: f32,
    pub max_iterations: usize,
    pub random_state: Option<u64>,
}

impl Default for LinearConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            max_iterations: 100,
            random_state: None,
        }
    }
}

impl LinearConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_learning_rate(mut self, lr: f32) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(invalid("learning_rate", self.learning_rate, "must be positive"));
        }
        Ok(())
    }
}

/// Worker layout of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub workers: usize,
    /// Model trained by each worker, indexed by rank
    pub assignments: Vec<ModelKind>,
    pub threads_per_worker: usize,
    pub output_dir: PathBuf,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            assignments: ModelKind::ALL.to_vec(),
            threads_per_worker: 5,
            output_dir: PathBuf::from("."),
        }
    }
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workers(mut self, n: usize) -> Self {
        self.workers = n;
        self
    }

    pub fn with_assignments(mut self, assignments: Vec<ModelKind>) -> Self {
        self.assignments = assignments;
        self
    }

    pub fn with_threads_per_worker(mut self, n: usize) -> Self {
        self.threads_per_worker = n;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// The worker count must match the assignment list exactly and no kind may repeat
    pub fn validate(&self) -> Result<()> {
        if self.workers != self.assignments.len() {
            return Err(EnsembleError::ConfigError(format!(
                "{} workers launched but {} model assignments configured; exactly {} workers are required",
                self.workers,
                self.assignments.len(),
                self.assignments.len()
            )));
        }
        for (rank, kind) in self.assignments.iter().enumerate() {
            if let Some(first) = self.assignments[..rank].iter().position(|k| k == kind) {
                return Err(EnsembleError::ConfigError(format!(
                    "{} assigned to workers {} and {}; each model kind needs its own worker",
                    kind, first, rank
                )));
            }
        }
        if self.threads_per_worker == 0 {
            return Err(EnsembleError::ConfigError(
                "threads_per_worker must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Complete configuration of training and prediction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub forest: ForestConfig,
    pub network: NetworkConfig,
    pub linear: LinearConfig,
    pub orchestrator: OrchestratorConfig,
}

impl EnsembleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_forest(mut self, forest: ForestConfig) -> Self {
        self.forest = forest;
        self
    }

    pub fn with_network(mut self, network: NetworkConfig) -> Self {
        self.network = network;
        self
    }

    pub fn with_linear(mut self, linear: LinearConfig) -> Self {
        self.linear = linear;
        self
    }

    pub fn with_orchestrator(mut self, orchestrator: OrchestratorConfig) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.forest.validate()?;
        self.network.validate()?;
        self.linear.validate()?;
        self.orchestrator.validate()
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        serde_json::from_str(&contents)
            .map_err(|e| EnsembleError::ConfigError(format!("{}: {}", path.display(), e)))
    }

    pub fn to_json_file(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
