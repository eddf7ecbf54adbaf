//! Concurrent training of the ensemble members

use super::comm::{Communicator, World};
use crate::data::{DatasetShape, FeatureMatrix};
use crate::error::{EnsembleError, Result};
use crate::training::{new_model, random_forest, EnsembleConfig, ModelKind};
use crate::utils::{DataLoader, ParallelConfig};
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};

const ROOT: usize = 0;

/// Messages exchanged during a training run
#[derive(Debug, Clone)]
enum TrainingMessage {
    Shape(DatasetShape),
    Block(FeatureMatrix),
    Outcome(WorkerOutcome),
}

fn unexpected(rank: usize, wanted: &str, got: &TrainingMessage) -> EnsembleError {
    EnsembleError::WorkerError {
        rank,
        reason: format!("expected {} message, received {:?}", wanted, got),
    }
}

/// Successful training of one model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelTiming {
    /// Wall-clock training time in seconds
    pub seconds: f64,
    /// Files written for the model
    pub files: Vec<PathBuf>,
}

/// What one worker reports back to the root
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerOutcome {
    pub rank: usize,
    pub kind: ModelKind,
    /// Rows in the worker's block
    pub n_samples: usize,
    pub result: std::result::Result<ModelTiming, String>,
}

impl WorkerOutcome {
    pub fn seconds(&self) -> Option<f64> {
        self.result.as_ref().ok().map(|t| t.seconds)
    }
}

/// Gathered results of a training run, in rank order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingSummary {
    pub shape: DatasetShape,
    pub outcomes: Vec<WorkerOutcome>,
}

impl TrainingSummary {
    /// Successful model with the smallest training time
    pub fn fastest(&self) -> Option<&WorkerOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_ok())
            .min_by(|a, b| {
                let (a, b) = (a.seconds().unwrap_or(f64::MAX), b.seconds().unwrap_or(f64::MAX));
                a.total_cmp(&b)
            })
    }

    pub fn failures(&self) -> impl Iterator<Item = &WorkerOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn generated_files(&self) -> Vec<&Path> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .flat_map(|t| t.files.iter().map(PathBuf::as_path))
            .collect()
    }

    /// Compact line such as `Timings (RF, MLP, LR): 1.20s, 0.40s, 0.05s`
    pub fn timings_line(&self) -> String {
        let names: Vec<&str> = self.outcomes.iter().map(|o| o.kind.short_name()).collect();
        let times: Vec<String> = self
            .outcomes
            .iter()
            .map(|o| match o.seconds() {
                Some(s) => format!("{:.2}s", s),
                None => "failed".to_string(),
            })
            .collect();
        format!("Timings ({}): {}", names.join(", "), times.join(", "))
    }

    pub fn report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Dataset: {} samples, {} features",
            self.shape.n_samples, self.shape.n_features
        );
        for outcome in &self.outcomes {
            match &outcome.result {
                Ok(timing) => {
                    let _ = writeln!(
                        out,
                        "Worker {} trained {} on {} samples in {:.2}s",
                        outcome.rank, outcome.kind, outcome.n_samples, timing.seconds
                    );
                }
                Err(reason) => {
                    let _ = writeln!(out, "Worker {} failed to train {}: {}", outcome.rank, outcome.kind, reason);
                }
            }
        }
        if let Some(fastest) = self.fastest() {
            let _ = writeln!(
                out,
                "Fastest model: {} ({:.2}s)",
                fastest.kind,
                fastest.seconds().unwrap_or_default()
            );
        }
        let _ = writeln!(out, "{}", self.timings_line());
        let files = self.generated_files();
        if !files.is_empty() {
            let _ = writeln!(out, "Generated files:");
            for file in files {
                let _ = writeln!(out, "  {}", file.display());
            }
        }
        out
    }
}

/// Trains one model kind per worker on disjoint row blocks
pub struct TrainingOrchestrator {
    config: EnsembleConfig,
}

impl TrainingOrchestrator {
    pub fn new(config: EnsembleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    /// Load a CSV through the raw path and train on it
    pub fn run_csv(&self, path: &Path) -> Result<TrainingSummary> {
        self.config.validate()?;
        let data = DataLoader::new().load_raw(path)?;
        self.run(&data)
    }

    pub fn run(&self, data: &FeatureMatrix) -> Result<TrainingSummary> {
        self.config.validate()?;
        let orchestrator = &self.config.orchestrator;
        fs::create_dir_all(&orchestrator.output_dir)?;

        info!(
            workers = orchestrator.workers,
            threads_per_worker = orchestrator.threads_per_worker,
            n_samples = data.n_samples(),
            n_features = data.n_features(),
            output_dir = %orchestrator.output_dir.display(),
            "Starting distributed training"
        );

        let world = World::new(orchestrator.workers)?;
        let results = world.run(|mut comm: Communicator<TrainingMessage>| {
            let root_data = (comm.rank() == ROOT).then_some(data);
            self.worker(&mut comm, root_data)
        })?;

        let mut summary = None;
        for (rank, result) in results.into_iter().enumerate() {
            match result {
                Ok(Some(s)) => summary = Some(s),
                Ok(None) => {}
                Err(e) => {
                    error!(rank, error = %e, "Worker aborted");
                    if rank == ROOT {
                        return Err(e);
                    }
                }
            }
        }

        let summary = summary.ok_or_else(|| EnsembleError::WorkerError {
            rank: ROOT,
            reason: "root gathered no results".to_string(),
        })?;

        if let Some(fastest) = summary.fastest() {
            info!(model = %fastest.kind, seconds = fastest.seconds().unwrap_or_default(), "Fastest model");
        }
        for failed in summary.failures() {
            warn!(rank = failed.rank, model = %failed.kind, "Model was not trained");
        }
        Ok(summary)
    }

    /// Body of every worker; only the root holds the dataset and returns the summary
    fn worker(
        &self,
        comm: &mut Communicator<TrainingMessage>,
        data: Option<&FeatureMatrix>,
    ) -> Result<Option<TrainingSummary>> {
        let rank = comm.rank();

        let shape = match comm.broadcast(ROOT, data.map(|d| TrainingMessage::Shape(d.shape())))? {
            TrainingMessage::Shape(shape) => shape,
            other => return Err(unexpected(rank, "shape", &other)),
        };

        let blocks = match data {
            Some(d) => Some(
                d.split_blocks(comm.size())?
                    .into_iter()
                    .map(TrainingMessage::Block)
                    .collect(),
            ),
            None => None,
        };
        let block = match comm.scatter(ROOT, blocks)? {
            TrainingMessage::Block(block) => block,
            other => return Err(unexpected(rank, "block", &other)),
        };

        let kind = self.config.orchestrator.assignments[rank];
        let result = self.train_block(kind, &block, shape).map_err(|e| {
            error!(rank, model = %kind, error = %e, "Training failed");
            e.to_string()
        });
        let outcome = WorkerOutcome {
            rank,
            kind,
            n_samples: block.n_samples(),
            result,
        };

        let gathered = comm.gather(ROOT, TrainingMessage::Outcome(outcome))?;
        let Some(messages) = gathered else {
            return Ok(None);
        };

        let outcomes = messages
            .into_iter()
            .map(|m| match m {
                TrainingMessage::Outcome(o) => Ok(o),
                other => Err(unexpected(rank, "outcome", &other)),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(TrainingSummary { shape, outcomes }))
    }

    fn train_block(&self, kind: ModelKind, block: &FeatureMatrix, shape: DatasetShape) -> Result<ModelTiming> {
        if block.n_features() != shape.n_features {
            return Err(EnsembleError::FeatureMismatch {
                expected: shape.n_features,
                actual: block.n_features(),
            });
        }

        let threads = self.config.orchestrator.threads_per_worker;
        let pool = ParallelConfig::new().with_threads(threads).build_pool()?;
        let mut model = new_model(kind, &self.config);

        info!(model = %kind, n_samples = block.n_samples(), threads, "Worker training");
        let start = Instant::now();
        pool.install(|| model.train(block))?;
        let seconds = start.elapsed().as_secs_f64();

        let path = self.config.orchestrator.output_dir.join(kind.file_name());
        model.save(&path)?;

        let files = match kind {
            ModelKind::Forest => vec![random_forest::meta_path(&path)],
            ModelKind::Network | ModelKind::Linear => vec![path],
        };
        info!(model = %kind, seconds, "Worker finished");
        Ok(ModelTiming { seconds, files })
    }
}
