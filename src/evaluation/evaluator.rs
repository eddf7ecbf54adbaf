//! Parallel and distributed model evaluation

use super::metrics::{ConfusionMatrix, EvaluationMetrics};
use crate::data::FeatureMatrix;
use crate::error::{EnsembleError, Result};
use crate::orchestrator::{Communicator, World};
use crate::training::{new_model, EnsembleConfig, Model, ModelKind};
use crate::utils::reduce_with;
use rayon::prelude::*;
use serde::Serialize;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Task-local evaluation state; each task predicts with its own model copy
struct TaskState {
    model: Box<dyn Model>,
    confusion: ConfusionMatrix,
    error: Option<EnsembleError>,
}

/// Evaluate a model over every row of `data`
pub fn evaluate(model: &dyn Model, data: &FeatureMatrix) -> Result<EvaluationMetrics> {
    if !model.is_fitted() {
        return Err(EnsembleError::ModelNotFitted);
    }
    if data.n_features() != model.n_features() {
        return Err(EnsembleError::FeatureMismatch {
            expected: model.n_features(),
            actual: data.n_features(),
        });
    }

    let start = Instant::now();
    let (confusion, error) = reduce_with(
        (0..data.n_samples()).into_par_iter(),
        (ConfusionMatrix::new(), None),
        || TaskState {
            model: model.clone_box(),
            confusion: ConfusionMatrix::new(),
            error: None,
        },
        |mut state, i| {
            if state.error.is_none() {
                let row = data.row(i).to_vec();
                match state.model.predict(&row) {
                    Ok(predicted) => state.confusion.record(data.label(i), predicted),
                    Err(e) => state.error = Some(e),
                }
            }
            state
        },
        |acc: &mut (ConfusionMatrix, Option<EnsembleError>), state| {
            acc.0.merge(&state.confusion);
            if acc.1.is_none() {
                acc.1 = state.error;
            }
        },
    );

    if let Some(e) = error {
        return Err(e);
    }

    let metrics = EvaluationMetrics::from_confusion(model.name(), confusion, start.elapsed().as_secs_f64());
    info!(
        model = model.name(),
        n_samples = metrics.n_samples(),
        accuracy = metrics.accuracy,
        f1 = metrics.f1_score,
        "Model evaluated"
    );
    Ok(metrics)
}

/// Load a model file, inferring its kind from the file name
pub fn load_model(path: &Path) -> Result<Box<dyn Model>> {
    let kind = ModelKind::from_path(path);
    let mut model = new_model(kind, &EnsembleConfig::default());
    model.load(path)?;
    debug!(path = %path.display(), model = %kind, "Model file loaded");
    Ok(model)
}

/// Evaluation of one model file
#[derive(Debug, Clone, Serialize)]
pub struct FileEvaluation {
    pub path: PathBuf,
    /// Worker that evaluated the file
    pub rank: usize,
    pub result: std::result::Result<EvaluationMetrics, String>,
}

/// Files handled by `rank`: `rank`, `rank + workers`, ...
pub fn assigned_files(files: &[PathBuf], rank: usize, workers: usize) -> Vec<PathBuf> {
    files
        .iter()
        .skip(rank)
        .step_by(workers.max(1))
        .cloned()
        .collect()
}

/// Evaluate model files across `workers` workers and gather every result on the root
pub fn evaluate_distributed(files: &[PathBuf], data: &FeatureMatrix, workers: usize) -> Result<Vec<FileEvaluation>> {
    if data.is_empty() {
        return Err(EnsembleError::DataError("evaluation set has no rows".to_string()));
    }
    let world = World::new(workers)?;
    info!(n_files = files.len(), workers, "Starting distributed evaluation");

    let results = world.run(|mut comm: Communicator<Vec<FileEvaluation>>| {
        let rank = comm.rank();
        let local: Vec<FileEvaluation> = assigned_files(files, rank, comm.size())
            .into_iter()
            .map(|path| {
                let result = load_model(&path)
                    .and_then(|model| evaluate(model.as_ref(), data))
                    .map_err(|e| {
                        warn!(rank, path = %path.display(), error = %e, "Evaluation failed");
                        e.to_string()
                    });
                FileEvaluation { path, rank, result }
            })
            .collect();
        comm.gather(0, local)
    })?;

    let mut gathered = None;
    for result in results {
        if let Some(all) = result? {
            gathered = Some(all);
        }
    }

    let mut evaluations: Vec<FileEvaluation> = gathered
        .ok_or_else(|| EnsembleError::WorkerError {
            rank: 0,
            reason: "root gathered no evaluations".to_string(),
        })?
        .into_iter()
        .flatten()
        .collect();

    // restore the caller's file order
    evaluations.sort_by_key(|e| files.iter().position(|f| *f == e.path).unwrap_or(usize::MAX));
    Ok(evaluations)
}

/// Render a plain-text report for several evaluations
pub fn format_report(evaluations: &[FileEvaluation]) -> String {
    let mut out = String::from("Evaluation Results\n==================\n\n");
    for evaluation in evaluations {
        out.push_str(&format!("File: {} (worker {})\n", evaluation.path.display(), evaluation.rank));
        match &evaluation.result {
            Ok(metrics) => out.push_str(&metrics.report()),
            Err(reason) => out.push_str(&format!("  Failed: {}\n", reason)),
        }
        out.push('\n');
    }
    out
}

/// Write a report, creating parent directories
pub fn save_report(path: &Path, report: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, report)?;
    info!(path = %path.display(), "Evaluation report saved");
    Ok(())
}

/// Basic integrity facts about a model file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelFileCheck {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Up to the first 16 bytes, hex encoded
    pub header_hex: String,
}

/// Check that a model file exists and is non-empty
pub fn validate_model_file(path: &Path) -> Result<ModelFileCheck> {
    let metadata = fs::metadata(path)?;
    if !metadata.is_file() {
        return Err(EnsembleError::DataError(format!("{} is not a file", path.display())));
    }
    if metadata.len() == 0 {
        return Err(EnsembleError::SerializationError(format!(
            "{} is empty",
            path.display()
        )));
    }

    let mut header = Vec::with_capacity(16);
    File::open(path)?.take(16).read_to_end(&mut header)?;
    let header_hex = header
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ");

    Ok(ModelFileCheck {
        path: path.to_path_buf(),
        size_bytes: metadata.len(),
        header_hex,
    })
}
