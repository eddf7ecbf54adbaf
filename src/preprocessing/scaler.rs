//! Per-feature z-score statistics

use crate::data::FeatureMatrix;
use crate::error::{EnsembleError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Mean and standard deviation per feature column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub means: Vec<f32>,
    pub std_devs: Vec<f32>,
}

impl ColumnStats {
    pub fn new(means: Vec<f32>, std_devs: Vec<f32>) -> Result<Self> {
        if means.len() != std_devs.len() {
            return Err(EnsembleError::ShapeError {
                expected: format!("{} standard deviations", means.len()),
                actual: format!("{} standard deviations", std_devs.len()),
            });
        }
        if let Some(i) = std_devs.iter().position(|s| !s.is_finite() || *s <= 0.0) {
            return Err(EnsembleError::InvalidParameter {
                name: format!("std_devs[{}]", i),
                value: std_devs[i].to_string(),
                reason: "must be positive and finite".to_string(),
            });
        }
        Ok(Self { means, std_devs })
    }

    /// Statistics of the loan training set; employment status passes through unscaled
    pub fn loan_defaults() -> Self {
        Self {
            means: vec![110377.55, 575.72, 44356.15, 34.72, 0.0],
            std_devs: vec![51729.68, 159.23, 34666.60, 32.32, 1.0],
        }
    }

    /// Fit mean and sample standard deviation (n - 1) of every column
    pub fn fit(data: &FeatureMatrix) -> Self {
        let n = data.n_samples();
        let features = data.features();
        let mut means = Vec::with_capacity(data.n_features());
        let mut std_devs = Vec::with_capacity(data.n_features());

        for column in features.columns() {
            let mean = if n > 0 {
                column.iter().map(|&v| v as f64).sum::<f64>() / n as f64
            } else {
                0.0
            };
            let std = if n > 1 {
                let ss: f64 = column.iter().map(|&v| (v as f64 - mean).powi(2)).sum();
                (ss / (n - 1) as f64).sqrt()
            } else {
                0.0
            };
            means.push(mean as f32);
            std_devs.push(if std > 0.0 && std.is_finite() { std as f32 } else { 1.0 });
        }

        Self { means, std_devs }
    }

    pub fn n_features(&self) -> usize {
        self.means.len()
    }

    /// Z-score a raw feature vector
    pub fn normalize(&self, raw: &[f32]) -> Result<Vec<f32>> {
        if raw.len() != self.n_features() {
            return Err(EnsembleError::FeatureMismatch {
                expected: self.n_features(),
                actual: raw.len(),
            });
        }
        Ok(raw
            .iter()
            .zip(self.means.iter().zip(&self.std_devs))
            .map(|(&x, (&mean, &std))| (x - mean) / std)
            .collect())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let stats: ColumnStats = serde_json::from_str(&contents)?;
        Self::new(stats.means, stats.std_devs)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

impl Default for ColumnStats {
    fn default() -> Self {
        Self::loan_defaults()
    }
}
