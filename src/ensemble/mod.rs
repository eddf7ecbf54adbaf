//! Ensemble prediction
//!
//! Loads the three trained models from a model directory, normalizes a raw
//! application with explicit column statistics and combines the individual
//! predictions by majority vote.

mod voting;

pub use voting::{risk_score, Decision, ModelVote};

use crate::error::{EnsembleError, Result};
use crate::preprocessing::ColumnStats;
use crate::training::{FeedForwardNetwork, LogisticRegression, Model, ModelKind, RandomForest};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;
use tracing::{info, warn};

/// Raw (unnormalized) loan application
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoanApplication {
    pub income: f32,
    pub credit_score: f32,
    pub loan_amount: f32,
    pub dti_ratio: f32,
    /// 1 when employed, 0 otherwise
    pub employment_status: f32,
}

impl LoanApplication {
    pub fn to_features(&self) -> [f32; 5] {
        [
            self.income,
            self.credit_score,
            self.loan_amount,
            self.dti_ratio,
            self.employment_status,
        ]
    }
}

/// Result of one ensemble query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnsemblePrediction {
    pub votes: Vec<ModelVote>,
    /// `None` when no model answered
    pub decision: Option<Decision>,
    pub linear_probability: Option<f32>,
    pub risk_score: Option<f32>,
}

impl EnsemblePrediction {
    pub fn approvals(&self) -> usize {
        self.votes.iter().filter(|v| v.prediction == 1).count()
    }

    pub fn report(&self) -> String {
        let mut out = String::new();
        for vote in &self.votes {
            let verdict = if vote.prediction == 1 { "Approved" } else { "Not Approved" };
            let _ = writeln!(out, "{}: {}", vote.kind, verdict);
        }
        if let Some(p) = self.linear_probability {
            let _ = writeln!(out, "Logistic Regression approval probability: {:.2}%", p * 100.0);
        }
        let _ = writeln!(out, "Votes: {}/{} approve", self.approvals(), self.votes.len());
        match self.decision {
            Some(decision) => {
                let _ = writeln!(out, "Ensemble decision: {}", decision);
            }
            None => {
                let _ = writeln!(out, "Ensemble decision: unavailable");
            }
        }
        if let Some(score) = self.risk_score {
            let _ = writeln!(out, "Risk score: {:.2}", score);
        }
        out
    }
}

/// The loaded subset of the ensemble plus the statistics used to normalize inputs
pub struct EnsemblePredictor {
    forest: Option<RandomForest>,
    network: Option<FeedForwardNetwork>,
    linear: Option<LogisticRegression>,
    stats: ColumnStats,
}

/// Load one model, tolerating anything except a feature-count mismatch
fn load_member<M: Model>(mut model: M, path: &Path, n_features: usize) -> Result<Option<M>> {
    match model.load(path) {
        Ok(()) if model.n_features() != n_features => Err(EnsembleError::FeatureMismatch {
            expected: n_features,
            actual: model.n_features(),
        }),
        Ok(()) => {
            info!(model = model.name(), path = %path.display(), "Model loaded");
            Ok(Some(model))
        }
        Err(e) => {
            warn!(model = model.name(), path = %path.display(), error = %e, "Model unavailable");
            Ok(None)
        }
    }
}

impl EnsemblePredictor {
    /// Assemble from already-trained models
    pub fn from_models(
        forest: Option<RandomForest>,
        network: Option<FeedForwardNetwork>,
        linear: Option<LogisticRegression>,
        stats: ColumnStats,
    ) -> Result<Self> {
        let predictor = Self {
            forest,
            network,
            linear,
            stats,
        };
        if predictor.n_available() == 0 {
            return Err(EnsembleError::NoModelsAvailable);
        }
        let expected = predictor.stats.n_features();
        for model in predictor.members() {
            if model.n_features() != expected {
                return Err(EnsembleError::FeatureMismatch {
                    expected,
                    actual: model.n_features(),
                });
            }
        }
        Ok(predictor)
    }

    /// Load every model from its fixed file name under `model_dir`
    pub fn load(model_dir: &Path, stats: ColumnStats) -> Result<Self> {
        let n = stats.n_features();
        let forest = load_member(RandomForest::default(), &model_dir.join(ModelKind::Forest.file_name()), n)?;
        let network = load_member(
            FeedForwardNetwork::default(),
            &model_dir.join(ModelKind::Network.file_name()),
            n,
        )?;
        let linear = load_member(
            LogisticRegression::default(),
            &model_dir.join(ModelKind::Linear.file_name()),
            n,
        )?;
        Self::from_models(forest, network, linear, stats)
    }

    fn members(&self) -> impl Iterator<Item = &dyn Model> {
        let forest = self.forest.as_ref().map(|m| m as &dyn Model);
        let network = self.network.as_ref().map(|m| m as &dyn Model);
        let linear = self.linear.as_ref().map(|m| m as &dyn Model);
        [forest, network, linear].into_iter().flatten()
    }

    pub fn n_available(&self) -> usize {
        self.members().count()
    }

    pub fn available(&self) -> Vec<ModelKind> {
        let mut kinds = Vec::with_capacity(3);
        if self.forest.is_some() {
            kinds.push(ModelKind::Forest);
        }
        if self.network.is_some() {
            kinds.push(ModelKind::Network);
        }
        if self.linear.is_some() {
            kinds.push(ModelKind::Linear);
        }
        kinds
    }

    pub fn stats(&self) -> &ColumnStats {
        &self.stats
    }

    /// Normalize a raw feature vector and query every loaded model
    pub fn predict(&self, raw: &[f32]) -> Result<EnsemblePrediction> {
        let features = self.stats.normalize(raw)?;
        let mut votes = Vec::with_capacity(3);

        if let Some(forest) = &self.forest {
            votes.push(ModelVote {
                kind: ModelKind::Forest,
                prediction: forest.predict(&features)?,
            });
        }

        let network_prediction = match &self.network {
            Some(network) => {
                let prediction = network.predict(&features)?;
                votes.push(ModelVote {
                    kind: ModelKind::Network,
                    prediction,
                });
                Some(prediction)
            }
            None => None,
        };

        let linear_probability = match &self.linear {
            Some(linear) => {
                let p = linear.predict_proba(&features)?;
                votes.push(ModelVote {
                    kind: ModelKind::Linear,
                    prediction: i32::from(p >= 0.5),
                });
                Some(p)
            }
            None => None,
        };

        Ok(EnsemblePrediction {
            decision: Decision::from_predictions(&votes),
            risk_score: risk_score(linear_probability, network_prediction),
            votes,
            linear_probability,
        })
    }

    pub fn predict_application(&self, application: &LoanApplication) -> Result<EnsemblePrediction> {
        self.predict(&application.to_features())
    }
}
