//! Classification metrics

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Binary confusion counts; class 1 is the positive class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl ConfusionMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, actual: i32, predicted: i32) {
        match (actual == 1, predicted == 1) {
            (true, true) => self.true_positives += 1,
            (false, true) => self.false_positives += 1,
            (false, false) => self.true_negatives += 1,
            (true, false) => self.false_negatives += 1,
        }
    }

    pub fn merge(&mut self, other: &ConfusionMatrix) {
        self.true_positives += other.true_positives;
        self.false_positives += other.false_positives;
        self.true_negatives += other.true_negatives;
        self.false_negatives += other.false_negatives;
    }

    pub fn total(&self) -> usize {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }

    /// Rows are actual classes, columns predicted classes
    pub fn as_matrix(&self) -> [[usize; 2]; 2] {
        [
            [self.true_negatives, self.false_positives],
            [self.false_negatives, self.true_positives],
        ]
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Metrics of one model over one evaluation set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub model_name: String,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub confusion: ConfusionMatrix,
    pub evaluation_time_secs: f64,
}

impl EvaluationMetrics {
    /// Derive the scores from confusion counts; every score is 0 when its denominator is
    pub fn from_confusion(model_name: impl Into<String>, confusion: ConfusionMatrix, evaluation_time_secs: f64) -> Self {
        let tp = confusion.true_positives;
        let accuracy = ratio(tp + confusion.true_negatives, confusion.total());
        let precision = ratio(tp, tp + confusion.false_positives);
        let recall = ratio(tp, tp + confusion.false_negatives);
        let f1_score = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            model_name: model_name.into(),
            accuracy,
            precision,
            recall,
            f1_score,
            confusion,
            evaluation_time_secs,
        }
    }

    pub fn n_samples(&self) -> usize {
        self.confusion.total()
    }

    pub fn report(&self) -> String {
        let m = self.confusion.as_matrix();
        let mut out = String::new();
        let _ = writeln!(out, "Model: {}", self.model_name);
        let _ = writeln!(out, "  Samples:   {}", self.n_samples());
        let _ = writeln!(out, "  Accuracy:  {:.4}", self.accuracy);
        let _ = writeln!(out, "  Precision: {:.4}", self.precision);
        let _ = writeln!(out, "  Recall:    {:.4}", self.recall);
        let _ = writeln!(out, "  F1 Score:  {:.4}", self.f1_score);
        let _ = writeln!(out, "  Confusion Matrix (rows = actual, columns = predicted):");
        let _ = writeln!(out, "              Pred 0   Pred 1");
        let _ = writeln!(out, "    Actual 0  {:>6}   {:>6}", m[0][0], m[0][1]);
        let _ = writeln!(out, "    Actual 1  {:>6}   {:>6}", m[1][0], m[1][1]);
        let _ = writeln!(out, "  Evaluation time: {:.4}s", self.evaluation_time_secs);
        out
    }
}
