//! Majority voting and risk scoring

use crate::training::ModelKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Final ensemble recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Approved,
    NotApproved,
    /// Exactly half of the responding models approve
    Borderline,
}

impl Decision {
    /// Decide from the number of approving votes among `total` responding models
    pub fn from_votes(approvals: usize, total: usize) -> Option<Self> {
        if total == 0 {
            return None;
        }
        // ratio > 0.5, == 0.5, < 0.5 without going through floats
        let doubled = approvals * 2;
        Some(match doubled.cmp(&total) {
            std::cmp::Ordering::Greater => Decision::Approved,
            std::cmp::Ordering::Equal => Decision::Borderline,
            std::cmp::Ordering::Less => Decision::NotApproved,
        })
    }

    pub fn from_predictions(votes: &[ModelVote]) -> Option<Self> {
        let approvals = votes.iter().filter(|v| v.prediction == 1).count();
        Self::from_votes(approvals, votes.len())
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Decision::Approved => "Approved",
            Decision::NotApproved => "Not Approved",
            Decision::Borderline => "Borderline - Additional Review Required",
        };
        write!(f, "{}", text)
    }
}

/// One model's answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVote {
    pub kind: ModelKind,
    pub prediction: i32,
}

/// Confidence credited to the network's vote
const NETWORK_APPROVE_CONFIDENCE: f32 = 0.8;
const NETWORK_DECLINE_CONFIDENCE: f32 = 0.2;

/// Auxiliary risk score from the linear probability and the network vote.
///
/// Starts at 50; each available input adds `50 * value` and 0.5 to the weight
/// sum, and the total is divided by twice the weight sum. `None` when neither
/// input is available.
pub fn risk_score(linear_probability: Option<f32>, network_prediction: Option<i32>) -> Option<f32> {
    if linear_probability.is_none() && network_prediction.is_none() {
        return None;
    }

    let mut score = 50.0f32;
    let mut weight = 0.0f32;

    if let Some(p) = linear_probability {
        score += p * 50.0;
        weight += 0.5;
    }
    if let Some(prediction) = network_prediction {
        let confidence = if prediction == 1 {
            NETWORK_APPROVE_CONFIDENCE
        } else {
            NETWORK_DECLINE_CONFIDENCE
        };
        score += confidence * 50.0;
        weight += 0.5;
    }

    if weight > 0.0 {
        score /= weight * 2.0;
    }
    Some(score)
}
