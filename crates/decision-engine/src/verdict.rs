//! Verdict types

use serde::{Deserialize, Serialize};

/// One entry of the ranked alternatives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedLabel {
    /// Class name
    pub label: String,
    /// Position in the model output
    pub index: usize,
    /// Probability (0.0 to 1.0)
    pub confidence: f32,
}

/// Outcome of applying the threshold to the top-ranked class
///
/// A confident verdict always carries its label; an uncertain one never does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum PredictionVerdict {
    Confident {
        label: String,
        confidence: f32,
        top3: Vec<RankedLabel>,
    },
    Uncertain {
        confidence: f32,
        top3: Vec<RankedLabel>,
    },
}

impl PredictionVerdict {
    /// Probability of the top-ranked class
    pub fn confidence(&self) -> f32 {
        match self {
            PredictionVerdict::Confident { confidence, .. }
            | PredictionVerdict::Uncertain { confidence, .. } => *confidence,
        }
    }

    /// Ranked alternatives, best first
    pub fn top3(&self) -> &[RankedLabel] {
        match self {
            PredictionVerdict::Confident { top3, .. } | PredictionVerdict::Uncertain { top3, .. } => {
                top3
            }
        }
    }

    /// Committed label, `None` when uncertain
    pub fn label(&self) -> Option<&str> {
        match self {
            PredictionVerdict::Confident { label, .. } => Some(label),
            PredictionVerdict::Uncertain { .. } => None,
        }
    }

    pub fn is_confident(&self) -> bool {
        matches!(self, PredictionVerdict::Confident { .. })
    }

    /// Outcome name used in logs and metrics
    pub fn outcome(&self) -> &'static str {
        match self {
            PredictionVerdict::Confident { .. } => "confident",
            PredictionVerdict::Uncertain { .. } => "uncertain",
        }
    }
}
