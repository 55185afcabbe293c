//! Response contract
//!
//! Confident and uncertain predictions share one shape (`class`,
//! `confidence`, `top3`); the uncertain case uses the sentinel class
//! `"uncertain"` and adds a `message`.

use chrono::{DateTime, Utc};
use decision_engine::PredictionVerdict;
use serde::{Deserialize, Serialize};

/// Sentinel class for low-confidence predictions
pub const UNCERTAIN_CLASS: &str = "uncertain";

/// Ranked alternative as exposed to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedClass {
    pub class: String,
    pub confidence: f32,
}

/// Prediction body returned to the front-end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub class: String,
    pub confidence: f32,
    pub top3: Vec<RankedClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PredictionResponse {
    pub fn from_verdict(verdict: &PredictionVerdict, uncertain_message: &str) -> Self {
        let top3 = verdict
            .top3()
            .iter()
            .map(|r| RankedClass {
                class: r.label.clone(),
                confidence: r.confidence,
            })
            .collect();

        match verdict {
            PredictionVerdict::Confident {
                label, confidence, ..
            } => Self {
                class: label.clone(),
                confidence: *confidence,
                top3,
                message: None,
            },
            PredictionVerdict::Uncertain { confidence, .. } => Self {
                class: UNCERTAIN_CLASS.to_string(),
                confidence: *confidence,
                top3,
                message: Some(uncertain_message.to_string()),
            },
        }
    }

    /// Whether the class is the uncertain sentinel
    pub fn is_uncertain(&self) -> bool {
        self.class == UNCERTAIN_CLASS
    }
}

/// Readiness report describing the loaded bundle's contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub labels: Vec<String>,
    pub img_size: u32,
    pub arch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_version: Option<String>,
    pub loaded_at: DateTime<Utc>,
    pub threshold: f32,
    pub pool_size: usize,
    pub pool_available: usize,
}
