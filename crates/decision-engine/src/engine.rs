//! Threshold decision rule

use crate::{DecisionError, PredictionVerdict, RankedLabel};
use std::cmp::Ordering;
use tracing::{debug, info};

/// Minimum top probability for a confident verdict (inclusive)
pub const DEFAULT_THRESHOLD: f32 = 0.50;

/// Number of ranked alternatives returned with every verdict
pub const TOP_K: usize = 3;

/// Decision engine holding a validated threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionEngine {
    threshold: f32,
}

impl DecisionEngine {
    /// Create an engine, rejecting thresholds outside `[0, 1]`
    pub fn new(threshold: f32) -> Result<Self, DecisionError> {
        check_threshold(threshold)?;
        info!("Creating decision engine with threshold {:.2}", threshold);
        Ok(Self { threshold })
    }

    /// Threshold this engine applies
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn decide(
        &self,
        probabilities: &[f32],
        labels: &[String],
    ) -> Result<PredictionVerdict, DecisionError> {
        decide(probabilities, labels, self.threshold)
    }
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// Rank every label, best first
///
/// Sorted descending by probability; equal probabilities keep ascending
/// label index, so the order never depends on anything but the input.
pub fn rank(probabilities: &[f32], labels: &[String]) -> Result<Vec<RankedLabel>, DecisionError> {
    if probabilities.is_empty() {
        return Err(DecisionError::Empty);
    }
    if probabilities.len() != labels.len() {
        return Err(DecisionError::LengthMismatch {
            probabilities: probabilities.len(),
            labels: labels.len(),
        });
    }
    if let Some(index) = probabilities.iter().position(|p| !p.is_finite()) {
        return Err(DecisionError::NonFinite { index });
    }

    let mut ranked: Vec<RankedLabel> = probabilities
        .iter()
        .zip(labels)
        .enumerate()
        .map(|(index, (&confidence, label))| RankedLabel {
            label: label.clone(),
            index,
            // -0.0 + 0.0 == +0.0, so signed zeros tie under total_cmp
            confidence: confidence + 0.0,
        })
        .collect();

    ranked.sort_by(|a, b| match b.confidence.total_cmp(&a.confidence) {
        Ordering::Equal => a.index.cmp(&b.index),
        other => other,
    });

    Ok(ranked)
}

/// Apply the threshold rule to a probability distribution
pub fn decide(
    probabilities: &[f32],
    labels: &[String],
    threshold: f32,
) -> Result<PredictionVerdict, DecisionError> {
    check_threshold(threshold)?;

    let mut top3 = rank(probabilities, labels)?;
    top3.truncate(TOP_K);

    // rank() rejects empty input, so there is always a first entry
    let best = top3[0].clone();

    if best.confidence >= threshold {
        debug!(
            "Confident: {} ({:.4} >= {:.2})",
            best.label, best.confidence, threshold
        );
        Ok(PredictionVerdict::Confident {
            label: best.label,
            confidence: best.confidence,
            top3,
        })
    } else {
        debug!(
            "Uncertain: best {} ({:.4} < {:.2})",
            best.label, best.confidence, threshold
        );
        Ok(PredictionVerdict::Uncertain {
            confidence: best.confidence,
            top3,
        })
    }
}

fn check_threshold(threshold: f32) -> Result<(), DecisionError> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(DecisionError::InvalidThreshold(threshold))
    }
}
