//! Probability distribution over labels

use crate::InferenceError;
use serde::Serialize;

/// Allowed deviation of the probability sum from 1.0
pub const SUM_TOLERANCE: f32 = 1e-3;

/// Per-label probabilities: each in `[0, 1]`, summing to 1 within [`SUM_TOLERANCE`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbabilityVector(Vec<f32>);

impl ProbabilityVector {
    /// Validate values that are already a distribution
    pub fn new(values: Vec<f32>) -> Result<Self, InferenceError> {
        if values.is_empty() {
            return Err(InferenceError::InvalidOutput("empty probability vector".into()));
        }
        if let Some((index, value)) = values
            .iter()
            .enumerate()
            .find(|(_, p)| !p.is_finite() || **p < 0.0 || **p > 1.0)
        {
            return Err(InferenceError::InvalidOutput(format!(
                "probability {} at index {} is outside [0, 1]",
                value, index
            )));
        }

        let sum: f32 = values.iter().sum();
        if (sum - 1.0).abs() > SUM_TOLERANCE {
            return Err(InferenceError::InvalidOutput(format!(
                "probabilities sum to {}, expected 1.0",
                sum
            )));
        }

        Ok(Self(values))
    }

    /// Apply softmax to raw logits
    pub fn from_logits(logits: &[f32]) -> Result<Self, InferenceError> {
        if let Some(index) = logits.iter().position(|l| !l.is_finite()) {
            return Err(InferenceError::InvalidOutput(format!(
                "logit at index {} is not finite",
                index
            )));
        }
        Self::new(softmax(logits))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[f32]> for ProbabilityVector {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

/// Numerically stable softmax (shifts by the max logit)
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
