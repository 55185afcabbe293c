//! Decision Engine
//!
//! Maps a probability distribution to a confident or uncertain verdict
//! using a fixed threshold and a reproducible top-k ranking.

mod engine;
mod verdict;

pub use engine::{decide, rank, DecisionEngine, DEFAULT_THRESHOLD, TOP_K};
pub use verdict::{PredictionVerdict, RankedLabel};

use thiserror::Error;

/// Inputs the decision rule cannot interpret
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecisionError {
    #[error("Probability vector is empty")]
    Empty,

    #[error("Got {probabilities} probabilities for {labels} labels")]
    LengthMismatch { probabilities: usize, labels: usize },

    #[error("Probability at index {index} is not finite")]
    NonFinite { index: usize },

    #[error("Threshold {0} is outside [0, 1]")]
    InvalidThreshold(f32),
}
