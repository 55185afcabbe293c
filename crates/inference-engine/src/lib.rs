//! Leaf Classifier Inference Engine
//!
//! Runs the bundle's model graph over a normalized tensor and turns the raw
//! scores into a validated probability distribution.

mod pool;
mod predictor;
mod probability;

pub use pool::{PooledPredictor, PredictorPool};
pub use predictor::Predictor;
pub use probability::{softmax, ProbabilityVector, SUM_TOLERANCE};

use thiserror::Error;

/// Errors during inference
///
/// These indicate a deployment fault (bundle and pipeline disagree), never bad user input.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Model load failed: {0}")]
    ModelLoadError(String),
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    #[error("Invalid input shape: expected {expected}, got {actual}")]
    InvalidInputShape { expected: String, actual: String },
    #[error("Invalid model output: {0}")]
    InvalidOutput(String),
    #[error("Predictor pool size must be at least 1")]
    InvalidPoolSize,
    #[error("Predictor pool is closed")]
    PoolClosed,
}
