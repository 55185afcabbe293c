//! Leaf Inference Service
//!
//! Orchestrates one prediction request: upload validation, preprocessing,
//! the forward pass and the decision rule. Each stage's failure is reported
//! as its own error kind.

mod options;
mod response;
mod service;

pub use options::ServiceOptions;
pub use response::{HealthReport, PredictionResponse, RankedClass, UNCERTAIN_CLASS};
pub use service::InferenceService;

pub use decision_engine::{PredictionVerdict, RankedLabel};
pub use tokio_util::sync::CancellationToken;

use data_validator::ValidationError;
use decision_engine::DecisionError;
use inference_engine::InferenceError;
use preprocessor::DecodeError;
use thiserror::Error;

/// Per-request (and construction) failures
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Bad media type or size, rejected before decoding
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Bytes are not a decodable image
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Pipeline and model disagree; a deployment fault
    #[error(transparent)]
    Inference(#[from] InferenceError),

    /// Decision rule could not interpret the model output
    #[error("Decision rule rejected model output: {0}")]
    Decision(#[from] DecisionError),

    /// Inference worker panicked or was aborted
    #[error("Inference worker failed: {0}")]
    Worker(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    #[error("Invalid service options: {0}")]
    InvalidOptions(String),
}

impl ServiceError {
    /// Stable error kind reported to callers and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation_error",
            ServiceError::Decode(_) => "decode_error",
            ServiceError::Inference(_) | ServiceError::Decision(_) | ServiceError::Worker(_) => {
                "inference_error"
            }
            ServiceError::Cancelled => "cancelled",
            ServiceError::Timeout(_) => "timeout",
            ServiceError::InvalidOptions(_) => "configuration_error",
        }
    }

    /// Whether the caller sent something wrong (as opposed to a server fault)
    pub fn is_client_error(&self) -> bool {
        matches!(self, ServiceError::Validation(_) | ServiceError::Decode(_))
    }
}
