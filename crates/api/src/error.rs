//! API Error Types

use artifact_bundle::ArtifactError;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use data_validator::ValidationError;
use inference_service::ServiceError;
use serde::Serialize;
use thiserror::Error;

/// Failure while answering a request
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Body is not well-formed multipart, or exceeded the body limit
    #[error("Malformed upload: {message}")]
    Multipart { status: StatusCode, message: String },
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::Multipart {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Service(ServiceError::Validation(err))
    }
}

/// JSON body for every non-2xx response
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Service(err) => service_status(err),
            ApiError::Multipart { status, .. } => *status,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Service(err) => err.kind(),
            ApiError::Multipart { status, .. } if *status == StatusCode::PAYLOAD_TOO_LARGE => {
                "validation_error"
            }
            ApiError::Multipart { .. } => "bad_request",
        }
    }
}

fn service_status(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::Validation(v) => match v {
            ValidationError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ValidationError::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ValidationError::EmptyPayload | ValidationError::MissingFile(_) => {
                StatusCode::BAD_REQUEST
            }
        },
        ServiceError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ServiceError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        ServiceError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        ServiceError::Inference(_)
        | ServiceError::Decision(_)
        | ServiceError::Worker(_)
        | ServiceError::InvalidOptions(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Internal details stay in the logs
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "Inference failed; the model bundle may be misconfigured".to_string()
        } else {
            self.to_string()
        };
        let body = ErrorBody {
            error: self.kind(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

/// Failure before the listener is up
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to load artifact bundle: {0}")]
    Artifacts(#[from] ArtifactError),

    #[error("Failed to start inference service: {0}")]
    Service(#[from] ServiceError),

    #[error("Failed to install metrics recorder: {0}")]
    Metrics(String),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),

    #[error("Invalid bind address {addr:?}: {message}")]
    Bind { addr: String, message: String },

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}
