//! Validation Error Types

use thiserror::Error;

/// Upload rejected before decoding
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Declared media type is not an accepted image format
    #[error("Unsupported media type {media_type:?}; accepted: {accepted}")]
    UnsupportedMediaType { media_type: String, accepted: String },

    /// Payload exceeds the configured limit
    #[error("Upload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Nothing was uploaded
    #[error("Upload is empty")]
    EmptyPayload,

    /// Request carried no image file
    #[error("Missing image file: {0}")]
    MissingFile(String),
}
