//! Upload Validator for Media Type and Size Checking

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default upload limit (10 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Upload limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadLimits {
    /// Largest accepted payload in bytes (inclusive)
    pub max_upload_bytes: usize,
    /// Accepted declared media types
    pub accepted_media_types: Vec<String>,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            accepted_media_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/webp".to_string(),
                "image/bmp".to_string(),
            ],
        }
    }
}

/// Lowercase a media type and drop parameters (`image/PNG; q=1` -> `image/png`)
pub fn normalize_media_type(media_type: &str) -> String {
    media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Validator for uploaded images
#[derive(Debug, Clone)]
pub struct UploadValidator {
    limits: UploadLimits,
    accepted: Vec<String>,
}

impl UploadValidator {
    /// Create a new validator with given limits
    pub fn new(limits: UploadLimits) -> Self {
        let accepted = limits
            .accepted_media_types
            .iter()
            .map(|m| normalize_media_type(m))
            .collect();
        Self { limits, accepted }
    }

    /// Validate the declared media type
    pub fn validate_media_type(&self, media_type: &str) -> Result<(), ValidationError> {
        let normalized = normalize_media_type(media_type);
        if self.accepted.iter().any(|m| *m == normalized) {
            Ok(())
        } else {
            Err(ValidationError::UnsupportedMediaType {
                media_type: media_type.to_string(),
                accepted: self.accepted.join(", "),
            })
        }
    }

    /// Validate payload size
    pub fn validate_size(&self, size: usize) -> Result<(), ValidationError> {
        if size == 0 {
            Err(ValidationError::EmptyPayload)
        } else if size > self.limits.max_upload_bytes {
            Err(ValidationError::PayloadTooLarge {
                size,
                limit: self.limits.max_upload_bytes,
            })
        } else {
            Ok(())
        }
    }

    /// Validate an upload; size is checked first so huge bodies fail fast
    pub fn validate(&self, size: usize, media_type: &str) -> Result<(), ValidationError> {
        self.validate_size(size)?;
        self.validate_media_type(media_type)?;
        debug!("Upload accepted: {} bytes, {}", size, media_type);
        Ok(())
    }
}

impl Default for UploadValidator {
    fn default() -> Self {
        Self::new(UploadLimits::default())
    }
}
