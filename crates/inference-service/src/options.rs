//! Service options

use data_validator::{UploadLimits, DEFAULT_MAX_UPLOAD_BYTES};
use decision_engine::DEFAULT_THRESHOLD;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for the inference service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceOptions {
    /// Minimum top probability for a confident verdict (inclusive)
    pub threshold: f32,
    /// Largest accepted upload in bytes
    pub max_upload_bytes: usize,
    /// Accepted declared media types
    pub accepted_media_types: Vec<String>,
    /// Number of predictor instances
    pub pool_size: usize,
    /// Overall per-request deadline, including the wait for a predictor
    pub request_timeout_ms: u64,
    /// Guidance returned with uncertain verdicts
    pub uncertain_message: String,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        let upload = UploadLimits::default();
        Self {
            threshold: DEFAULT_THRESHOLD,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            accepted_media_types: upload.accepted_media_types,
            pool_size: 2,
            request_timeout_ms: 10_000,
            uncertain_message: "The model is not confident about this image. \
                Please upload a clear, well-lit photo of a single potato leaf."
                .to_string(),
        }
    }
}

impl ServiceOptions {
    /// Limits handed to the upload validator
    pub fn upload_limits(&self) -> UploadLimits {
        UploadLimits {
            max_upload_bytes: self.max_upload_bytes,
            accepted_media_types: self.accepted_media_types.clone(),
        }
    }

    /// Per-request deadline
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Check values that would make the service unusable
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(format!("threshold must be in [0, 1], got {}", self.threshold));
        }
        if self.pool_size == 0 {
            return Err("pool_size must be at least 1".into());
        }
        if self.max_upload_bytes == 0 {
            return Err("max_upload_bytes must be positive".into());
        }
        if self.accepted_media_types.is_empty() {
            return Err("accepted_media_types must not be empty".into());
        }
        if self.request_timeout_ms == 0 {
            return Err("request_timeout_ms must be positive".into());
        }
        if self.uncertain_message.trim().is_empty() {
            return Err("uncertain_message must not be empty".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let options = ServiceOptions::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.threshold, 0.5);
        assert_eq!(options.upload_limits().max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
    }

    #[test]
    fn test_invalid_values() {
        for options in [
            ServiceOptions { threshold: 1.5, ..Default::default() },
            ServiceOptions { pool_size: 0, ..Default::default() },
            ServiceOptions { max_upload_bytes: 0, ..Default::default() },
            ServiceOptions { accepted_media_types: vec![], ..Default::default() },
            ServiceOptions { request_timeout_ms: 0, ..Default::default() },
            ServiceOptions { uncertain_message: " ".into(), ..Default::default() },
        ] {
            assert!(options.validate().is_err(), "accepted {:?}", options);
        }
    }
}
