//! Upload Validation
//!
//! Cheap checks on the declared media type and payload size that run before
//! any image decoding or model work.

mod error;
mod validator;

pub use error::ValidationError;
pub use validator::{normalize_media_type, UploadLimits, UploadValidator, DEFAULT_MAX_UPLOAD_BYTES};
