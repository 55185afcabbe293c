//! Image Preprocessing
//!
//! Turns uploaded image bytes into the normalized tensor the model was
//! trained on. Every parameter comes from the bundle's [`PreprocessSpec`];
//! nothing here hardcodes sizes or normalization constants.
//!
//! Pipeline, in order:
//! 1. decode (format sniffed from content)
//! 2. convert to 8-bit RGB (alpha dropped, grey replicated)
//! 3. exact resize to `img_size x img_size` with the bundle's resize filter
//! 4. scale to `[0, 1]`
//! 5. per-channel `(x - mean) / std`, CHW layout

mod pipeline;
mod tensor;

pub use pipeline::{process, Preprocessor, RawImage};
pub use tensor::NormalizedTensor;

pub use artifact_bundle::PreprocessSpec;

use thiserror::Error;

/// Image bytes could not be turned into pixels
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    #[error("Unsupported or corrupt image: {0}")]
    Unsupported(String),

    #[error("Decoded image is empty ({width}x{height})")]
    Empty { width: u32, height: u32 },
}
