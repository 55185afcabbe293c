//! Model Artifact Bundle
//!
//! The versioned set of trained weights, label mapping and preprocessing
//! contract that together define a deployable leaf classifier. A bundle is
//! loaded once at startup and shared read-only for the process lifetime.

mod bundle;
mod graph;
mod labels;
mod spec;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use bundle::{ArtifactBundle, LABELS_FILE, PREPROCESS_FILE, WEIGHTS_FILE};
pub use graph::{GraphError, ModelFactory, ModelGraph, OnnxModel};
pub use labels::LabelMap;
pub use spec::{
    Interpolation, OutputKind, PreprocessSpec, CHANNELS, IMAGENET_MEAN, IMAGENET_STD,
    MAX_IMAGE_SIZE,
};

use std::path::PathBuf;
use thiserror::Error;

/// Errors while loading or assembling an artifact bundle.
///
/// All of these are fatal at startup: the process must not begin serving.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Bundle file missing: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("Failed to read {}: {message}", path.display())]
    Read { path: PathBuf, message: String },

    #[error("Malformed label mapping: {0}")]
    MalformedLabels(String),

    #[error("Malformed preprocessing spec: {0}")]
    MalformedSpec(String),

    #[error("Invalid model weights: {0}")]
    Weights(String),

    #[error("Label count {labels} does not match model output dimension {output_dim}")]
    LabelCountMismatch { labels: usize, output_dim: usize },
}
