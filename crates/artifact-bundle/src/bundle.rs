//! Artifact bundle loading

use crate::{ArtifactError, LabelMap, ModelFactory, OnnxModel, PreprocessSpec};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// ONNX weights file name inside a bundle directory
pub const WEIGHTS_FILE: &str = "model.onnx";
/// Label mapping file name inside a bundle directory
pub const LABELS_FILE: &str = "labels.json";
/// Preprocessing spec file name inside a bundle directory
pub const PREPROCESS_FILE: &str = "preprocess.txt";

/// Fully validated, immutable model bundle
///
/// There is no way to obtain a partially valid bundle: every constructor runs
/// the same consistency checks before returning.
#[derive(Debug)]
pub struct ArtifactBundle {
    labels: LabelMap,
    spec: PreprocessSpec,
    model: Arc<dyn ModelFactory>,
    source: Option<PathBuf>,
    loaded_at: DateTime<Utc>,
}

impl ArtifactBundle {
    /// Load a bundle directory containing weights, labels and preprocessing spec
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let dir = dir.as_ref();
        info!("Loading artifact bundle from {}", dir.display());

        let weights_path = dir.join(WEIGHTS_FILE);
        let labels_path = dir.join(LABELS_FILE);
        let spec_path = dir.join(PREPROCESS_FILE);

        for path in [&weights_path, &labels_path, &spec_path] {
            if !path.is_file() {
                return Err(ArtifactError::MissingFile(path.clone()));
            }
        }

        let labels = LabelMap::from_json(&read_text(&labels_path)?)?;
        let spec = PreprocessSpec::parse(&read_text(&spec_path)?)?;
        let model = OnnxModel::load(&weights_path, spec.image_size())?;

        let mut bundle = Self::from_parts(Arc::new(model), labels, spec)?;
        bundle.source = Some(dir.to_path_buf());
        Ok(bundle)
    }

    /// Assemble a bundle from already-parsed parts
    pub fn from_parts(
        model: Arc<dyn ModelFactory>,
        labels: LabelMap,
        spec: PreprocessSpec,
    ) -> Result<Self, ArtifactError> {
        let output_dim = model.output_dim();
        if labels.len() != output_dim {
            return Err(ArtifactError::LabelCountMismatch {
                labels: labels.len(),
                output_dim,
            });
        }

        info!(
            "Artifact bundle ready: arch={}, img_size={}, classes={}, version={}",
            spec.arch(),
            spec.image_size(),
            labels.len(),
            spec.version().unwrap_or("unversioned")
        );

        Ok(Self {
            labels,
            spec,
            model,
            source: None,
            loaded_at: Utc::now(),
        })
    }

    /// Class names in model output order
    pub fn labels(&self) -> &LabelMap {
        &self.labels
    }

    /// Preprocessing the model was trained with
    pub fn preprocess_spec(&self) -> &PreprocessSpec {
        &self.spec
    }

    /// Handle used by predictors to instantiate the model graph
    pub fn model(&self) -> &Arc<dyn ModelFactory> {
        &self.model
    }

    /// Length of the model output, equal to the label count
    pub fn output_dim(&self) -> usize {
        self.model.output_dim()
    }

    /// Directory the bundle was loaded from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// When the bundle was loaded or assembled
    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

fn read_text(path: &Path) -> Result<String, ArtifactError> {
    std::fs::read_to_string(path).map_err(|e| ArtifactError::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
