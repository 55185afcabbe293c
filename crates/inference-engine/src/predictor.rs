//! Predictor Implementation

use crate::{InferenceError, ProbabilityVector};
use artifact_bundle::{ArtifactBundle, ModelGraph, OutputKind};
use preprocessor::NormalizedTensor;
use std::time::Instant;
use tracing::{debug, info};

/// Owns one model graph instance and turns tensors into probabilities
///
/// `infer` takes `&mut self`: a predictor is never shared between threads,
/// concurrent callers go through [`crate::PredictorPool`].
pub struct Predictor {
    graph: Box<dyn ModelGraph>,
    expected_shape: [usize; 3],
    output_dim: usize,
    output: OutputKind,
}

impl Predictor {
    /// Instantiate the bundle's model graph
    pub fn new(bundle: &ArtifactBundle) -> Result<Self, InferenceError> {
        let spec = bundle.preprocess_spec();
        let graph = bundle
            .model()
            .instantiate()
            .map_err(|e| InferenceError::ModelLoadError(e.to_string()))?;

        info!(
            "Predictor ready: arch={}, input={:?}, classes={}",
            spec.arch(),
            spec.tensor_shape(),
            bundle.output_dim()
        );

        Ok(Self {
            graph,
            expected_shape: spec.tensor_shape(),
            output_dim: bundle.output_dim(),
            output: spec.output(),
        })
    }

    /// Input shape derived from the bundle's spec
    pub fn expected_shape(&self) -> [usize; 3] {
        self.expected_shape
    }

    /// Expected length of the model output
    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    /// Run a forward pass and normalize the scores
    pub fn infer(&mut self, tensor: &NormalizedTensor) -> Result<ProbabilityVector, InferenceError> {
        let shape = tensor.shape();
        if shape != self.expected_shape {
            return Err(InferenceError::InvalidInputShape {
                expected: format!("{:?}", self.expected_shape),
                actual: format!("{:?}", shape),
            });
        }

        let start = Instant::now();
        let scores = self
            .graph
            .forward(&tensor.to_vec())
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;

        if scores.len() != self.output_dim {
            return Err(InferenceError::InvalidOutput(format!(
                "model produced {} scores, bundle declares {} labels",
                scores.len(),
                self.output_dim
            )));
        }

        let probabilities = match self.output {
            OutputKind::Logits => ProbabilityVector::from_logits(&scores)?,
            OutputKind::Probabilities => ProbabilityVector::new(scores)?,
        };

        debug!("Inference completed in {}us", start.elapsed().as_micros());
        Ok(probabilities)
    }
}
