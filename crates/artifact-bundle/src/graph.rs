//! Model graph handle
//!
//! The bundle owns a [`ModelFactory`]; predictors ask it for their own
//! [`ModelGraph`] instance so no computation context is shared between
//! threads.

use crate::{ArtifactError, CHANNELS};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use tract_onnx::prelude::*;

/// Failure inside the numeric runtime
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct GraphError(pub String);

/// One runnable instance of the classifier
pub trait ModelGraph: Send {
    /// Run a forward pass over a flattened `[1, C, H, W]` input
    fn forward(&mut self, input: &[f32]) -> Result<Vec<f32>, GraphError>;
}

/// Source of model graph instances with a fixed output dimension
pub trait ModelFactory: Send + Sync + fmt::Debug {
    /// Number of scores produced per image
    fn output_dim(&self) -> usize;

    /// Build an independent graph instance
    fn instantiate(&self) -> Result<Box<dyn ModelGraph>, GraphError>;
}

/// ONNX model parsed and optimized with tract
pub struct OnnxModel {
    path: PathBuf,
    model: TypedModel,
    input_shape: [usize; 4],
    output_dim: usize,
}

impl OnnxModel {
    /// Load an ONNX file with its input pinned to `[1, 3, image_size, image_size]`
    pub fn load(path: &Path, image_size: u32) -> Result<Self, ArtifactError> {
        let side = image_size as usize;
        let input_shape = [1, CHANNELS, side, side];
        info!("Loading ONNX weights from {} (input {:?})", path.display(), input_shape);

        let weights_err = |stage: &str, e: TractError| {
            ArtifactError::Weights(format!("{} ({}): {:#}", path.display(), stage, e))
        };

        let model = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(|e| weights_err("parse", e))?
            .with_input_fact(0, f32::fact(input_shape).into())
            .map_err(|e| weights_err("input fact", e))?
            .into_optimized()
            .map_err(|e| weights_err("optimize", e))?;

        let output_fact = model
            .output_fact(0)
            .map_err(|e| weights_err("output fact", e))?;
        let dims = output_fact.shape.as_concrete().ok_or_else(|| {
            ArtifactError::Weights(format!(
                "{}: output shape {:?} is not concrete",
                path.display(),
                output_fact.shape
            ))
        })?;

        // Accept [N] or [1, N]; anything with more than one non-unit axis is not a classifier head
        let output_dim = dims.last().copied().unwrap_or(0);
        if output_dim == 0 || dims.iter().product::<usize>() != output_dim {
            return Err(ArtifactError::Weights(format!(
                "{}: expected a [1, N] classifier output, got {:?}",
                path.display(),
                dims
            )));
        }

        debug!("ONNX model output dimension: {}", output_dim);

        Ok(Self {
            path: path.to_path_buf(),
            model,
            input_shape,
            output_dim,
        })
    }
}

impl fmt::Debug for OnnxModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnnxModel")
            .field("path", &self.path)
            .field("input_shape", &self.input_shape)
            .field("output_dim", &self.output_dim)
            .finish()
    }
}

impl ModelFactory for OnnxModel {
    fn output_dim(&self) -> usize {
        self.output_dim
    }

    fn instantiate(&self) -> Result<Box<dyn ModelGraph>, GraphError> {
        let plan = self
            .model
            .clone()
            .into_runnable()
            .map_err(|e| GraphError(format!("{:#}", e)))?;

        Ok(Box::new(OnnxGraph {
            plan,
            input_shape: self.input_shape,
        }))
    }
}

struct OnnxGraph {
    plan: TypedRunnableModel<TypedModel>,
    input_shape: [usize; 4],
}

impl ModelGraph for OnnxGraph {
    fn forward(&mut self, input: &[f32]) -> Result<Vec<f32>, GraphError> {
        let tensor = Tensor::from_shape(&self.input_shape, input)
            .map_err(|e| GraphError(format!("input tensor: {:#}", e)))?;

        // Each run builds fresh plan state, nothing carries over between calls
        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .map_err(|e| GraphError(format!("forward pass: {:#}", e)))?;

        let scores = outputs
            .first()
            .ok_or_else(|| GraphError("model produced no outputs".into()))?
            .to_array_view::<f32>()
            .map_err(|e| GraphError(format!("output tensor: {:#}", e)))?;

        Ok(scores.iter().copied().collect())
    }
}
