//! Synthetic models and bundles for tests
//!
//! Lets downstream crates exercise the full pipeline without an ONNX file.

use crate::{
    ArtifactBundle, GraphError, LabelMap, ModelFactory, ModelGraph, OutputKind, PreprocessSpec,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Model that returns the same scores for every input
#[derive(Debug)]
pub struct FixedOutputModel {
    output: Vec<f32>,
    calls: Arc<AtomicUsize>,
}

impl FixedOutputModel {
    pub fn new(output: Vec<f32>) -> Self {
        Self {
            output,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of forward passes run across all instances
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ModelFactory for FixedOutputModel {
    fn output_dim(&self) -> usize {
        self.output.len()
    }

    fn instantiate(&self) -> Result<Box<dyn ModelGraph>, GraphError> {
        Ok(Box::new(FixedGraph {
            output: self.output.clone(),
            calls: Arc::clone(&self.calls),
        }))
    }
}

struct FixedGraph {
    output: Vec<f32>,
    calls: Arc<AtomicUsize>,
}

impl ModelGraph for FixedGraph {
    fn forward(&mut self, _input: &[f32]) -> Result<Vec<f32>, GraphError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.output.clone())
    }
}

/// Three-class model whose logits are the mean of each input channel
///
/// Output depends on the pixels, which makes it useful for parity and
/// determinism checks.
#[derive(Debug, Default)]
pub struct ChannelMeanModel;

impl ModelFactory for ChannelMeanModel {
    fn output_dim(&self) -> usize {
        3
    }

    fn instantiate(&self) -> Result<Box<dyn ModelGraph>, GraphError> {
        Ok(Box::new(ChannelMeanGraph))
    }
}

struct ChannelMeanGraph;

impl ModelGraph for ChannelMeanGraph {
    fn forward(&mut self, input: &[f32]) -> Result<Vec<f32>, GraphError> {
        let plane = input.len() / 3;
        if plane == 0 {
            return Err(GraphError("empty input".into()));
        }
        Ok(input
            .chunks(plane)
            .take(3)
            .map(|c| c.iter().sum::<f32>() / plane as f32)
            .collect())
    }
}

/// The three potato leaf classes in training order
pub fn potato_labels() -> LabelMap {
    LabelMap::new(vec![
        "Potato___Early_blight".to_string(),
        "Potato___Late_blight".to_string(),
        "Potato___healthy".to_string(),
    ])
    .expect("static labels are valid")
}

/// Bundle over the potato labels with ImageNet normalization
pub fn synthetic_bundle(
    model: Arc<dyn ModelFactory>,
    image_size: u32,
    output: OutputKind,
) -> ArtifactBundle {
    let spec = PreprocessSpec::imagenet("synthetic", image_size)
        .expect("valid synthetic spec")
        .with_output(output)
        .with_version("test");
    ArtifactBundle::from_parts(model, potato_labels(), spec).expect("consistent synthetic bundle")
}
