//! Preprocessing contract
//!
//! The single source of truth for image size, interpolation and per-channel
//! normalization. Parsed from the bundle's `preprocess.txt`.

use crate::ArtifactError;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

/// Color channels fed to the model (RGB)
pub const CHANNELS: usize = 3;

/// Upper bound on `img_size`; larger values are almost certainly a typo
pub const MAX_IMAGE_SIZE: u32 = 4096;

/// ImageNet normalization mean values (RGB)
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet normalization std values (RGB)
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Resize filter applied when scaling to `img_size x img_size`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    /// Nearest neighbour
    Nearest,
    /// Bilinear (triangle filter)
    #[default]
    Bilinear,
    /// Lanczos with window 3
    Lanczos3,
}

impl Interpolation {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Interpolation::Nearest => "nearest",
            Interpolation::Bilinear => "bilinear",
            Interpolation::Lanczos3 => "lanczos3",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "nearest" => Some(Interpolation::Nearest),
            "bilinear" | "triangle" => Some(Interpolation::Bilinear),
            "lanczos3" => Some(Interpolation::Lanczos3),
            _ => None,
        }
    }
}

/// What the model's final layer emits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Raw scores; the predictor applies softmax
    #[default]
    Logits,
    /// Already a probability distribution (model ends in softmax)
    Probabilities,
}

impl OutputKind {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "logits" => Some(OutputKind::Logits),
            "probabilities" | "softmax" => Some(OutputKind::Probabilities),
            _ => None,
        }
    }
}

/// Validated preprocessing parameters shared by training and serving
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreprocessSpec {
    arch: String,
    image_size: u32,
    normalize_mean: [f32; 3],
    normalize_std: [f32; 3],
    interpolation: Interpolation,
    output: OutputKind,
    version: Option<String>,
}

impl PreprocessSpec {
    /// Create a spec, rejecting values that could never match a trained model
    pub fn new(
        arch: impl Into<String>,
        image_size: u32,
        normalize_mean: [f32; 3],
        normalize_std: [f32; 3],
    ) -> Result<Self, ArtifactError> {
        let arch = arch.into();
        if arch.trim().is_empty() {
            return Err(ArtifactError::MalformedSpec("`arch` must not be empty".into()));
        }
        if image_size == 0 || image_size > MAX_IMAGE_SIZE {
            return Err(ArtifactError::MalformedSpec(format!(
                "`img_size` must be in 1..={}, got {}",
                MAX_IMAGE_SIZE, image_size
            )));
        }
        if normalize_mean.iter().any(|m| !m.is_finite()) {
            return Err(ArtifactError::MalformedSpec(format!(
                "normalization mean must be finite, got {:?}",
                normalize_mean
            )));
        }
        if normalize_std.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(ArtifactError::MalformedSpec(format!(
                "normalization std must be finite and positive, got {:?}",
                normalize_std
            )));
        }

        Ok(Self {
            arch,
            image_size,
            normalize_mean,
            normalize_std,
            interpolation: Interpolation::default(),
            output: OutputKind::default(),
            version: None,
        })
    }

    /// Spec with ImageNet normalization
    pub fn imagenet(arch: impl Into<String>, image_size: u32) -> Result<Self, ArtifactError> {
        Self::new(arch, image_size, IMAGENET_MEAN, IMAGENET_STD)
    }

    /// Replace the resize filter
    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    /// Declare whether the model emits logits or probabilities
    pub fn with_output(mut self, output: OutputKind) -> Self {
        self.output = output;
        self
    }

    /// Tag the spec with a bundle version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Parse the `key = value` text format of `preprocess.txt`
    ///
    /// `#` starts a comment at the beginning of a line or after whitespace;
    /// inside a value (`version = build#42`) it is kept.
    pub fn parse(text: &str) -> Result<Self, ArtifactError> {
        let mut entries = BTreeMap::new();

        for (index, raw) in text.lines().enumerate() {
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }

            let (key, value) = line
                .split_once('=')
                .or_else(|| line.split_once(':'))
                .ok_or_else(|| {
                    ArtifactError::MalformedSpec(format!(
                        "line {}: expected `key = value`, got {:?}",
                        index + 1,
                        line
                    ))
                })?;
            let key = key.trim().to_ascii_lowercase();
            if key.is_empty() {
                return Err(ArtifactError::MalformedSpec(format!("line {}: empty key", index + 1)));
            }
            if entries.insert(key.clone(), value.trim().to_string()).is_some() {
                return Err(ArtifactError::MalformedSpec(format!(
                    "line {}: duplicate key `{}`",
                    index + 1,
                    key
                )));
            }
        }

        let arch = entries
            .remove("arch")
            .ok_or_else(|| ArtifactError::MalformedSpec("missing `arch`".into()))?;

        let image_size = entries
            .remove("img_size")
            .ok_or_else(|| ArtifactError::MalformedSpec("missing `img_size`".into()))?;
        let image_size: u32 = image_size.parse().map_err(|_| {
            ArtifactError::MalformedSpec(format!(
                "`img_size` must be a positive integer, got {:?}",
                image_size
            ))
        })?;

        let scheme = entries.remove("normalize").map(|s| s.to_ascii_lowercase());
        let mean = entries.remove("normalize_mean");
        let std = entries.remove("normalize_std");
        let (mean, std) = match (scheme.as_deref(), mean, std) {
            (Some("imagenet"), None, None) => (IMAGENET_MEAN, IMAGENET_STD),
            (Some("unit") | Some("none"), None, None) => ([0.0; 3], [1.0; 3]),
            (None, None, None) => {
                return Err(ArtifactError::MalformedSpec("missing `normalize`".into()))
            }
            (Some("custom") | None, Some(mean), Some(std)) => (
                parse_triple("normalize_mean", &mean)?,
                parse_triple("normalize_std", &std)?,
            ),
            (Some("custom") | None, _, _) => {
                return Err(ArtifactError::MalformedSpec(
                    "`normalize_mean` and `normalize_std` must both be given".into(),
                ))
            }
            (Some(name @ ("imagenet" | "unit" | "none")), _, _) => {
                return Err(ArtifactError::MalformedSpec(format!(
                    "`normalize = {}` conflicts with explicit mean/std",
                    name
                )))
            }
            (Some(other), _, _) => {
                return Err(ArtifactError::MalformedSpec(format!(
                    "unknown normalization scheme {:?}",
                    other
                )))
            }
        };

        let mut spec = Self::new(arch, image_size, mean, std)?;

        if let Some(value) = entries.remove("resize") {
            spec.interpolation = Interpolation::parse(&value).ok_or_else(|| {
                ArtifactError::MalformedSpec(format!("unknown resize policy {:?}", value))
            })?;
        }
        if let Some(value) = entries.remove("output") {
            spec.output = OutputKind::parse(&value).ok_or_else(|| {
                ArtifactError::MalformedSpec(format!("unknown output kind {:?}", value))
            })?;
        }
        spec.version = entries.remove("version").filter(|v| !v.is_empty());

        for key in entries.keys() {
            warn!("Ignoring unknown preprocessing key `{}`", key);
        }

        Ok(spec)
    }

    /// Architecture identifier
    pub fn arch(&self) -> &str {
        &self.arch
    }

    /// Square input edge length in pixels
    pub fn image_size(&self) -> u32 {
        self.image_size
    }

    /// Per-channel mean subtracted after scaling to [0, 1]
    pub fn normalize_mean(&self) -> [f32; 3] {
        self.normalize_mean
    }

    /// Per-channel divisor applied after the mean
    pub fn normalize_std(&self) -> [f32; 3] {
        self.normalize_std
    }

    /// Resize filter
    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    /// Whether the model emits logits or probabilities
    pub fn output(&self) -> OutputKind {
        self.output
    }

    /// Bundle version, if `preprocess.txt` declares one
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Tensor shape `(channels, img_size, img_size)`
    pub fn tensor_shape(&self) -> [usize; 3] {
        let side = self.image_size as usize;
        [CHANNELS, side, side]
    }
}

fn parse_triple(key: &str, value: &str) -> Result<[f32; 3], ArtifactError> {
    let parts = value
        .split(',')
        .map(|p| p.trim().parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ArtifactError::MalformedSpec(format!("`{}`: {}", key, e)))?;

    match parts.as_slice() {
        [a, b, c] => Ok([*a, *b, *c]),
        _ => Err(ArtifactError::MalformedSpec(format!(
            "`{}` must have exactly 3 values, got {}",
            key,
            parts.len()
        ))),
    }
}

/// Cut a trailing `# comment`; a `#` glued to a value is part of it
fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    bytes
        .iter()
        .enumerate()
        .find(|&(i, &b)| b == b'#' && (i == 0 || bytes[i - 1].is_ascii_whitespace()))
        .map_or(line, |(i, _)| &line[..i])
}
