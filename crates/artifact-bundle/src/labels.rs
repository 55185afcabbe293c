//! Index-stable class label mapping

use crate::ArtifactError;
use std::collections::{BTreeMap, HashSet};

/// Ordered class names; position `i` names model output `i`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    names: Vec<String>,
}

impl LabelMap {
    /// Create a label map from names in index order
    pub fn new(names: Vec<String>) -> Result<Self, ArtifactError> {
        if names.is_empty() {
            return Err(ArtifactError::MalformedLabels("no labels defined".into()));
        }

        let mut seen = HashSet::with_capacity(names.len());
        for (index, name) in names.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(ArtifactError::MalformedLabels(format!(
                    "label {} is empty",
                    index
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(ArtifactError::MalformedLabels(format!(
                    "label {:?} appears more than once",
                    name
                )));
            }
        }

        Ok(Self { names })
    }

    /// Parse `{"0": "name", "1": "name", ...}` with contiguous indices
    pub fn from_json(text: &str) -> Result<Self, ArtifactError> {
        let raw: BTreeMap<String, String> = serde_json::from_str(text)
            .map_err(|e| ArtifactError::MalformedLabels(e.to_string()))?;

        let mut by_index = BTreeMap::new();
        for (key, name) in raw {
            let index: usize = key.trim().parse().map_err(|_| {
                ArtifactError::MalformedLabels(format!("index {:?} is not an integer", key))
            })?;
            if by_index.insert(index, name).is_some() {
                return Err(ArtifactError::MalformedLabels(format!(
                    "index {} is defined more than once",
                    index
                )));
            }
        }

        // BTreeMap iterates in ascending order, so any gap shows up as a mismatch
        for (expected, index) in by_index.keys().enumerate() {
            if *index != expected {
                return Err(ArtifactError::MalformedLabels(format!(
                    "indices must be contiguous from 0, missing {}",
                    expected
                )));
            }
        }

        Self::new(by_index.into_values().collect())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name for a model output index
    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.names
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}
