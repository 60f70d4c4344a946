//! Work holding clamps.

use crate::{ConfigNode, ModelError};

/// A clamp, as described by the configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Clamp {
    /// Human readable name, if configured.
    pub name: Option<String>,

    /// Everything the configuration says about this clamp.
    pub config: ConfigNode,
}

impl Clamp {
    /// Build a clamp from one child of the `clamps` node.
    pub fn from_config(node: &ConfigNode) -> Self {
        Self {
            name: node.attribute("name").map(str::to_owned),
            config: node.clone(),
        }
    }
}

/// Clamps in the order they were configured.
#[derive(Debug, Clone, Default)]
pub struct ClampRegistry {
    clamps: Vec<Clamp>,
}

impl ClampRegistry {
    /// Append a clamp, returning its index.
    pub fn add(&mut self, clamp: Clamp) -> usize {
        self.clamps.push(clamp);
        tracing::debug!(count = self.clamps.len(), "added clamp");
        self.clamps.len() - 1
    }

    /// Look up the clamp at `index`.
    pub fn get(&self, index: usize) -> Result<&Clamp, ModelError> {
        self.clamps.get(index).ok_or(ModelError::NoSuchClamp(index))
    }

    /// Number of clamps.
    pub fn len(&self) -> usize {
        self.clamps.len()
    }

    /// `true` when no clamp is configured.
    pub fn is_empty(&self) -> bool {
        self.clamps.is_empty()
    }

    /// All clamps, in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &Clamp> {
        self.clamps.iter()
    }
}
