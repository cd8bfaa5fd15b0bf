//! Ordered, uniquely keyed collection of activation decisions.

use super::error::{BootstrapError, Result};
use crate::controller::{Activation, ControllerName};

#[derive(Debug, Default)]
pub struct Registry {
    entries: Vec<(ControllerName, Activation)>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. A name already present is rejected.
    pub fn insert(&mut self, name: ControllerName, activation: Activation) -> Result<()> {
        if self.contains(name) {
            return Err(BootstrapError::DuplicateController(name));
        }
        self.entries.push((name, activation));
        Ok(())
    }

    pub fn contains(&self, name: ControllerName) -> bool {
        self.entries.iter().any(|(existing, _)| *existing == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stop accepting entries.
    pub fn freeze(self) -> FrozenRegistry {
        FrozenRegistry {
            entries: self.entries,
        }
    }
}

/// A registry that can only be read or consumed.
#[derive(Debug)]
pub struct FrozenRegistry {
    entries: Vec<(ControllerName, Activation)>,
}

impl FrozenRegistry {
    /// Every name, in insertion order
    pub fn names(&self) -> Vec<ControllerName> {
        self.entries.iter().map(|(name, _)| *name).collect()
    }

    pub fn enabled_names(&self) -> Vec<ControllerName> {
        self.entries
            .iter()
            .filter(|(_, activation)| activation.is_enabled())
            .map(|(name, _)| *name)
            .collect()
    }

    pub fn disabled_names(&self) -> Vec<ControllerName> {
        self.entries
            .iter()
            .filter(|(_, activation)| !activation.is_enabled())
            .map(|(name, _)| *name)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for FrozenRegistry {
    type Item = (ControllerName, Activation);
    type IntoIter = std::vec::IntoIter<(ControllerName, Activation)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
