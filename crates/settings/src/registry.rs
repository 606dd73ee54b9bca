//! Known Home Assistant instances and the current selection.

use serde::{Deserialize, Serialize};

/// Ordered list of instance URLs plus the index of the selected one.
///
/// URLs are unique and keep insertion order. When `current` is set it is
/// always a valid index into `instances`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRegistry {
    #[serde(rename = "allInstances", default)]
    instances: Vec<String>,
    #[serde(rename = "currentInstance", default, skip_serializing_if = "Option::is_none")]
    current: Option<usize>,
}

/// What [`InstanceRegistry::add_instance`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The URL was new and has been appended.
    Appended {
        /// The registry held no instances before this call.
        first: bool,
    },
    /// The URL was already known and has been selected.
    Selected,
}

impl InstanceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `url` if absent, then selects it.
    pub fn add_instance(&mut self, url: &str) -> AddOutcome {
        if let Some(index) = self.position(url) {
            self.current = Some(index);
            return AddOutcome::Selected;
        }

        let first = self.instances.is_empty();
        self.instances.push(url.to_string());
        self.current = Some(self.instances.len() - 1);
        AddOutcome::Appended { first }
    }

    /// Returns the selected URL, if any.
    pub fn current_instance(&self) -> Option<&str> {
        self.current
            .and_then(|i| self.instances.get(i))
            .map(String::as_str)
    }

    /// Selects a known URL. Unknown URLs leave the selection untouched.
    ///
    /// Returns `true` when the URL was found.
    pub fn select_instance(&mut self, url: &str) -> bool {
        match self.position(url) {
            Some(index) => {
                self.current = Some(index);
                true
            }
            None => false,
        }
    }

    /// Unsets the selection without forgetting any instance.
    pub fn clear_current(&mut self) {
        self.current = None;
    }

    /// All known instances in insertion order.
    pub fn instances(&self) -> &[String] {
        &self.instances
    }

    pub fn contains(&self, url: &str) -> bool {
        self.position(url).is_some()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Restores the uniqueness and index invariants after loading a
    /// hand-edited file.
    pub(crate) fn normalize(&mut self) {
        if self.current.is_some_and(|i| i >= self.instances.len()) {
            self.current = None;
        }
        let mut seen = std::collections::HashSet::new();
        let selected = self.current_instance().map(str::to_string);
        self.instances.retain(|url| seen.insert(url.clone()));
        self.current = selected.and_then(|url| self.position(&url));
    }

    fn position(&self, url: &str) -> Option<usize> {
        self.instances.iter().position(|known| known == url)
    }
}
