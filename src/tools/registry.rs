//! Name-keyed table of registered capabilities.

use std::collections::HashMap;
use std::sync::Arc;

use super::capability::Capability;
use super::types::ToolDefinition;

/// Capabilities available to a turn, in registration order.
#[derive(Default, Clone)]
pub struct CapabilityRegistry {
    entries: Vec<Arc<dyn Capability>>,
    by_name: HashMap<String, usize>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability, replacing any earlier one with the same name.
    pub fn register(&mut self, capability: Arc<dyn Capability>) {
        let name = capability.name().to_string();
        match self.by_name.get(&name) {
            Some(&slot) => {
                tracing::debug!(tool_name = %name, "replacing registered capability");
                self.entries[slot] = capability;
            }
            None => {
                self.by_name.insert(name, self.entries.len());
                self.entries.push(capability);
            }
        }
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, capability: impl Capability + 'static) -> Self {
        self.register(Arc::new(capability));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.by_name.get(name).map(|&slot| Arc::clone(&self.entries[slot]))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Schemas for every registered capability.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.entries.iter().map(|c| c.definition()).collect()
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|c| c.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{CapabilityFn, CapabilityParameters};

    fn named(name: &str, reply: &'static str) -> CapabilityFn {
        CapabilityFn::new(name, "test", CapabilityParameters::empty(), move |_, _| async move {
            Ok(serde_json::json!(reply))
        })
    }

    #[test]
    fn re_registering_a_name_replaces_in_place() {
        let registry = CapabilityRegistry::new()
            .with(named("a", "first"))
            .with(named("b", "b"))
            .with(named("a", "second"));
        assert_eq!(registry.len(), 2);
        let names: Vec<_> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn unknown_names_resolve_to_none() {
        let registry = CapabilityRegistry::new().with(named("list_items", "[]"));
        assert!(registry.get("list_items").is_some());
        assert!(registry.get("delete_everything").is_none());
    }
}
