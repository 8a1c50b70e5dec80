//! Open attribute maps for attribute-extensible elements

use crate::namespaces::QName;
use indexmap::{IndexMap, IndexSet};

/// Attribute name to value map preserving insertion order.
///
/// Tracks which of its own keys are ID-typed, independently of the
/// registry-wide ID attribute set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeMap {
    entries: IndexMap<QName, String>,
    id_attributes: IndexSet<QName>,
}

impl AttributeMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value, returning the previous one
    pub fn insert(&mut self, name: QName, value: impl Into<String>) -> Option<String> {
        self.entries.insert(name, value.into())
    }

    /// Value for a name
    pub fn get(&self, name: &QName) -> Option<&str> {
        self.entries.get(name).map(|s| s.as_str())
    }

    /// Remove an entry; its ID registration goes with it
    pub fn remove(&mut self, name: &QName) -> Option<String> {
        self.id_attributes.shift_remove(name);
        self.entries.shift_remove(name)
    }

    /// Flag a key as ID-typed
    pub fn register_id(&mut self, name: QName) {
        self.id_attributes.insert(name);
    }

    /// Clear the ID flag of a key
    pub fn deregister_id(&mut self, name: &QName) {
        self.id_attributes.shift_remove(name);
    }

    /// Whether a key is flagged as ID-typed
    pub fn is_id(&self, name: &QName) -> bool {
        self.id_attributes.contains(name)
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&QName, &str)> {
        self.entries.iter().map(|(k, v)| (k, v.as_str()))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_and_id_tracking() {
        let mut map = AttributeMap::new();
        map.insert(QName::namespaced("urn:x", "b"), "2");
        map.insert(QName::namespaced("urn:x", "a"), "1");
        map.register_id(QName::namespaced("urn:x", "a"));

        let keys: Vec<_> = map.iter().map(|(k, _)| k.local_name.clone()).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert!(map.is_id(&QName::namespaced("urn:x", "a")));

        assert_eq!(map.remove(&QName::namespaced("urn:x", "a")).as_deref(), Some("1"));
        assert!(!map.is_id(&QName::namespaced("urn:x", "a")));
        assert_eq!(map.len(), 1);
    }
}
