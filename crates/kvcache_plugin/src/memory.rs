//! In-memory metadata store for testing.

use crate::error::PluginResult;
use crate::metadata::MetadataStore;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;

/// An in-memory metadata store.
///
/// This store keeps all documents in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Masters that don't need metadata to outlive the process
///
/// # Example
///
/// ```rust
/// use kvcache_plugin::{InMemoryMetadataStore, MetadataStore};
/// use serde_json::json;
///
/// let store = InMemoryMetadataStore::new();
/// store.set("segments/s1", &json!({"capacity": 1024})).unwrap();
/// assert_eq!(store.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    docs: RwLock<BTreeMap<String, Value>>,
}

impl InMemoryMetadataStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    /// Returns true if no documents are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }

    /// Removes every document.
    pub fn clear(&self) {
        self.docs.write().clear();
    }
}

impl MetadataStore for InMemoryMetadataStore {
    fn get(&self, key: &str) -> PluginResult<Option<Value>> {
        Ok(self.docs.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &Value) -> PluginResult<()> {
        self.docs.write().insert(key.to_string(), value.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> PluginResult<()> {
        self.docs.write().remove(key);
        Ok(())
    }

    fn keys(&self, prefix: &str) -> PluginResult<Vec<String>> {
        Ok(self
            .docs
            .read()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}
