//! Metadata storage trait definition.

use crate::error::PluginResult;
use serde_json::Value;

/// A key/value store for cluster metadata documents.
///
/// Stores are **opaque document stores**. Keys are `/`-separated strings
/// chosen by the caller; values are JSON documents. The master decides what
/// to externalize, stores only persist it.
///
/// # Invariants
///
/// - `get` returns exactly the document last passed to `set` for that key
/// - `remove` of an absent key succeeds
/// - Stores must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryMetadataStore`] - For testing
/// - [`super::FileMetadataStore`] - For persistence across restarts
pub trait MetadataStore: Send + Sync {
    /// Returns the document stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing medium cannot be read or the stored
    /// document is corrupt.
    fn get(&self, key: &str) -> PluginResult<Option<Value>>;

    /// Stores `value` under `key`, replacing any previous document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    fn set(&self, key: &str, value: &Value) -> PluginResult<()>;

    /// Removes the document stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing medium rejects the removal.
    fn remove(&self, key: &str) -> PluginResult<()>;

    /// Lists every stored key starting with `prefix`, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing medium cannot be enumerated.
    fn keys(&self, prefix: &str) -> PluginResult<Vec<String>>;
}
