//! Persistence seam
//!
//! The engine never touches files directly. Everything that must survive a
//! restart (rotation cursor, moderation config, whitelist, term list) goes
//! through a `StateStore`, a keyed record store with load/save semantics.

use crate::{Error, Result};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;

/// Keyed record store
pub trait StateStore: Send + Sync {
    /// Load the record stored under `key`, if any
    fn load(&self, key: &str) -> Result<Option<serde_json::Value>>;

    /// Replace the record stored under `key`
    fn save(&self, key: &str, value: &serde_json::Value) -> Result<()>;
}

/// Typed helpers over any `StateStore`
pub trait StateStoreExt: StateStore {
    /// Load and deserialize a record
    fn load_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.load(key)? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| Error::storage(format!("record '{}' is malformed: {}", key, e))),
            None => Ok(None),
        }
    }

    /// Serialize and save a record
    fn save_as<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.save(key, &value)
    }
}

impl<S: StateStore + ?Sized> StateStoreExt for S {}

/// In-memory store, used in tests and when persistence is disabled
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, serde_json::Value>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the store holds no records
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl StateStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.records.read().get(key).cloned())
    }

    fn save(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        self.records.write().insert(key.to_string(), value.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.load_as::<usize>("rotation_cursor").unwrap().is_none());

        store.save_as("rotation_cursor", &3usize).unwrap();
        assert_eq!(store.load_as::<usize>("rotation_cursor").unwrap(), Some(3));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_malformed_record_is_storage_error() {
        let store = MemoryStore::new();
        store.save("cursor", &serde_json::json!("not a number")).unwrap();

        let err = store.load_as::<usize>("cursor").unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }
}
