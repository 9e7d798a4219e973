//! Key-Value Storage Abstraction
//!
//! Durable string storage used to persist the customer session across process
//! restarts.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{BridgeError, Result};

/// Synchronous persistent key-value store.
///
/// Abstracts the platform's durable preferences storage:
/// - iOS: Keychain / UserDefaults
/// - Android: EncryptedSharedPreferences / MMKV
/// - Desktop: OS keychain or a JSON file in the data directory
///
/// Operations are atomic per key. Callers must treat every method as fallible;
/// a failing store should degrade the caller to memory-only behaviour rather
/// than abort it.
///
/// # Example
///
/// ```
/// use bridge_traits::storage::{KeyValueStore, MemoryKeyValueStore};
///
/// let store = MemoryKeyValueStore::new();
/// store.set("theme", "dark").unwrap();
/// assert_eq!(store.get_string("theme").unwrap(), Some("dark".to_string()));
/// store.delete("theme").unwrap();
/// assert_eq!(store.get_string("theme").unwrap(), None);
/// ```
pub trait KeyValueStore: Send + Sync {
    /// Store a string value, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value. Returns `Ok(None)` if the key doesn't exist.
    fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Delete a value. Deleting a missing key succeeds.
    fn delete(&self, key: &str) -> Result<()>;

    /// Check if a key exists
    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get_string(key)?.is_some())
    }
}

/// In-process [`KeyValueStore`] with no durability.
///
/// Useful for tests and for hosts that deliberately run memory-only.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> BridgeError {
    BridgeError::StorageError("in-memory store lock poisoned".to_string())
}

impl KeyValueStore for MemoryKeyValueStore {
    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get_string(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.remove(key);
        Ok(())
    }
}
