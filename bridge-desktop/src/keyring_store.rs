//! Key-Value Storage using the OS Keychain

use bridge_traits::{
    error::{BridgeError, Result},
    storage::KeyValueStore,
};
use keyring::Entry;
use tracing::debug;

const DEFAULT_SERVICE_NAME: &str = "storefront-core";

/// Keyring-based key-value store
///
/// Uses platform-specific secure storage:
/// - macOS: Keychain
/// - Windows: Credential Manager
/// - Linux: Secret Service (libsecret)
pub struct KeyringKeyValueStore {
    service_name: String,
}

impl KeyringKeyValueStore {
    /// Create a new store with default service name
    pub fn new() -> Self {
        Self::with_service_name(DEFAULT_SERVICE_NAME)
    }

    /// Create a new store with custom service name
    pub fn with_service_name(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service_name, key).map_err(Self::map_keyring_error)
    }

    fn map_keyring_error(e: keyring::Error) -> BridgeError {
        BridgeError::StorageError(format!("Keyring error: {}", e))
    }
}

impl Default for KeyringKeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for KeyringKeyValueStore {
    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .map_err(Self::map_keyring_error)?;

        debug!(key = key, "Stored value in keyring");
        Ok(())
    }

    fn get_string(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(Self::map_keyring_error(e)),
        }
    }

    fn delete(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => {
                debug!(key = key, "Deleted value from keyring");
                Ok(())
            }
            Err(e) => Err(Self::map_keyring_error(e)),
        }
    }
}
