//! Token Persistence
//!
//! Mirrors the session into the host's durable key-value store so it survives
//! process restarts. Each token lives under its own fixed key; the expiry is
//! stored as a decimal string of epoch milliseconds.
//!
//! ## Example
//!
//! ```
//! use bridge_traits::MemoryKeyValueStore;
//! use core_auth::{TokenSet, TokenStore};
//! use std::sync::Arc;
//!
//! let store = TokenStore::new(Arc::new(MemoryKeyValueStore::new()));
//!
//! let tokens = TokenSet::new("access", Some("refresh".to_string()), None, 1_700_000_000_000);
//! store.save(&tokens).unwrap();
//! assert_eq!(store.load().unwrap(), tokens);
//!
//! store.clear().unwrap();
//! assert!(store.load().unwrap().is_empty());
//! ```

use crate::error::{AuthError, Result};
use crate::types::TokenSet;
use bridge_traits::storage::KeyValueStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const ACCESS_TOKEN_KEY: &str = "customer_access_token";
pub const REFRESH_TOKEN_KEY: &str = "customer_refresh_token";
pub const ID_TOKEN_KEY: &str = "customer_id_token";
pub const EXPIRES_AT_KEY: &str = "customer_token_expires_at";

const ALL_KEYS: [&str; 4] = [
    ACCESS_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
    ID_TOKEN_KEY,
    EXPIRES_AT_KEY,
];

/// Durable storage for the customer's tokens.
///
/// The only writer of the four session keys. Token values are never logged.
#[derive(Clone)]
pub struct TokenStore {
    store: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Persist all four fields. Absent fields are deleted so the record never
    /// mixes values from two sessions.
    ///
    /// Every key is attempted even if an earlier one fails; the first failure
    /// is returned.
    pub fn save(&self, tokens: &TokenSet) -> Result<()> {
        let expires_at = tokens.expires_at().map(|ms| ms.to_string());
        let fields = [
            (ACCESS_TOKEN_KEY, tokens.access_token()),
            (REFRESH_TOKEN_KEY, tokens.refresh_token()),
            (ID_TOKEN_KEY, tokens.id_token()),
            (EXPIRES_AT_KEY, expires_at.as_deref()),
        ];

        let mut first_error = None;
        for (key, value) in fields {
            let result = match value {
                Some(value) => self.store.set(key, value),
                None => self.store.delete(key),
            };

            if let Err(e) = result {
                warn!(key = key, error = %e, "Failed to persist token field");
                first_error.get_or_insert(AuthError::Storage(e.to_string()));
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!(
                    has_refresh_token = tokens.refresh_token().is_some(),
                    has_id_token = tokens.id_token().is_some(),
                    "Tokens persisted"
                );
                Ok(())
            }
        }
    }

    /// Read the persisted record.
    ///
    /// An access token whose expiry is missing or unparsable is discarded
    /// (and removed from the store); the refresh token is kept so the session
    /// stays recoverable.
    pub fn load(&self) -> Result<TokenSet> {
        let access_token = self.store.get_string(ACCESS_TOKEN_KEY)?;
        let refresh_token = self.store.get_string(REFRESH_TOKEN_KEY)?;
        let id_token = self.store.get_string(ID_TOKEN_KEY)?;
        let raw_expiry = self.store.get_string(EXPIRES_AT_KEY)?;

        let expires_at = raw_expiry.as_deref().and_then(|raw| match raw.trim().parse::<i64>() {
            Ok(ms) => Some(ms),
            Err(_) => {
                warn!("Discarding unparsable token expiry");
                None
            }
        });

        if access_token.is_some() && expires_at.is_none() {
            warn!("Persisted access token has no usable expiry, dropping it");
            for key in [ACCESS_TOKEN_KEY, EXPIRES_AT_KEY] {
                if let Err(e) = self.store.delete(key) {
                    warn!(key = key, error = %e, "Failed to delete stale token field");
                }
            }
        }

        let tokens = TokenSet::from_parts(access_token, refresh_token, id_token, expires_at);
        debug!(
            has_access_token = tokens.access_token().is_some(),
            has_refresh_token = tokens.refresh_token().is_some(),
            "Loaded persisted tokens"
        );
        Ok(tokens)
    }

    /// Delete all four keys. Deleting an absent record succeeds.
    pub fn clear(&self) -> Result<()> {
        let mut first_error = None;
        for key in ALL_KEYS {
            if let Err(e) = self.store.delete(key) {
                warn!(key = key, error = %e, "Failed to delete token field");
                first_error.get_or_insert(AuthError::Storage(e.to_string()));
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                debug!("Persisted tokens cleared");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::MemoryKeyValueStore;

    fn memory_store() -> (Arc<MemoryKeyValueStore>, TokenStore) {
        let backing = Arc::new(MemoryKeyValueStore::new());
        let store = TokenStore::new(backing.clone());
        (backing, store)
    }

    /// Store whose writes always fail; reads see nothing.
    struct FailingStore;

    impl KeyValueStore for FailingStore {
        fn set(&self, _key: &str, _value: &str) -> BridgeResult<()> {
            Err(BridgeError::StorageError("disk full".to_string()))
        }

        fn get_string(&self, _key: &str) -> BridgeResult<Option<String>> {
            Ok(None)
        }

        fn delete(&self, _key: &str) -> BridgeResult<()> {
            Err(BridgeError::StorageError("disk full".to_string()))
        }
    }

    #[test]
    fn test_save_writes_fixed_keys() {
        let (backing, store) = memory_store();
        let tokens = TokenSet::new(
            "access",
            Some("refresh".to_string()),
            Some("id".to_string()),
            1_700_000_000_000,
        );

        store.save(&tokens).unwrap();

        assert_eq!(
            backing.get_string(ACCESS_TOKEN_KEY).unwrap(),
            Some("access".to_string())
        );
        assert_eq!(
            backing.get_string(EXPIRES_AT_KEY).unwrap(),
            Some("1700000000000".to_string())
        );
        assert_eq!(backing.len(), 4);
    }

    #[test]
    fn test_save_deletes_absent_fields() {
        let (backing, store) = memory_store();
        store
            .save(&TokenSet::new("a", Some("r".to_string()), Some("i".to_string()), 1))
            .unwrap();
        store.save(&TokenSet::new("a2", None, None, 2)).unwrap();

        assert_eq!(backing.get_string(REFRESH_TOKEN_KEY).unwrap(), None);
        assert_eq!(backing.get_string(ID_TOKEN_KEY).unwrap(), None);
        assert_eq!(backing.len(), 2);
    }

    #[test]
    fn test_load_drops_access_token_with_bad_expiry() {
        let (backing, store) = memory_store();
        backing.set(ACCESS_TOKEN_KEY, "access").unwrap();
        backing.set(REFRESH_TOKEN_KEY, "refresh").unwrap();
        backing.set(EXPIRES_AT_KEY, "soon").unwrap();

        let tokens = store.load().unwrap();

        assert_eq!(tokens.access_token(), None);
        assert_eq!(tokens.refresh_token(), Some("refresh"));
        assert_eq!(backing.get_string(ACCESS_TOKEN_KEY).unwrap(), None);
        assert_eq!(backing.get_string(EXPIRES_AT_KEY).unwrap(), None);
    }

    #[test]
    fn test_load_empty_store() {
        let (_, store) = memory_store();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let (backing, store) = memory_store();
        store
            .save(&TokenSet::new("a", Some("r".to_string()), None, 1))
            .unwrap();

        store.clear().unwrap();
        store.clear().unwrap();
        assert!(backing.is_empty());
    }

    #[test]
    fn test_storage_failures_surface_as_storage_error() {
        let store = TokenStore::new(Arc::new(FailingStore));

        let err = store.save(&TokenSet::new("a", None, None, 1)).unwrap_err();
        assert!(matches!(err, AuthError::Storage(_)));
        assert!(matches!(store.clear(), Err(AuthError::Storage(_))));
    }
}
