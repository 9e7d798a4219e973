//! # Core Configuration Module
//!
//! Provides configuration management for the storefront authentication core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds the customer-account client settings and every host
//! bridge the session manager talks to. It enforces fail-fast validation so a
//! misconfigured client never reaches the authorization endpoint.
//!
//! ## Required Dependencies
//!
//! - `CustomerAccountConfig` - client id, scopes, redirect URI and endpoints
//! - `KeyValueStore` - durable token persistence
//! - `HttpClient` - token and logout endpoint calls
//!
//! ## Optional Dependencies (with defaults)
//!
//! - `Clock` - defaults to [`SystemClock`]
//!
//! When the `desktop-shims` feature is enabled, `ReqwestHttpClient` and a
//! `FileKeyValueStore` in the user data directory are injected automatically
//! if not provided. With `secure-store` the default store is the OS keychain.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, CustomerAccountConfig};
//!
//! let account = CustomerAccountConfig::for_authentication_base(
//!     "https://shopify.com/authentication/12345",
//!     "shp_client",
//!     "shop.12345.app://callback",
//! );
//!
//! let config = CoreConfig::builder()
//!     .customer_account(account)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{Clock, HttpClient, KeyValueStore, SystemClock};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Scopes requested when none are configured.
pub const DEFAULT_SCOPES: &[&str] = &["openid", "email", "customer-account-api:full"];

/// How long before expiry an access token stops being trusted.
pub const DEFAULT_REFRESH_BUFFER: Duration = Duration::from_secs(60);

const MAX_REFRESH_BUFFER: Duration = Duration::from_secs(60 * 60);

pub const ENV_AUTH_BASE_URL: &str = "STOREFRONT_AUTH_BASE_URL";
pub const ENV_CLIENT_ID: &str = "STOREFRONT_CLIENT_ID";
pub const ENV_REDIRECT_URI: &str = "STOREFRONT_REDIRECT_URI";
pub const ENV_SCOPES: &str = "STOREFRONT_SCOPES";

/// Customer-account OAuth client settings.
///
/// All endpoint fields are absolute URLs. Scopes are sent space-separated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerAccountConfig {
    /// Public OAuth client identifier
    pub client_id: String,
    /// Requested scopes
    pub scopes: Vec<String>,
    /// Redirect URI registered with the provider
    pub redirect_uri: String,
    /// Authorization endpoint rendered in the embedded browser
    pub authorization_endpoint: String,
    /// Token endpoint for code exchange and refresh
    pub token_endpoint: String,
    /// Provider logout endpoint
    pub logout_endpoint: String,
    /// Tokens within this window of expiry are refreshed before use
    pub refresh_buffer: Duration,
}

impl CustomerAccountConfig {
    /// Derive all endpoints from the provider's authentication base URL.
    ///
    /// `https://host/authentication/42` yields
    /// `https://host/authentication/42/oauth/authorize`,
    /// `.../oauth/token` and `.../logout`.
    pub fn for_authentication_base(
        base_url: &str,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        let base = base_url.trim_end_matches('/');

        Self {
            client_id: client_id.into(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            redirect_uri: redirect_uri.into(),
            authorization_endpoint: format!("{}/oauth/authorize", base),
            token_endpoint: format!("{}/oauth/token", base),
            logout_endpoint: format!("{}/logout", base),
            refresh_buffer: DEFAULT_REFRESH_BUFFER,
        }
    }

    /// Load settings from `STOREFRONT_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the first missing variable, or any
    /// validation error for the loaded values.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let require = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| Error::Config(format!("{} is not set", key)))
        };

        let mut config = Self::for_authentication_base(
            &require(ENV_AUTH_BASE_URL)?,
            require(ENV_CLIENT_ID)?,
            require(ENV_REDIRECT_URI)?,
        );

        if let Some(scopes) = lookup(ENV_SCOPES) {
            let scopes: Vec<String> = scopes.split_whitespace().map(str::to_string).collect();
            if !scopes.is_empty() {
                config.scopes = scopes;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Replace the requested scopes.
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Override the refresh buffer.
    pub fn with_refresh_buffer(mut self, buffer: Duration) -> Self {
        self.refresh_buffer = buffer;
        self
    }

    /// Scopes in wire form (space-separated).
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::invalid("client_id", "must not be empty"));
        }

        if self.scopes.iter().all(|s| s.trim().is_empty()) {
            return Err(Error::invalid("scopes", "at least one scope is required"));
        }

        for (field, value) in [
            ("redirect_uri", &self.redirect_uri),
            ("authorization_endpoint", &self.authorization_endpoint),
            ("token_endpoint", &self.token_endpoint),
            ("logout_endpoint", &self.logout_endpoint),
        ] {
            Url::parse(value)
                .map_err(|e| Error::invalid(field, format!("'{}' is not a valid URL: {}", value, e)))?;
        }

        if self.refresh_buffer > MAX_REFRESH_BUFFER {
            return Err(Error::invalid(
                "refresh_buffer",
                "must not exceed one hour",
            ));
        }

        Ok(())
    }
}

/// Core configuration for the storefront authentication core.
///
/// Holds the client settings and the host bridges. Use [`CoreConfigBuilder`]
/// to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Customer-account client settings
    pub customer_account: CustomerAccountConfig,

    /// HTTP client for the token and logout endpoints
    pub http_client: Arc<dyn HttpClient>,

    /// Durable storage for the token record
    pub key_value_store: Arc<dyn KeyValueStore>,

    /// Time source for expiry math
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("customer_account", &self.customer_account)
            .field("http_client", &"HttpClient { ... }")
            .field("key_value_store", &"KeyValueStore { ... }")
            .field("clock", &"Clock { ... }")
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        self.customer_account.validate()
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required for token exchange. \
                 Desktop: enable the 'desktop-shims' feature to use the default ReqwestHttpClient. \
                 Mobile: inject the platform networking stack."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn key_value_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "KeyValueStore".to_string(),
        message: "KeyValueStore implementation is required for session persistence. \
                 Desktop: enable the 'desktop-shims' feature to use the default FileKeyValueStore. \
                 Mobile: inject platform-native storage (Keychain/Keystore)."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::new()
        .map_err(|e| Error::Internal(format!("Failed to create default HttpClient: {}", e)))?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

#[cfg(feature = "secure-store")]
fn provide_default_key_value_store() -> Result<Arc<dyn KeyValueStore>> {
    use bridge_desktop::KeyringKeyValueStore;

    Ok(Arc::new(KeyringKeyValueStore::new()))
}

#[cfg(all(feature = "desktop-shims", not(feature = "secure-store")))]
fn provide_default_key_value_store() -> Result<Arc<dyn KeyValueStore>> {
    use bridge_desktop::FileKeyValueStore;

    let store = FileKeyValueStore::open_default("storefront").map_err(|e| {
        Error::Internal(format!("Failed to open default KeyValueStore: {}", e))
    })?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_key_value_store() -> Result<Arc<dyn KeyValueStore>> {
    Err(key_value_store_missing_error())
}

/// Builder for constructing [`CoreConfig`] instances.
///
/// Call [`build()`](CoreConfigBuilder::build) once the client settings are
/// set. Missing bridges are filled from platform defaults when available,
/// otherwise the build fails with an actionable message.
#[derive(Default)]
pub struct CoreConfigBuilder {
    customer_account: Option<CustomerAccountConfig>,
    http_client: Option<Arc<dyn HttpClient>>,
    key_value_store: Option<Arc<dyn KeyValueStore>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CoreConfigBuilder {
    /// Sets the customer-account client settings (required).
    pub fn customer_account(mut self, config: CustomerAccountConfig) -> Self {
        self.customer_account = Some(config);
        self
    }

    /// Sets the HTTP client implementation.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the key-value store used for token persistence.
    pub fn key_value_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.key_value_store = Some(store);
        self
    }

    /// Sets the clock (defaults to the system clock).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// - `Error::Config` if no customer-account settings were provided
    /// - `Error::InvalidField` if those settings fail validation
    /// - `Error::CapabilityMissing` if a required bridge is absent and no
    ///   platform default exists
    pub fn build(self) -> Result<CoreConfig> {
        let customer_account = self.customer_account.ok_or_else(|| {
            Error::Config(
                "Customer account settings are required. Use .customer_account() to set them."
                    .to_string(),
            )
        })?;

        customer_account.validate()?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let key_value_store = match self.key_value_store {
            Some(store) => store,
            None => provide_default_key_value_store()?,
        };

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);

        Ok(CoreConfig {
            customer_account,
            http_client,
            key_value_store,
            clock,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{HttpRequest, HttpResponse, MemoryKeyValueStore};
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        Http {}

        #[async_trait]
        impl HttpClient for Http {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    fn account() -> CustomerAccountConfig {
        CustomerAccountConfig::for_authentication_base(
            "https://shop.example.com/authentication/42/",
            "client-123",
            "shop.42.app://callback",
        )
    }

    #[test]
    fn test_for_authentication_base_derives_endpoints() {
        let config = account();

        assert_eq!(
            config.authorization_endpoint,
            "https://shop.example.com/authentication/42/oauth/authorize"
        );
        assert_eq!(
            config.token_endpoint,
            "https://shop.example.com/authentication/42/oauth/token"
        );
        assert_eq!(
            config.logout_endpoint,
            "https://shop.example.com/authentication/42/logout"
        );
        assert_eq!(config.scope_string(), "openid email customer-account-api:full");
        assert_eq!(config.refresh_buffer, Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_client_id() {
        let mut config = account();
        config.client_id = "  ".to_string();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("client_id"));
    }

    #[test]
    fn test_validate_rejects_empty_scopes() {
        let config = account().with_scopes(Vec::<String>::new());
        assert!(config.validate().unwrap_err().to_string().contains("scopes"));
    }

    #[test]
    fn test_validate_rejects_relative_endpoint() {
        let mut config = account();
        config.token_endpoint = "/oauth/token".to_string();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("token_endpoint"));
    }

    #[test]
    fn test_validate_rejects_excessive_buffer() {
        let config = account().with_refresh_buffer(Duration::from_secs(2 * 60 * 60));
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("refresh_buffer"));
    }

    #[test]
    fn test_from_lookup_reads_variables() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_AUTH_BASE_URL, "https://auth.example.com/authentication/7"),
            (ENV_CLIENT_ID, "env-client"),
            (ENV_REDIRECT_URI, "shop.7.app://callback"),
            (ENV_SCOPES, "openid  email"),
        ]);

        let config =
            CustomerAccountConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.client_id, "env-client");
        assert_eq!(config.scopes, vec!["openid", "email"]);
        assert_eq!(
            config.token_endpoint,
            "https://auth.example.com/authentication/7/oauth/token"
        );
    }

    #[test]
    fn test_from_lookup_reports_missing_variable() {
        let err = CustomerAccountConfig::from_lookup(|_| None).unwrap_err();
        assert!(err.to_string().contains(ENV_AUTH_BASE_URL));
    }

    #[test]
    fn test_builder_requires_customer_account() {
        let result = CoreConfig::builder()
            .http_client(Arc::new(MockHttp::new()))
            .key_value_store(Arc::new(MemoryKeyValueStore::new()))
            .build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Customer account settings are required"));
    }

    #[test]
    fn test_builder_validates_customer_account() {
        let mut invalid = account();
        invalid.redirect_uri = "not a url".to_string();

        let result = CoreConfig::builder()
            .customer_account(invalid)
            .http_client(Arc::new(MockHttp::new()))
            .key_value_store(Arc::new(MemoryKeyValueStore::new()))
            .build();

        assert!(matches!(result, Err(Error::InvalidField { .. })));
    }

    #[test]
    fn test_builder_with_all_bridges() {
        let config = CoreConfig::builder()
            .customer_account(account())
            .http_client(Arc::new(MockHttp::new()))
            .key_value_store(Arc::new(MemoryKeyValueStore::new()))
            .build()
            .unwrap();

        assert_eq!(config.customer_account.client_id, "client-123");
        assert!(config.validate().is_ok());
        assert!(format!("{:?}", config).contains("HttpClient { ... }"));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_requires_http_client_without_shims() {
        let result = CoreConfig::builder()
            .customer_account(account())
            .key_value_store(Arc::new(MemoryKeyValueStore::new()))
            .build();

        let err = result.unwrap_err().to_string();
        assert!(err.contains("HttpClient"));
        assert!(err.contains("token exchange"));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_requires_store_without_shims() {
        let result = CoreConfig::builder()
            .customer_account(account())
            .http_client(Arc::new(MockHttp::new()))
            .build();

        assert!(result.unwrap_err().to_string().contains("KeyValueStore"));
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_builder_injects_desktop_http_client() {
        let result = CoreConfig::builder()
            .customer_account(account())
            .key_value_store(Arc::new(MemoryKeyValueStore::new()))
            .build();

        assert!(result.is_ok());
    }
}
