//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! - `HttpClient` using `reqwest`
//! - `KeyValueStore` using a JSON file in the user data directory
//! - `KeyValueStore` using the OS keychain via `keyring` (feature `secure-store`)
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{FileKeyValueStore, ReqwestHttpClient};
//!
//! let http_client = ReqwestHttpClient::new()?;
//! let store = FileKeyValueStore::open_default("storefront")?;
//! ```

mod file_store;
mod http;

#[cfg(feature = "secure-store")]
mod keyring_store;

pub use file_store::FileKeyValueStore;
pub use http::ReqwestHttpClient;

#[cfg(feature = "secure-store")]
pub use keyring_store::KeyringKeyValueStore;
