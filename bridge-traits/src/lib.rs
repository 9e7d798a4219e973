//! # Host Bridge Traits
//!
//! Platform abstraction traits that each host (iOS, Android, desktop) implements
//! for the storefront core.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Async HTTP for the token and logout endpoints
//! - [`KeyValueStore`](storage::KeyValueStore) - Synchronous durable key-value storage
//! - [`Clock`](time::Clock) - Time source for deterministic expiry testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Platform
//! implementations should convert their native errors into it with an
//! actionable message.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so the core can share them across
//! async tasks behind an `Arc`.

pub mod error;
pub mod http;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use storage::{KeyValueStore, MemoryKeyValueStore};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, SystemClock};
