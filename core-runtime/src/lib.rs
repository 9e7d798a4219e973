//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the storefront core:
//! - Logging and tracing infrastructure
//! - Configuration management for the customer-account client
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the authentication core
//! depends on. It wires host bridges into a single [`CoreConfig`], sets up
//! logging conventions, and broadcasts session events to UI layers.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder, CustomerAccountConfig};
pub use error::{Error, Result};
pub use events::{AuthEvent, CoreEvent, EventBus, EventStream, SignOutReason};
