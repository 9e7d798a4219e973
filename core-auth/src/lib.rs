//! # Customer Authentication
//!
//! OAuth 2.0 Authorization Code + PKCE session management for a storefront's
//! customer accounts.
//!
//! ## Overview
//!
//! This crate signs a customer in through the provider's hosted login page,
//! keeps the resulting tokens in the host's durable store, and hands out valid
//! access tokens, refreshing them transparently shortly before they expire.
//!
//! ## Features
//!
//! - S256 PKCE with a per-attempt state check
//! - Token exchange and refresh against the provider's token endpoint
//! - Single-flight refresh shared by concurrent callers
//! - Persistent session restored on startup
//! - Best-effort provider logout
//! - Auth state event emission

pub mod error;
pub mod manager;
pub mod oauth;
pub mod pkce;
pub mod token_store;
pub mod types;

pub use error::{AuthError, Result};
pub use manager::AuthSessionManager;
pub use oauth::{RedirectResponse, TokenClient, TokenGrant};
pub use pkce::PkceAttempt;
pub use token_store::TokenStore;
pub use types::{AuthState, SessionSnapshot, TokenSet};
