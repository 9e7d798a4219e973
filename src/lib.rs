//! Workspace facade crate.
//!
//! Exposes shared feature flags that map to the individual workspace crates
//! (`core-auth`, `core-runtime`). Host applications can depend on
//! `storefront-workspace` and enable the documented features without needing
//! to wire each crate individually.

#[cfg(feature = "desktop-shims")]
pub use core_auth as auth;
#[cfg(feature = "desktop-shims")]
pub use core_runtime as runtime;
