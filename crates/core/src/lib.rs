//! Core types for podsync
//!
//! This crate provides the foundations shared by the watcher, remote and
//! transfer crates:
//!
//! - **Configuration**: layered TOML and environment configuration
//! - **Error handling**: unified error type and session-fatality policy
//!

#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

pub mod config;
pub mod error;

// Re-export main types for convenience
pub use config::{Config, RemoteConfig, RemoteSelection, SyncConfig, TransportConfig, TransportMode};
pub use error::{Error, Result, ResultExt};

/// Version of the core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result, ResultExt};
}
