#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

//! Change detection for a local sync root
//!
//! This crate turns filesystem notifications into batches of changed paths:
//! - Exclusion rules loaded from an append-only ignore file
//! - Interchangeable observers (native recursive stream or per-directory watches)
//! - Quiescence-based debouncing with retry on transfer failure
//!
//! # Example
//!
//! ```no_run
//! use podsync_watcher::{create_observer, DebounceCoordinator, IgnoreFile, WatcherConfig};
//! use std::path::Path;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # fn example() -> podsync_core::Result<()> {
//! let root = Path::new("/path/to/project");
//! let config = WatcherConfig::default();
//! let ignore = IgnoreFile::in_root(root, ".podsyncignore");
//! ignore.ensure_defaults()?;
//!
//! let coordinator = Arc::new(
//!     DebounceCoordinator::new(root, config.quiet_period()).with_exclusions(ignore.clone()),
//! );
//! let mut observer = create_observer(&config, ignore, CancellationToken::new());
//! observer.watch(root, coordinator.as_ref())?;
//! # Ok(())
//! # }
//! ```

mod config;
mod debouncer;
mod events;
mod ignore;
mod observer;

pub use config::{WatcherConfig, WatcherConfigBuilder};
pub use debouncer::{CoordinatorState, DebounceCoordinator, TickOutcome};
pub use events::{ChangeKind, RawChange};
pub use ignore::{
    relative_path, ExclusionMatcher, IgnoreFile, DEFAULT_PATTERNS, DOTFILE_PATTERN,
};
pub use observer::{
    create_observer, ChangeObserver, ChangeSink, NativeObserver, ObserverKind,
    PerDirectoryObserver, WatchTree,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::WatcherConfig;
    pub use crate::debouncer::DebounceCoordinator;
    pub use crate::ignore::IgnoreFile;
    pub use crate::observer::{create_observer, ChangeObserver};
}
