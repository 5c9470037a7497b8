//! Quiescence-based batching of change notifications
//!
//! Every accepted notification lands in a pending set and restarts the quiet
//! period. A periodic [`DebounceCoordinator::tick`] hands the whole set to a
//! transfer once no notification has arrived for the quiet period. A failed
//! transfer puts its paths back so they are retried after the next quiet
//! period; nothing is dropped.

use crate::events::RawChange;
use crate::ignore::{relative_path, IgnoreFile};
use crate::observer::ChangeSink;
use podsync_core::error::Result;
use std::collections::BTreeSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Whether changes are waiting to be transferred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Dirty,
}

/// Result of a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing pending
    Idle,
    /// Changes pending, quiet period not yet elapsed
    Waiting,
    /// The pending set was transferred
    Flushed { paths: usize },
}

#[derive(Debug, Default)]
struct PendingState {
    paths: BTreeSet<PathBuf>,
    last_change: Option<Instant>,
}

/// Accumulates changed paths and flushes them after a quiet period
#[derive(Debug)]
pub struct DebounceCoordinator {
    root: PathBuf,
    quiet_period: Duration,
    ignore: Option<IgnoreFile>,
    state: Mutex<PendingState>,
}

impl DebounceCoordinator {
    /// Create a coordinator for the sync root
    pub fn new(root: impl Into<PathBuf>, quiet_period: Duration) -> Self {
        Self {
            root: root.into(),
            quiet_period,
            ignore: None,
            state: Mutex::new(PendingState::default()),
        }
    }

    /// Drop notifications for paths excluded by the ignore file
    pub fn with_exclusions(mut self, ignore: IgnoreFile) -> Self {
        self.ignore = Some(ignore);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet_period
    }

    fn lock(&self) -> MutexGuard<'_, PendingState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn is_excluded(&self, path: &Path) -> bool {
        let Some(ignore) = &self.ignore else {
            return false;
        };
        let Some(relative) = relative_path(&self.root, path) else {
            return true;
        };
        match ignore.current_matcher() {
            Ok(rules) => rules.is_excluded(&relative),
            Err(e) => {
                warn!("Could not read exclusion rules, accepting {}: {e}", path.display());
                false
            }
        }
    }

    /// Record a changed path. Returns `false` when the path was excluded.
    pub fn record(&self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        if self.is_excluded(&path) {
            trace!("Ignoring excluded path {}", path.display());
            return false;
        }

        let mut state = self.lock();
        state.paths.insert(path);
        state.last_change = Some(Instant::now());
        true
    }

    /// Current state
    pub fn state(&self) -> CoordinatorState {
        if self.lock().paths.is_empty() {
            CoordinatorState::Idle
        } else {
            CoordinatorState::Dirty
        }
    }

    /// Snapshot of the pending paths
    pub fn pending(&self) -> Vec<PathBuf> {
        self.lock().paths.iter().cloned().collect()
    }

    /// Number of pending paths
    pub fn pending_len(&self) -> usize {
        self.lock().paths.len()
    }

    /// Flush the pending set through `transfer` if the quiet period elapsed.
    ///
    /// Notifications that arrive while the transfer runs are kept for the
    /// next flush. On failure the batch is merged back into the pending set
    /// and the quiet period restarts.
    pub async fn tick<F, Fut>(&self, transfer: F) -> Result<TickOutcome>
    where
        F: FnOnce(Vec<PathBuf>) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let batch = {
            let mut state = self.lock();
            if state.paths.is_empty() {
                state.last_change = None;
                return Ok(TickOutcome::Idle);
            }
            match state.last_change {
                Some(last) if Instant::now() < last + self.quiet_period => {
                    return Ok(TickOutcome::Waiting);
                }
                _ => std::mem::take(&mut state.paths),
            }
        };

        let count = batch.len();
        debug!("Quiet period elapsed, flushing {count} paths");

        match transfer(batch.iter().cloned().collect()).await {
            Ok(()) => Ok(TickOutcome::Flushed { paths: count }),
            Err(e) => {
                let mut state = self.lock();
                state.paths.extend(batch);
                state.last_change = Some(Instant::now());
                Err(e)
            }
        }
    }
}

impl ChangeSink for DebounceCoordinator {
    fn on_change(&self, change: RawChange) {
        self.record(change.path);
    }
}
