//! Filesystem change observers
//!
//! Two interchangeable implementations feed raw changes to a [`ChangeSink`]:
//! - [`NativeObserver`]: a single recursive subscription on platforms whose
//!   notification API covers a whole tree (FSEvents, ReadDirectoryChangesW)
//! - [`PerDirectoryObserver`]: one non-recursive watch per directory, kept in
//!   step with directory creation and removal (inotify and similar)
//!
//! Both block the calling thread until their stop token is cancelled or a
//! fatal error occurs, so callers run them on a blocking thread.

mod native;
mod per_directory;

pub use native::NativeObserver;
pub use per_directory::{PerDirectoryObserver, WatchTree};

use crate::config::WatcherConfig;
use crate::events::{classify, RawChange};
use crate::ignore::{relative_path, ExclusionMatcher, IgnoreFile};
use notify::{Event, RecommendedWatcher};
use podsync_core::error::{Error, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Receives accepted changes from an observer
pub trait ChangeSink: Send + Sync {
    fn on_change(&self, change: RawChange);
}

impl<F> ChangeSink for F
where
    F: Fn(RawChange) + Send + Sync,
{
    fn on_change(&self, change: RawChange) {
        self(change)
    }
}

/// Blocking source of change notifications for a sync root
pub trait ChangeObserver: Send {
    /// Which implementation this is
    fn kind(&self) -> ObserverKind;

    /// Watch `root` until cancelled, forwarding changes that survive the
    /// exclusion rules to `sink`
    fn watch(&mut self, root: &Path, sink: &dyn ChangeSink) -> Result<()>;
}

/// Observer implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverKind {
    /// One recursive subscription for the whole tree
    NativeStream,
    /// One watch per directory
    PerDirectory,
}

impl ObserverKind {
    /// Observer suited to the named operating system (`std::env::consts::OS`)
    pub fn for_platform(os: &str) -> Self {
        match os {
            "macos" | "ios" | "windows" => Self::NativeStream,
            _ => Self::PerDirectory,
        }
    }

    /// Observer suited to the running host
    pub fn current() -> Self {
        Self::for_platform(std::env::consts::OS)
    }
}

/// Create the observer selected by `config`
pub fn create_observer(
    config: &WatcherConfig,
    ignore: IgnoreFile,
    stop: CancellationToken,
) -> Box<dyn ChangeObserver> {
    match config.observer {
        ObserverKind::NativeStream => Box::new(NativeObserver::new(config, ignore, stop)),
        ObserverKind::PerDirectory => Box::new(PerDirectoryObserver::new(config, ignore, stop)),
    }
}

static ACTIVE_ROOTS: LazyLock<Mutex<HashSet<PathBuf>>> = LazyLock::new(Default::default);

/// Registration of a root in the process-wide set of watched roots.
///
/// Only one observer per root may run at a time; the claim is released on
/// drop.
#[derive(Debug)]
pub(crate) struct RootClaim {
    root: PathBuf,
}

impl RootClaim {
    pub(crate) fn acquire(root: &Path) -> Result<Self> {
        let mut roots = ACTIVE_ROOTS.lock().unwrap_or_else(|p| p.into_inner());
        if !roots.insert(root.to_path_buf()) {
            return Err(Error::watcher(format!(
                "{} is already being watched by this process",
                root.display()
            )));
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }
}

impl Drop for RootClaim {
    fn drop(&mut self) {
        let mut roots = ACTIVE_ROOTS.lock().unwrap_or_else(|p| p.into_inner());
        roots.remove(&self.root);
    }
}

/// Canonical form of the root, so event paths can be made relative to it
pub(crate) fn canonical_root(root: &Path) -> Result<PathBuf> {
    root.canonicalize().map_err(|e| {
        Error::watcher(format!("Cannot watch {}: {e}", root.display()))
    })
}

/// Exclusion state for one watch loop, refreshed from the ignore file per batch
pub(crate) struct RootFilter {
    root: PathBuf,
    ignore: IgnoreFile,
    rules: Arc<ExclusionMatcher>,
}

impl RootFilter {
    pub(crate) fn new(root: PathBuf, ignore: IgnoreFile) -> Self {
        let mut filter = Self {
            root,
            ignore,
            rules: Arc::new(ExclusionMatcher::with_defaults()),
        };
        filter.refresh();
        filter
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn rules(&self) -> &ExclusionMatcher {
        &self.rules
    }

    /// Re-read the ignore file; on failure the previous rules stay in effect.
    /// Returns whether the rules changed.
    pub(crate) fn refresh(&mut self) -> bool {
        match self.ignore.current_matcher() {
            Ok(rules) if Arc::ptr_eq(&rules, &self.rules) => false,
            Ok(rules) => {
                self.rules = rules;
                true
            }
            Err(e) => {
                warn!("Keeping previous exclusion rules: {e}");
                false
            }
        }
    }

    /// Whether a path lies under the root and is not excluded
    pub(crate) fn accepts(&self, path: &Path) -> bool {
        match relative_path(&self.root, path) {
            Some(relative) => !self.rules.is_excluded(&relative),
            None => false,
        }
    }

    /// Forward the accepted changes of an event. Returns the forwarded changes.
    pub(crate) fn forward(&self, event: &Event, sink: &dyn ChangeSink) -> Vec<RawChange> {
        let mut forwarded = Vec::new();
        for change in classify(event) {
            if self.accepts(&change.path) {
                trace!("Change {:?} {}", change.kind, change.path.display());
                sink.on_change(change.clone());
                forwarded.push(change);
            }
        }
        forwarded
    }
}

pub(crate) type EventStream = Receiver<notify::Result<Event>>;

/// Create a notify watcher delivering into a channel
pub(crate) fn channel_watcher() -> Result<(RecommendedWatcher, EventStream)> {
    let (tx, rx) = mpsc::channel();
    let watcher = <RecommendedWatcher as notify::Watcher>::new(tx, notify::Config::default())
        .map_err(|e| Error::watcher(format!("Failed to create watcher: {e}")))?;
    Ok((watcher, rx))
}

pub(crate) enum Next {
    Event(Event),
    Idle,
    Stop,
}

/// Wait up to `poll` for the next event, honouring cancellation
pub(crate) fn next_event(
    rx: &EventStream,
    stop: &CancellationToken,
    poll: Duration,
    root: &Path,
) -> Result<Next> {
    if stop.is_cancelled() {
        return Ok(Next::Stop);
    }
    match rx.recv_timeout(poll) {
        Ok(Ok(event)) => Ok(Next::Event(event)),
        Ok(Err(e)) => match watch_failure(e, root) {
            Some(err) => Err(err),
            None => Ok(Next::Idle),
        },
        Err(RecvTimeoutError::Timeout) => Ok(Next::Idle),
        Err(RecvTimeoutError::Disconnected) => {
            if stop.is_cancelled() {
                Ok(Next::Stop)
            } else {
                Err(Error::watcher("change notification stream closed"))
            }
        }
    }
}

/// Classify a notify error. `None` means it is transient and can be skipped:
/// the path vanished before it could be watched.
pub(crate) fn watch_failure(err: notify::Error, path: &Path) -> Option<Error> {
    match &err.kind {
        notify::ErrorKind::PathNotFound | notify::ErrorKind::WatchNotFound => {
            debug!("Skipping vanished path {}", path.display());
            None
        }
        notify::ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
            debug!("Skipping vanished path {}", path.display());
            None
        }
        notify::ErrorKind::MaxFilesWatch => Some(Error::WatchLimitExceeded {
            path: path.display().to_string(),
        }),
        notify::ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::StorageFull => {
            Some(Error::WatchLimitExceeded {
                path: path.display().to_string(),
            })
        }
        _ => Some(Error::watcher(format!(
            "Failed to watch {}: {err}",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_observer_for_platform() {
        assert_eq!(ObserverKind::for_platform("linux"), ObserverKind::PerDirectory);
        assert_eq!(ObserverKind::for_platform("freebsd"), ObserverKind::PerDirectory);
        assert_eq!(ObserverKind::for_platform("macos"), ObserverKind::NativeStream);
        assert_eq!(ObserverKind::for_platform("windows"), ObserverKind::NativeStream);
    }

    #[test]
    fn test_root_claim_is_exclusive_until_dropped() {
        let dir = TempDir::new().expect("test setup failed");
        let claim = RootClaim::acquire(dir.path()).expect("first claim");
        assert!(RootClaim::acquire(dir.path()).is_err());
        drop(claim);
        assert!(RootClaim::acquire(dir.path()).is_ok());
    }

    #[test]
    fn test_watch_failure_classification() {
        let path = Path::new("/r/dir");
        assert!(watch_failure(notify::Error::path_not_found(), path).is_none());
        assert!(matches!(
            watch_failure(notify::Error::new(notify::ErrorKind::MaxFilesWatch), path),
            Some(Error::WatchLimitExceeded { .. })
        ));
        let enospc = std::io::Error::new(std::io::ErrorKind::StorageFull, "no space");
        assert!(matches!(
            watch_failure(notify::Error::io(enospc), path),
            Some(Error::WatchLimitExceeded { .. })
        ));
        assert!(matches!(
            watch_failure(notify::Error::generic("boom"), path),
            Some(Error::Watcher(_))
        ));
    }

    #[test]
    fn test_root_filter_accepts_only_included_paths_under_root() {
        let dir = TempDir::new().expect("test setup failed");
        let root = canonical_root(dir.path()).expect("canonical root");
        let filter = RootFilter::new(root.clone(), IgnoreFile::in_root(&root, ".podsyncignore"));

        assert!(filter.accepts(&root.join("src/app.js")));
        assert!(filter.accepts(&root));
        assert!(!filter.accepts(&root.join("node_modules/x/index.js")));
        assert!(!filter.accepts(Path::new("/somewhere/else.txt")));
    }
}
