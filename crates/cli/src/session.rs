//! The watch session: observer thread, tick loop and error policy
//!
//! The observer runs on a blocking thread and feeds the debounce
//! coordinator. The tick loop flushes the coordinator through the transfer
//! dispatcher, one transfer at a time. Transfer failures are logged and the
//! changes retried after the next quiet period; anything else ends the
//! session.

use podsync_core::config::SyncConfig;
use podsync_core::error::{Error, Result};
use podsync_remote::RemoteTarget;
use podsync_transfer::TransferDispatcher;
use podsync_watcher::{
    create_observer, DebounceCoordinator, IgnoreFile, ObserverKind, TickOutcome, WatcherConfig,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Session settings derived from the `[sync]` configuration
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub watcher: WatcherConfig,
    pub tick_interval: Duration,
    pub initial_sync: bool,
    /// Ignore file, relative to the root
    pub ignore_file: PathBuf,
}

impl SessionOptions {
    pub fn from_config(sync: &SyncConfig) -> Self {
        Self {
            watcher: WatcherConfig::builder()
                .quiet_period(sync.quiet_period())
                .observer(ObserverKind::current())
                .build(),
            tick_interval: sync.tick_interval(),
            initial_sync: sync.initial_sync,
            ignore_file: PathBuf::from(&sync.ignore_file),
        }
    }
}

pub struct WatchSession {
    root: PathBuf,
    target: RemoteTarget,
    dispatcher: TransferDispatcher,
    options: SessionOptions,
}

impl WatchSession {
    pub fn new(
        root: impl Into<PathBuf>,
        target: RemoteTarget,
        dispatcher: TransferDispatcher,
        options: SessionOptions,
    ) -> Self {
        Self {
            root: root.into(),
            target,
            dispatcher,
            options,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run until `shutdown` is cancelled or a session-fatal error occurs
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        if !self.root.is_dir() {
            return Err(Error::validation(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }
        let root = self
            .root
            .canonicalize()
            .map_err(|e| Error::validation(format!("Cannot resolve {}: {e}", self.root.display())))?;

        let ignore = IgnoreFile::in_root(&root, &self.options.ignore_file);
        let added = ignore.ensure_defaults()?;
        if !added.is_empty() {
            info!("Added {} default patterns to {}", added.len(), ignore.path().display());
        }

        let coordinator = Arc::new(
            DebounceCoordinator::new(&root, self.options.watcher.quiet_period())
                .with_exclusions(ignore.clone()),
        );

        if self.options.initial_sync {
            if let Err(e) = self.dispatcher.sync_all(&self.target).await {
                if e.is_session_fatal() {
                    return Err(e);
                }
                // A pending root change plans a full-tree pass on the next flush
                error!("Initial transfer failed, retrying after the quiet period: {e}");
                coordinator.record(&root);
            }
        }

        let stop = shutdown.child_token();
        let mut observer = create_observer(&self.options.watcher, ignore, stop.clone());
        let mut watch_task = {
            let sink = Arc::clone(&coordinator);
            let root = root.clone();
            tokio::task::spawn_blocking(move || observer.watch(&root, sink.as_ref()))
        };
        let mut watch_done = false;

        let mut ticker = tokio::time::interval(self.options.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "Watching {} -> {} (quiet period {:?})",
            root.display(),
            self.target,
            self.options.watcher.quiet_period()
        );

        let dispatcher = &self.dispatcher;
        let target = &self.target;
        let result = loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutting down");
                    break Ok(());
                }
                joined = &mut watch_task => {
                    watch_done = true;
                    break match joined {
                        Ok(Ok(())) => Err(Error::watcher("watcher stopped unexpectedly")),
                        Ok(Err(e)) => Err(e),
                        Err(e) => Err(Error::watcher(format!("watcher thread failed: {e}"))),
                    };
                }
                _ = ticker.tick() => {
                    let outcome = coordinator
                        .tick(|paths| async move {
                            dispatcher.dispatch(target, &paths).await.map(|_| ())
                        })
                        .await;
                    match outcome {
                        Ok(TickOutcome::Flushed { paths }) => debug!("Flushed {paths} changed paths"),
                        Ok(_) => {}
                        Err(e) if e.is_session_fatal() => break Err(e),
                        Err(e) => warn!(
                            "Transfer failed, {} paths kept for retry: {e}",
                            coordinator.pending_len()
                        ),
                    }
                }
            }
        };

        stop.cancel();
        if !watch_done {
            match watch_task.await {
                Ok(Err(e)) => debug!("Watcher ended with: {e}"),
                Err(e) => debug!("Watcher thread ended with: {e}"),
                Ok(Ok(())) => {}
            }
        }
        result
    }
}
