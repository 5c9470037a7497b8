//! Single recursive subscription on the sync root

use super::{
    canonical_root, channel_watcher, next_event, ChangeObserver, ChangeSink, Next, ObserverKind,
    RootClaim, RootFilter,
};
use crate::config::WatcherConfig;
use crate::events::{ChangeKind, RawChange};
use crate::ignore::IgnoreFile;
use notify::{RecursiveMode, Watcher};
use podsync_core::error::{Error, Result};
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Observer backed by the platform's recursive change stream
pub struct NativeObserver {
    ignore: IgnoreFile,
    stop: CancellationToken,
    poll_interval: Duration,
}

impl NativeObserver {
    pub fn new(config: &WatcherConfig, ignore: IgnoreFile, stop: CancellationToken) -> Self {
        Self {
            ignore,
            stop,
            poll_interval: config.poll_interval(),
        }
    }
}

impl ChangeObserver for NativeObserver {
    fn kind(&self) -> ObserverKind {
        ObserverKind::NativeStream
    }

    fn watch(&mut self, root: &Path, sink: &dyn ChangeSink) -> Result<()> {
        let root = canonical_root(root)?;
        let _claim = RootClaim::acquire(&root)?;
        let mut filter = RootFilter::new(root.clone(), self.ignore.clone());

        let (mut watcher, rx) = channel_watcher()?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| Error::watcher(format!("Failed to watch {}: {e}", root.display())))?;
        info!("Watching {} (native stream)", root.display());

        loop {
            match next_event(&rx, &self.stop, self.poll_interval, &root)? {
                Next::Stop => break,
                Next::Idle => continue,
                Next::Event(event) => {
                    filter.refresh();
                    if event.need_rescan() {
                        warn!("Change stream dropped events, scheduling a full transfer");
                        sink.on_change(RawChange::new(filter.root(), ChangeKind::Modified));
                    }
                    filter.forward(&event, sink);
                }
            }
        }

        info!("Stopped watching {}", root.display());
        Ok(())
    }
}
