//! One non-recursive watch per directory
//!
//! The watch set mirrors the set of non-excluded directories under the root:
//! a directory is registered when it appears (creation or rename into the
//! tree) and deregistered together with its descendants when it disappears.

use super::{
    canonical_root, channel_watcher, next_event, watch_failure, ChangeObserver, ChangeSink, Next,
    ObserverKind, RootClaim, RootFilter,
};
use crate::config::WatcherConfig;
use crate::events::{ChangeKind, RawChange};
use crate::ignore::{relative_path, ExclusionMatcher, IgnoreFile};
use notify::{RecursiveMode, Watcher};
use podsync_core::error::Result;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

/// The set of directories currently holding a watch
#[derive(Debug, Default, Clone)]
pub struct WatchTree {
    dirs: BTreeSet<PathBuf>,
}

impl WatchTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, dir: &Path) -> bool {
        self.dirs.contains(dir)
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.dirs.iter()
    }

    fn insert(&mut self, dir: PathBuf) -> bool {
        self.dirs.insert(dir)
    }

    /// Remove `dir` and every registered directory below it
    fn remove_subtree(&mut self, dir: &Path) -> Vec<PathBuf> {
        let removed: Vec<PathBuf> = self
            .dirs
            .range(dir.to_path_buf()..)
            .take_while(|d| d.starts_with(dir))
            .cloned()
            .collect();
        for d in &removed {
            self.dirs.remove(d);
        }
        removed
    }
}

/// Register a watch on `dir` and every non-excluded directory below it.
///
/// Directories that vanish mid-walk are skipped. Exhausting the watch limit
/// is fatal.
pub(crate) fn register_subtree<W: Watcher>(
    watcher: &mut W,
    tree: &mut WatchTree,
    rules: &ExclusionMatcher,
    root: &Path,
    dir: &Path,
    follow_symlinks: bool,
) -> Result<usize> {
    let mut added = 0;
    let walker = WalkDir::new(dir)
        .follow_links(follow_symlinks)
        .into_iter()
        .filter_entry(|entry| {
            if !entry.file_type().is_dir() {
                return false;
            }
            match relative_path(root, entry.path()) {
                Some(relative) => !rules.is_excluded(&relative),
                None => false,
            }
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                trace!("Skipping unreadable entry: {e}");
                continue;
            }
        };
        let path = entry.path();
        if tree.contains(path) {
            continue;
        }
        match watcher.watch(path, RecursiveMode::NonRecursive) {
            Ok(()) => {
                tree.insert(path.to_path_buf());
                added += 1;
            }
            Err(e) => {
                if let Some(err) = watch_failure(e, path) {
                    return Err(err);
                }
            }
        }
    }

    Ok(added)
}

/// Observer for platforms whose notification API is per directory
pub struct PerDirectoryObserver {
    ignore: IgnoreFile,
    stop: CancellationToken,
    poll_interval: Duration,
    follow_symlinks: bool,
    tree: WatchTree,
}

impl PerDirectoryObserver {
    pub fn new(config: &WatcherConfig, ignore: IgnoreFile, stop: CancellationToken) -> Self {
        Self {
            ignore,
            stop,
            poll_interval: config.poll_interval(),
            follow_symlinks: config.follow_symlinks,
            tree: WatchTree::new(),
        }
    }

    /// Directories currently watched
    pub fn watch_tree(&self) -> &WatchTree {
        &self.tree
    }

    fn apply<W: Watcher>(
        &mut self,
        watcher: &mut W,
        filter: &RootFilter,
        change: &RawChange,
    ) -> Result<()> {
        if change.kind.is_removal() {
            for dir in self.tree.remove_subtree(&change.path) {
                // The kernel drops the watch of a deleted directory on its own.
                let _ = watcher.unwatch(&dir);
                debug!("Deregistered {}", dir.display());
            }
        } else if change.kind.is_addition() && change.path.is_dir() {
            let added = register_subtree(
                watcher,
                &mut self.tree,
                filter.rules(),
                filter.root(),
                &change.path,
                self.follow_symlinks,
            )?;
            debug!("Registered {added} directories under {}", change.path.display());
        }
        Ok(())
    }

    /// Bring the watch set in line with changed exclusion rules: drop
    /// directories the rules now exclude and register the ones they no
    /// longer exclude.
    fn reconcile<W: Watcher>(
        &mut self,
        watcher: &mut W,
        filter: &RootFilter,
        sink: &dyn ChangeSink,
    ) -> Result<()> {
        let root = filter.root();
        let excluded: Vec<PathBuf> = self
            .tree
            .iter()
            .filter(|dir| {
                relative_path(root, dir).is_some_and(|relative| filter.rules().is_excluded(&relative))
            })
            .cloned()
            .collect();

        let mut dropped = 0;
        for dir in excluded {
            for gone in self.tree.remove_subtree(&dir) {
                let _ = watcher.unwatch(&gone);
                dropped += 1;
            }
        }

        let added = register_subtree(
            watcher,
            &mut self.tree,
            filter.rules(),
            root,
            root,
            self.follow_symlinks,
        )?;
        info!("Exclusion rules changed: {added} directories registered, {dropped} dropped");

        if added > 0 {
            // Files already inside newly included directories have never been sent
            sink.on_change(RawChange::new(root, ChangeKind::Modified));
        }
        Ok(())
    }
}

impl ChangeObserver for PerDirectoryObserver {
    fn kind(&self) -> ObserverKind {
        ObserverKind::PerDirectory
    }

    fn watch(&mut self, root: &Path, sink: &dyn ChangeSink) -> Result<()> {
        let root = canonical_root(root)?;
        let _claim = RootClaim::acquire(&root)?;
        let mut filter = RootFilter::new(root.clone(), self.ignore.clone());

        let (mut watcher, rx) = channel_watcher()?;
        self.tree = WatchTree::new();
        register_subtree(
            &mut watcher,
            &mut self.tree,
            filter.rules(),
            &root,
            &root,
            self.follow_symlinks,
        )?;
        info!(
            "Watching {} ({} directories)",
            root.display(),
            self.tree.len()
        );

        loop {
            match next_event(&rx, &self.stop, self.poll_interval, &root)? {
                Next::Stop => break,
                Next::Idle => continue,
                Next::Event(event) => {
                    if filter.refresh() {
                        self.reconcile(&mut watcher, &filter, sink)?;
                    }
                    if event.need_rescan() {
                        warn!("Watch queue overflowed, rescanning {}", root.display());
                        register_subtree(
                            &mut watcher,
                            &mut self.tree,
                            filter.rules(),
                            &root,
                            &root,
                            self.follow_symlinks,
                        )?;
                        sink.on_change(RawChange::new(&root, ChangeKind::Modified));
                    }
                    for change in filter.forward(&event, sink) {
                        self.apply(&mut watcher, &filter, &change)?;
                    }
                }
            }
        }

        info!("Stopped watching {}", root.display());
        Ok(())
    }
}
