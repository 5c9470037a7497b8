//! Transfer plans: what one synchronization pass sends, and how

use podsync_core::config::TransportMode;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// How bytes reach the remote instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// The transfer protocol is piped through a remote exec
    DirectShell,
    /// A transient daemon inside the instance, reached through a port-forward
    DaemonTunnel,
}

impl TransportKind {
    /// Platform rule: Windows hosts cannot use the remote-shell override
    pub fn for_platform(os: &str) -> Self {
        match os {
            "windows" => Self::DaemonTunnel,
            _ => Self::DirectShell,
        }
    }

    /// Apply a configured override, falling back to the platform rule
    pub fn select(mode: TransportMode, os: &str) -> Self {
        match mode {
            TransportMode::Auto => Self::for_platform(os),
            TransportMode::DirectShell => Self::DirectShell,
            TransportMode::DaemonTunnel => Self::DaemonTunnel,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DirectShell => f.write_str("direct-shell"),
            Self::DaemonTunnel => f.write_str("daemon-tunnel"),
        }
    }
}

/// The unit of work for one synchronization pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    /// Root-relative paths; empty means the entire tree
    pub paths: Vec<PathBuf>,
    pub transport: TransportKind,
    pub delete: bool,
    pub dry_run: bool,
    pub verbose: bool,
}

impl TransferPlan {
    /// A pass over the entire tree
    pub fn full_tree(transport: TransportKind) -> Self {
        Self {
            paths: Vec::new(),
            transport,
            delete: false,
            dry_run: false,
            verbose: false,
        }
    }

    /// Build a plan from pending paths.
    ///
    /// Paths are deduplicated and made relative to `root`. Up to `threshold`
    /// paths produce an individual-file plan; more, none, or a change to the
    /// root itself produce a full-tree plan. Paths outside the root are
    /// dropped.
    pub fn from_pending(
        pending: &[PathBuf],
        root: &Path,
        threshold: usize,
        transport: TransportKind,
    ) -> Self {
        let mut relative = BTreeSet::new();
        for path in pending {
            let rel = if path.is_relative() {
                path.as_path()
            } else {
                match path.strip_prefix(root) {
                    Ok(rel) => rel,
                    Err(_) => {
                        debug!("Dropping {} outside the sync root", path.display());
                        continue;
                    }
                }
            };
            if rel.as_os_str().is_empty() {
                return Self::full_tree(transport);
            }
            relative.insert(rel.to_path_buf());
        }

        if relative.is_empty() || relative.len() > threshold {
            return Self::full_tree(transport);
        }

        Self {
            paths: relative.into_iter().collect(),
            ..Self::full_tree(transport)
        }
    }

    /// Set the utility flags
    pub fn with_flags(mut self, delete: bool, dry_run: bool, verbose: bool) -> Self {
        self.delete = delete;
        self.dry_run = dry_run;
        self.verbose = verbose;
        self
    }

    /// Promote to a full-tree plan when a listed path no longer exists
    /// locally: an explicit path list cannot carry a deletion.
    pub fn promote_removed(self, root: &Path) -> Self {
        let missing = self
            .paths
            .iter()
            .find(|p| std::fs::symlink_metadata(root.join(p)).is_err());
        match missing {
            Some(path) => {
                debug!(
                    "{} no longer exists, promoting to a full-tree pass",
                    path.display()
                );
                Self {
                    paths: Vec::new(),
                    ..self
                }
            }
            None => self,
        }
    }

    pub fn is_full_tree(&self) -> bool {
        self.paths.is_empty()
    }
}

impl fmt::Display for TransferPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_full_tree() {
            write!(f, "full tree via {}", self.transport)
        } else {
            write!(f, "{} paths via {}", self.paths.len(), self.transport)
        }
    }
}
