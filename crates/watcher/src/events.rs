//! Raw change notifications
//!
//! The observers translate `notify` events into [`RawChange`]s. Kinds are
//! informational only; the debounce coordinator treats every kind the same.

use notify::event::{MetadataKind, ModifyKind, RenameMode};
use notify::{Event, EventKind};
use std::path::PathBuf;

/// What happened to a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Removed,
    /// The path was the source of a rename
    RenamedFrom,
    /// The path was the destination of a rename
    RenamedTo,
    Modified,
    OwnerChanged,
}

impl ChangeKind {
    /// Whether the path no longer exists after this change
    pub fn is_removal(self) -> bool {
        matches!(self, Self::Removed | Self::RenamedFrom)
    }

    /// Whether the path appeared with this change
    pub fn is_addition(self) -> bool {
        matches!(self, Self::Created | Self::RenamedTo)
    }
}

/// A single filesystem change under the sync root
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RawChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl RawChange {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Translate a `notify` event into zero or more raw changes
pub(crate) fn classify(event: &Event) -> Vec<RawChange> {
    let kind = match event.kind {
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Remove(_) => ChangeKind::Removed,
        EventKind::Modify(ModifyKind::Name(mode)) => return classify_rename(mode, &event.paths),
        EventKind::Modify(ModifyKind::Metadata(MetadataKind::AccessTime)) => return Vec::new(),
        EventKind::Modify(ModifyKind::Metadata(
            MetadataKind::Ownership | MetadataKind::Permissions,
        )) => ChangeKind::OwnerChanged,
        EventKind::Modify(_) | EventKind::Any => ChangeKind::Modified,
        EventKind::Access(_) | EventKind::Other => return Vec::new(),
    };

    event
        .paths
        .iter()
        .map(|path| RawChange::new(path.clone(), kind))
        .collect()
}

fn classify_rename(mode: RenameMode, paths: &[PathBuf]) -> Vec<RawChange> {
    match (mode, paths) {
        (RenameMode::Both, [from, to]) => vec![
            RawChange::new(from.clone(), ChangeKind::RenamedFrom),
            RawChange::new(to.clone(), ChangeKind::RenamedTo),
        ],
        (RenameMode::From, _) => paths
            .iter()
            .map(|p| RawChange::new(p.clone(), ChangeKind::RenamedFrom))
            .collect(),
        (RenameMode::To, _) => paths
            .iter()
            .map(|p| RawChange::new(p.clone(), ChangeKind::RenamedTo))
            .collect(),
        // FSEvents and friends do not say which side of the rename a path is on
        _ => paths
            .iter()
            .map(|p| {
                let kind = if p.exists() {
                    ChangeKind::RenamedTo
                } else {
                    ChangeKind::RenamedFrom
                };
                RawChange::new(p.clone(), kind)
            })
            .collect(),
    }
}
