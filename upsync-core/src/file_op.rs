use notify::{
    event::{CreateKind, ModifyKind, RenameMode},
    EventKind,
};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntentKind {
    Upload,
    Delete,
}

/// A recorded need to upload or delete one path, relative to the local root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SyncIntent {
    pub path: PathBuf,
    pub kind: IntentKind,
}

impl SyncIntent {
    pub fn upload(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: IntentKind::Upload,
        }
    }

    pub fn delete(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: IntentKind::Delete,
        }
    }
}

/// Filesystem change distilled from a raw watcher event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FsEvent {
    /// A new entry appeared; may be a file or a directory.
    Create(PathBuf),
    /// A new entry known to be a directory.
    MkDir(PathBuf),
    Modify(PathBuf),
    Remove(PathBuf),
}

impl FsEvent {
    pub fn path(&self) -> &Path {
        match self {
            FsEvent::Create(p) | FsEvent::MkDir(p) | FsEvent::Modify(p) | FsEvent::Remove(p) => p,
        }
    }
}

/// Convert a notify::Event into zero or more FsEvent.
///
/// The old name of a rename becomes a `Remove`, the new name a `Create`.
/// Metadata-only changes and access notifications yield nothing.
pub fn event_to_ops(event: notify::Event) -> Vec<FsEvent> {
    let mut ops = Vec::new();
    match event.kind {
        EventKind::Create(CreateKind::Folder) => {
            ops.extend(event.paths.into_iter().map(FsEvent::MkDir));
        }
        EventKind::Create(_) => {
            ops.extend(event.paths.into_iter().map(FsEvent::Create));
        }
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => ops.extend(event.paths.into_iter().map(FsEvent::Remove)),
            RenameMode::To => ops.extend(event.paths.into_iter().map(FsEvent::Create)),
            RenameMode::Both => {
                let mut paths = event.paths.into_iter();
                if let Some(from) = paths.next() {
                    ops.push(FsEvent::Remove(from));
                }
                ops.extend(paths.map(FsEvent::Create));
            }
            // Backends that cannot tell which side of a rename they saw.
            RenameMode::Any | RenameMode::Other => {
                for p in event.paths {
                    if p.symlink_metadata().is_ok() {
                        ops.push(FsEvent::Create(p));
                    } else {
                        ops.push(FsEvent::Remove(p));
                    }
                }
            }
        },
        EventKind::Modify(ModifyKind::Metadata(_)) => {}
        EventKind::Modify(_) => {
            ops.extend(event.paths.into_iter().map(FsEvent::Modify));
        }
        EventKind::Remove(_) => {
            ops.extend(event.paths.into_iter().map(FsEvent::Remove));
        }
        EventKind::Access(_) | EventKind::Any | EventKind::Other => {}
    }
    ops
}
