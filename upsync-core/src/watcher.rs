//! Recursive change detection on the local tree.
//!
//! Directories are registered one by one (non-recursively) so that ignored
//! subtrees never get a watch. The detector owns its watcher and extends the
//! watch set itself when a directory appears, from the same task that consumes
//! the events.

use crate::error::WatchError;
use crate::file_op::{event_to_ops, FsEvent, SyncIntent};
use crate::filter::IgnoreFilter;
use crate::queue::ChangeQueue;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

pub struct ChangeDetector {
    root: PathBuf,
    filter: IgnoreFilter,
    queue: Arc<ChangeQueue>,
    watcher: RecommendedWatcher,
    events: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
}

impl ChangeDetector {
    /// Create the watcher and register every directory under `root`.
    ///
    /// Any failure here is fatal. With `initial_sync`, every file found by the
    /// walk is queued for upload as well.
    pub fn start(
        root: &Path,
        filter: IgnoreFilter,
        queue: Arc<ChangeQueue>,
        initial_sync: bool,
    ) -> Result<Self, WatchError> {
        let root = root.canonicalize().map_err(|source| WatchError::Root {
            path: root.to_path_buf(),
            source,
        })?;
        let (tx, events) = mpsc::unbounded_channel();
        let watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            notify::Config::default(),
        )
        .map_err(WatchError::Init)?;

        let mut detector = Self {
            root,
            filter,
            queue,
            watcher,
            events,
        };
        let root = detector.root.clone();
        let mut registered = 0usize;
        let mut queued = 0usize;
        detector.walk(&root, |detector, path, is_dir| {
            if is_dir {
                detector
                    .watcher
                    .watch(path, RecursiveMode::NonRecursive)
                    .map_err(|source| WatchError::Register {
                        path: path.to_path_buf(),
                        source,
                    })?;
                debug!("watching {}", path.display());
                registered += 1;
            } else if initial_sync && detector.enqueue_upload(path) {
                queued += 1;
            }
            Ok(())
        })?;
        info!(root = %detector.root.display(), directories = registered, queued, "file watcher started");
        Ok(detector)
    }

    /// Canonical local root; intent paths are relative to it.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Consume filesystem events until cancelled.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            let res = tokio::select! {
                _ = cancel.cancelled() => break,
                res = self.events.recv() => match res {
                    Some(res) => res,
                    None => break,
                },
            };
            match res {
                Ok(event) => self.handle_event(event),
                Err(e) => error!("watch error: {e}"),
            }
        }
        debug!("change detector stopped");
    }

    fn handle_event(&mut self, event: notify::Event) {
        for op in event_to_ops(event) {
            let Some(rel) = self.relative(op.path()) else {
                continue;
            };
            if rel.as_os_str().is_empty() || self.filter.is_ignored(&rel) {
                continue;
            }
            match op {
                FsEvent::Modify(_) => {
                    self.queue.enqueue(SyncIntent::upload(rel));
                }
                FsEvent::Remove(_) => {
                    self.queue.enqueue(SyncIntent::delete(rel));
                }
                FsEvent::MkDir(path) => {
                    self.queue.enqueue(SyncIntent::upload(rel));
                    self.watch_new_dir(&path);
                }
                FsEvent::Create(path) => {
                    self.queue.enqueue(SyncIntent::upload(rel));
                    if path.is_dir() {
                        self.watch_new_dir(&path);
                    }
                }
            }
        }
    }

    /// Register a directory that appeared after startup, along with whatever
    /// it already contains. Failures are logged and leave that subtree
    /// unwatched.
    fn watch_new_dir(&mut self, dir: &Path) {
        info!("new directory detected, adding to watcher: {}", dir.display());
        let result = self.walk(dir, |detector, path, is_dir| {
            if is_dir {
                if let Err(e) = detector.watcher.watch(path, RecursiveMode::NonRecursive) {
                    warn!("could not add new directory {} to watcher: {e}", path.display());
                    return Ok(());
                }
                debug!("watching {}", path.display());
            }
            // Entries created before the watch was in place produced no event.
            if path != dir {
                detector.enqueue_upload(path);
            }
            Ok(())
        });
        if let Err(e) = result {
            warn!("could not add new directory {} to watcher: {e}", dir.display());
        }
    }

    /// Walk `dir`, skipping ignored subtrees, calling `visit` with each entry
    /// and whether it is a directory.
    fn walk<F>(&mut self, dir: &Path, mut visit: F) -> Result<(), WatchError>
    where
        F: FnMut(&mut Self, &Path, bool) -> Result<(), WatchError>,
    {
        let root = self.root.clone();
        let filter = self.filter.clone();
        let walker = WalkDir::new(dir).into_iter().filter_entry(|e| {
            let rel = e.path().strip_prefix(&root).unwrap_or(e.path());
            !filter.is_ignored(rel)
        });
        for entry in walker {
            let entry = entry.map_err(|source| WatchError::Walk {
                path: dir.to_path_buf(),
                source,
            })?;
            visit(self, entry.path(), entry.file_type().is_dir())?;
        }
        Ok(())
    }

    fn enqueue_upload(&self, path: &Path) -> bool {
        match self.relative(path) {
            Some(rel) if !rel.as_os_str().is_empty() => self.queue.enqueue(SyncIntent::upload(rel)),
            _ => false,
        }
    }

    fn relative(&self, path: &Path) -> Option<PathBuf> {
        path.strip_prefix(&self.root).ok().map(Path::to_path_buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_op::IntentKind;
    use notify::event::{CreateKind, DataChange, EventKind, ModifyKind, RemoveKind};
    use std::fs;

    fn detector(dir: &Path, ignore: &[&str]) -> ChangeDetector {
        ChangeDetector::start(
            dir,
            IgnoreFilter::new(ignore),
            Arc::new(ChangeQueue::new()),
            false,
        )
        .unwrap()
    }

    fn event(kind: EventKind, path: PathBuf) -> notify::Event {
        notify::Event::new(kind).add_path(path)
    }

    #[test]
    fn missing_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = ChangeDetector::start(
            &dir.path().join("nope"),
            IgnoreFilter::default(),
            Arc::new(ChangeQueue::new()),
            false,
        )
        .err()
        .unwrap();
        assert!(matches!(err, WatchError::Root { .. }));
    }

    #[test]
    fn write_is_queued_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        let mut d = detector(dir.path(), &[]);
        let file = d.root().join("src/main.rs");
        d.handle_event(event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            file,
        ));
        assert_eq!(d.queue.snapshot(IntentKind::Upload), vec![PathBuf::from("src/main.rs")]);
    }

    #[test]
    fn remove_yields_only_a_delete() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = detector(dir.path(), &[]);
        let file = d.root().join("old.txt");
        d.handle_event(event(EventKind::Remove(RemoveKind::File), file));
        assert_eq!(d.queue.snapshot(IntentKind::Delete), vec![PathBuf::from("old.txt")]);
        assert!(d.queue.snapshot(IntentKind::Upload).is_empty());
    }

    #[test]
    fn ignored_and_foreign_paths_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = detector(dir.path(), &[".git"]);
        let ignored = d.root().join(".git/index");
        d.handle_event(event(EventKind::Create(CreateKind::File), ignored));
        d.handle_event(event(
            EventKind::Create(CreateKind::File),
            PathBuf::from("/somewhere/else.txt"),
        ));
        assert!(d.queue.is_empty());
    }

    #[test]
    fn new_directory_queues_its_existing_contents() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = detector(dir.path(), &["skip"]);
        let sub = d.root().join("assets");
        fs::create_dir_all(sub.join("img")).unwrap();
        fs::write(sub.join("img/logo.png"), b"png").unwrap();
        fs::write(sub.join("skip.tmp"), b"tmp").unwrap();

        d.handle_event(event(EventKind::Create(CreateKind::Folder), sub));
        assert_eq!(
            d.queue.snapshot(IntentKind::Upload),
            vec![
                PathBuf::from("assets"),
                PathBuf::from("assets/img"),
                PathBuf::from("assets/img/logo.png"),
            ]
        );
    }

    #[test]
    fn vanished_new_directory_is_logged_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = detector(dir.path(), &[]);
        let ghost = d.root().join("ghost");
        let later = d.root().join("later.txt");
        d.handle_event(event(EventKind::Create(CreateKind::Folder), ghost));
        d.handle_event(event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            later,
        ));
        assert_eq!(
            d.queue.snapshot(IntentKind::Upload),
            vec![PathBuf::from("ghost"), PathBuf::from("later.txt")]
        );
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_subdirectory_fails_startup() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let locked = dir.path().join("locked");
        fs::create_dir_all(locked.join("inner")).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        // Permission bits do not apply to root.
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let result = ChangeDetector::start(
            dir.path(),
            IgnoreFilter::default(),
            Arc::new(ChangeQueue::new()),
            false,
        );
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        let err = result.err().unwrap();
        assert!(
            matches!(err, WatchError::Walk { .. } | WatchError::Register { .. }),
            "got {err}"
        );
    }

    #[test]
    fn initial_sync_queues_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/a.md"), b"a").unwrap();
        fs::create_dir(dir.path().join("node_modules")).unwrap();
        fs::write(dir.path().join("node_modules/x.js"), b"x").unwrap();

        let queue = Arc::new(ChangeQueue::new());
        ChangeDetector::start(
            dir.path(),
            IgnoreFilter::new(&["node_modules"]),
            Arc::clone(&queue),
            true,
        )
        .unwrap();
        assert_eq!(queue.snapshot(IntentKind::Upload), vec![PathBuf::from("docs/a.md")]);
    }
}
