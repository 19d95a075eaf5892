mod support;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use support::eventually;
use tokio_util::sync::CancellationToken;
use upsync_core::{ChangeDetector, ChangeQueue, IgnoreFilter, IntentKind};

struct Running {
    dir: tempfile::TempDir,
    root: PathBuf,
    queue: Arc<ChangeQueue>,
    cancel: CancellationToken,
}

impl Drop for Running {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn start(ignore: &[&str], setup: impl FnOnce(&std::path::Path)) -> Running {
    let dir = tempfile::tempdir().unwrap();
    setup(dir.path());
    let queue = Arc::new(ChangeQueue::new());
    let detector = ChangeDetector::start(dir.path(), IgnoreFilter::new(ignore), Arc::clone(&queue), false).unwrap();
    let root = detector.root().to_path_buf();
    let cancel = CancellationToken::new();
    tokio::spawn(detector.run(cancel.clone()));
    Running {
        dir,
        root,
        queue,
        cancel,
    }
}

#[tokio::test]
async fn rapid_rewrites_stay_deduplicated() {
    let rt = start(&[], |_| {});
    let file = rt.root.join("draft.md");
    for i in 0..50 {
        fs::write(&file, format!("revision {i}")).unwrap();
    }
    assert!(eventually(|| rt.queue.len(IntentKind::Upload) == 1).await);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(rt.queue.snapshot(IntentKind::Upload), vec![PathBuf::from("draft.md")]);
}

#[tokio::test]
async fn deleting_a_file_yields_one_delete() {
    let rt = start(&[], |root| fs::write(root.join("old.log"), b"bye").unwrap());
    fs::remove_file(rt.root.join("old.log")).unwrap();

    assert!(eventually(|| rt.queue.len(IntentKind::Delete) == 1).await);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(rt.queue.snapshot(IntentKind::Delete), vec![PathBuf::from("old.log")]);
    assert!(rt.queue.snapshot(IntentKind::Upload).is_empty());
}

#[tokio::test]
async fn new_subdirectory_is_watched_without_restart() {
    let rt = start(&[], |_| {});
    let sub = rt.root.join("posts");
    fs::create_dir(&sub).unwrap();
    assert!(eventually(|| rt.queue.snapshot(IntentKind::Upload).contains(&PathBuf::from("posts"))).await);
    // Give the detector a moment to register the new directory.
    tokio::time::sleep(Duration::from_millis(100)).await;

    fs::write(sub.join("first.md"), b"# hello").unwrap();
    let expected = PathBuf::from("posts/first.md");
    assert!(eventually(|| rt.queue.snapshot(IntentKind::Upload).contains(&expected)).await);
}

#[tokio::test]
async fn existing_subdirectories_are_watched() {
    let rt = start(&[], |root| fs::create_dir_all(root.join("a/b/c")).unwrap());
    fs::write(rt.root.join("a/b/c/deep.txt"), b"deep").unwrap();
    let expected = PathBuf::from("a/b/c/deep.txt");
    assert!(eventually(|| rt.queue.snapshot(IntentKind::Upload).contains(&expected)).await);
}

#[tokio::test]
async fn ignored_directories_produce_nothing() {
    let rt = start(&[".git"], |root| fs::create_dir(root.join(".git")).unwrap());
    fs::write(rt.root.join(".git/HEAD"), b"ref: refs/heads/main").unwrap();
    fs::write(rt.root.join("tracked.txt"), b"yes").unwrap();

    let expected = PathBuf::from("tracked.txt");
    assert!(eventually(|| rt.queue.snapshot(IntentKind::Upload).contains(&expected)).await);
    assert_eq!(rt.queue.snapshot(IntentKind::Upload), vec![expected]);
    assert!(rt.dir.path().join(".git/HEAD").exists());
}
