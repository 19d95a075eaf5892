//! Local-directory transport standing in for an SFTP server.
//!
//! The "remote" side is a temporary directory; remote paths are absolute
//! paths inside it, so `remote_root` is simply that directory's path.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use upsync_core::{AuthMethod, ConnectError, Connector, Credentials, RemoteWriter, TransportSession};

/// Knobs shared by the connector and every session it hands out.
#[derive(Default)]
pub struct RemoteState {
    /// Directories created by `ensure_dir`, in creation order.
    pub created_dirs: Mutex<Vec<PathBuf>>,
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    /// Number of upcoming connection attempts that must fail.
    pub refuse_connects: AtomicUsize,
    pub fail_create: AtomicBool,
    pub link_down: AtomicBool,
}

#[derive(Clone, Default)]
pub struct LocalDirConnector {
    pub state: Arc<RemoteState>,
}

#[async_trait]
impl Connector for LocalDirConnector {
    async fn connect(&self, credentials: &Credentials) -> Result<Box<dyn TransportSession>, ConnectError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .state
            .refuse_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(ConnectError::Dial {
                host: credentials.host.clone(),
                source: anyhow!("connection refused"),
            });
        }
        self.state.link_down.store(false, Ordering::SeqCst);
        Ok(Box::new(LocalDirSession {
            state: Arc::clone(&self.state),
        }))
    }
}

pub struct LocalDirSession {
    state: Arc<RemoteState>,
}

impl LocalDirSession {
    fn check_link(&self) -> Result<()> {
        if self.state.link_down.load(Ordering::SeqCst) {
            return Err(anyhow!("connection lost"));
        }
        Ok(())
    }
}

#[async_trait]
impl TransportSession for LocalDirSession {
    async fn ensure_dir(&self, path: &str) -> Result<()> {
        self.check_link()?;
        let target = Path::new(path);
        let mut missing: Vec<&Path> = target.ancestors().take_while(|p| !p.exists()).collect();
        missing.reverse();
        for dir in missing {
            tokio::fs::create_dir(dir).await?;
            self.state.created_dirs.lock().push(dir.to_path_buf());
        }
        Ok(())
    }

    async fn create_file(&self, path: &str) -> Result<RemoteWriter> {
        self.check_link()?;
        if self.state.fail_create.load(Ordering::SeqCst) {
            return Err(anyhow!("permission denied"));
        }
        Ok(Box::new(tokio::fs::File::create(path).await?))
    }

    async fn ping(&self) -> Result<()> {
        self.check_link()
    }

    async fn close(&self) -> Result<()> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn credentials(remote_root: &Path) -> Credentials {
    Credentials {
        host: "localhost".into(),
        user: "tester".into(),
        auth: AuthMethod::Password("secret".into()),
        remote_root: remote_root.to_string_lossy().into_owned(),
        host_fingerprints: None,
    }
}

/// Poll `cond` until it holds or five seconds pass.
pub async fn eventually<F: FnMut() -> bool>(mut cond: F) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    cond()
}
