use crate::config::Credentials;
use crate::error::ConnectError;
use anyhow::Result;
use async_trait::async_trait;
use tokio::io::AsyncWrite;

/// Writable handle to a remote file.
pub type RemoteWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One authenticated remote connection. Paths are absolute POSIX paths on the
/// remote host.
#[async_trait]
pub trait TransportSession: Send + Sync + 'static {
    /// Create `path` and any missing parents. Existing directories are left
    /// untouched.
    async fn ensure_dir(&self, path: &str) -> Result<()>;

    /// Create or truncate the file at `path` and return a writer for it.
    async fn create_file(&self, path: &str) -> Result<RemoteWriter>;

    /// Cheap round-trip to check the session is still alive.
    async fn ping(&self) -> Result<()>;

    /// Release the session and its underlying link. Every sub-resource is
    /// released even if an earlier one fails.
    async fn close(&self) -> Result<()>;
}

/// Opens transport sessions from credentials.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, credentials: &Credentials) -> Result<Box<dyn TransportSession>, ConnectError>;
}
