use crate::connection::ActiveSession;
use crate::error::{TransferError, TransferStep};
use crate::utils::{remote_parent, remote_path};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Mirror one local path onto the remote host and return the bytes written.
///
/// `rel` is relative to `local_root`. A directory is mirrored by ensuring it
/// exists remotely. A partially written remote file is left as is on failure.
pub async fn upload(active: &ActiveSession, local_root: &Path, rel: &Path) -> Result<u64, TransferError> {
    let local = local_root.join(rel);
    let local_name = local.display().to_string();
    let remote = remote_path(active.remote_root(), rel);
    let session = active.session();

    let meta = tokio::fs::metadata(&local)
        .await
        .map_err(|e| TransferError::new(TransferStep::LocalOpen, &local_name, e))?;
    if meta.is_dir() {
        session
            .ensure_dir(&remote)
            .await
            .map_err(|e| TransferError::new(TransferStep::RemoteMkdir, &remote, e))?;
        return Ok(0);
    }

    let mut reader = tokio::fs::File::open(&local)
        .await
        .map_err(|e| TransferError::new(TransferStep::LocalOpen, &local_name, e))?;

    if let Some(parent) = remote_parent(&remote) {
        session
            .ensure_dir(parent)
            .await
            .map_err(|e| TransferError::new(TransferStep::RemoteMkdir, parent, e))?;
    }

    let mut writer = session
        .create_file(&remote)
        .await
        .map_err(|e| TransferError::new(TransferStep::RemoteCreate, &remote, e))?;
    let bytes = tokio::io::copy(&mut reader, &mut writer)
        .await
        .map_err(|e| TransferError::new(TransferStep::Copy, &remote, e))?;
    writer
        .shutdown()
        .await
        .map_err(|e| TransferError::new(TransferStep::Copy, &remote, e))?;

    debug!("copied {} ({bytes} bytes) -> {remote}", local.display());
    Ok(bytes)
}

impl TransferError {
    /// The local file disappeared before it could be read.
    pub fn is_local_not_found(&self) -> bool {
        self.step == TransferStep::LocalOpen
            && self
                .source
                .downcast_ref::<std::io::Error>()
                .is_some_and(|e| e.kind() == std::io::ErrorKind::NotFound)
    }
}
