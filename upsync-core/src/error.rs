//! Error types for the synchronization engine.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{0}")]
    Invalid(String),
}

/// Failures while establishing or tearing down a transport session.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("not connected to remote host")]
    NotConnected,

    #[error("invalid host {0:?}")]
    InvalidHost(String),

    #[error("failed to read private key {path}: {source}")]
    KeyRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse private key {path}: {reason}")]
    KeyParse { path: PathBuf, reason: String },

    #[error("connection to {host} timed out after {}s", timeout.as_secs())]
    Timeout { host: String, timeout: Duration },

    #[error("failed to connect to {host}: {source}")]
    Dial {
        host: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("host key of {host} is not in the allowed fingerprints")]
    HostKeyRejected { host: String },

    #[error("authentication failed for {user}@{host}: {reason}")]
    Auth {
        user: String,
        host: String,
        reason: String,
    },

    #[error("failed to open sftp subsystem on {host}: {source}")]
    Subsystem {
        host: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("errors closing connection: {0}")]
    Close(#[source] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to create file watcher: {0}")]
    Init(#[source] notify::Error),

    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("failed to watch directory {path}: {source}")]
    Register {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("failed to resolve local root {path}: {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The step of an upload that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStep {
    LocalOpen,
    RemoteMkdir,
    RemoteCreate,
    Copy,
}

impl TransferStep {
    /// Whether the step talks to the remote host.
    pub fn is_remote(self) -> bool {
        !matches!(self, TransferStep::LocalOpen)
    }
}

impl fmt::Display for TransferStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransferStep::LocalOpen => "local-open",
            TransferStep::RemoteMkdir => "remote-mkdir",
            TransferStep::RemoteCreate => "remote-create",
            TransferStep::Copy => "copy",
        })
    }
}

#[derive(Debug, Error)]
#[error("{step} failed for {path}: {source}")]
pub struct TransferError {
    pub step: TransferStep,
    pub path: String,
    #[source]
    pub source: anyhow::Error,
}

impl TransferError {
    pub(crate) fn new(step: TransferStep, path: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self {
            step,
            path: path.into(),
            source: source.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_error_names_step_and_path() {
        let err = TransferError::new(
            TransferStep::RemoteMkdir,
            "/srv/www/a",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.to_string(), "remote-mkdir failed for /srv/www/a: denied");
        assert!(err.step.is_remote());
        assert!(!TransferStep::LocalOpen.is_remote());
    }

    #[test]
    fn timeout_reports_seconds() {
        let err = ConnectError::Timeout {
            host: "example.org:22".into(),
            timeout: Duration::from_secs(30),
        };
        assert_eq!(err.to_string(), "connection to example.org:22 timed out after 30s");
    }
}
