use crate::config::{Credentials, SyncConfig};
use crate::connection::{ConnectionManager, ConnectionState, CONNECT_TIMEOUT};
use crate::error::EngineError;
use crate::file_op::IntentKind;
use crate::filter::IgnoreFilter;
use crate::queue::ChangeQueue;
use crate::remote::Connector;
use crate::watcher::ChangeDetector;
use crate::worker::{TransferWorker, WorkerOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Everything the engine needs to run one local → remote mirror.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub local_root: PathBuf,
    pub credentials: Credentials,
    pub ignore: IgnoreFilter,
    /// Queue every existing file for upload at startup.
    pub initial_sync: bool,
    pub connect_timeout: Duration,
    pub worker: WorkerOptions,
}

impl EngineOptions {
    pub fn from_config(cfg: &SyncConfig) -> Result<Self, EngineError> {
        Ok(Self {
            local_root: cfg.local_dir.clone(),
            credentials: cfg.credentials()?,
            ignore: IgnoreFilter::new(&cfg.ignore),
            initial_sync: cfg.initial_sync,
            connect_timeout: CONNECT_TIMEOUT,
            worker: WorkerOptions {
                retry: cfg.retry_policy(),
                ..WorkerOptions::default()
            },
        })
    }
}

/// A running synchronization engine: one change detector task and one
/// transfer worker task sharing a change queue.
pub struct SyncEngine {
    local_root: PathBuf,
    queue: Arc<ChangeQueue>,
    connection: Arc<ConnectionManager>,
    cancel: CancellationToken,
    detector: JoinHandle<()>,
    worker: JoinHandle<()>,
}

impl SyncEngine {
    pub async fn start(cfg: &SyncConfig, connector: Arc<dyn Connector>) -> Result<Self, EngineError> {
        Self::start_with(EngineOptions::from_config(cfg)?, connector).await
    }

    /// Register the watch set, attempt a first connection and spawn both
    /// background loops. Only watch setup failures are fatal; a failed first
    /// connection is left to the worker to retry.
    pub async fn start_with(opts: EngineOptions, connector: Arc<dyn Connector>) -> Result<Self, EngineError> {
        let queue = Arc::new(ChangeQueue::new());
        let detector = ChangeDetector::start(&opts.local_root, opts.ignore, Arc::clone(&queue), opts.initial_sync)?;
        let local_root = detector.root().to_path_buf();

        let connection = Arc::new(ConnectionManager::with_timeout(connector, opts.connect_timeout));
        // After a failed first dial the worker waits a reconnect interval
        // before trying again.
        let worker_delay = match connection.connect(&opts.credentials).await {
            Ok(_) => Duration::ZERO,
            Err(e) => {
                warn!("initial connection failed: {e}; will keep retrying");
                opts.worker.reconnect_interval
            }
        };

        let cancel = CancellationToken::new();
        let worker = TransferWorker::new(
            Arc::clone(&queue),
            Arc::clone(&connection),
            opts.credentials,
            local_root.clone(),
            opts.worker,
        );
        let detector = tokio::spawn(detector.run(cancel.child_token()));
        let worker = tokio::spawn(worker.run_after(worker_delay, cancel.child_token()));

        Ok(Self {
            local_root,
            queue,
            connection,
            cancel,
            detector,
            worker,
        })
    }

    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    /// Paths waiting for upload, oldest first.
    pub fn uploads(&self) -> Vec<PathBuf> {
        self.queue.snapshot(IntentKind::Upload)
    }

    /// Paths recorded as deleted locally, oldest first. Remote deletion is not
    /// performed, so these are informational.
    pub fn deletes(&self) -> Vec<PathBuf> {
        self.queue.snapshot(IntentKind::Delete)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Stop both loops and close the connection. A transfer in progress is
    /// allowed to finish first.
    pub async fn shutdown(self) -> Result<(), EngineError> {
        info!("shutting down");
        self.cancel.cancel();
        self.detector.await?;
        self.worker.await?;
        self.connection.close().await?;
        Ok(())
    }
}
