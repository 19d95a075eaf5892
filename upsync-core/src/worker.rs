//! Background loop draining the upload partition of the change queue.

use crate::config::{Credentials, RetryPolicy};
use crate::connection::ConnectionManager;
use crate::file_op::IntentKind;
use crate::queue::ChangeQueue;
use crate::transfer::upload;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Wait after a failed connection attempt.
    pub reconnect_interval: Duration,
    /// Wait when there is nothing to upload.
    pub idle_interval: Duration,
    /// Wait between attempts at the same intent.
    pub retry: RetryPolicy,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::from_secs(5),
            idle_interval: Duration::from_millis(500),
            retry: RetryPolicy::default(),
        }
    }
}

/// Outcome of a single worker iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Iteration {
    /// No session could be established.
    Disconnected,
    /// The upload partition was empty.
    Idle,
    Uploaded { path: PathBuf, bytes: u64 },
    /// The local file vanished before upload; the intent was discarded
    /// rather than retried like other `local-open` failures.
    Vanished { path: PathBuf },
    /// The transfer failed and the intent stays at the front of the queue.
    Failed { path: PathBuf, attempts: u32 },
}

pub struct TransferWorker {
    queue: Arc<ChangeQueue>,
    connection: Arc<ConnectionManager>,
    credentials: Credentials,
    local_root: PathBuf,
    options: WorkerOptions,
}

impl TransferWorker {
    pub fn new(
        queue: Arc<ChangeQueue>,
        connection: Arc<ConnectionManager>,
        credentials: Credentials,
        local_root: PathBuf,
        options: WorkerOptions,
    ) -> Self {
        Self {
            queue,
            connection,
            credentials,
            local_root,
            options,
        }
    }

    /// Run until cancelled. Cancellation is observed between iterations and
    /// during every wait, not in the middle of a transfer.
    pub async fn run(self, cancel: CancellationToken) {
        self.run_after(Duration::ZERO, cancel).await
    }

    /// Like [`TransferWorker::run`], but wait `delay` before the first
    /// iteration.
    pub async fn run_after(self, delay: Duration, cancel: CancellationToken) {
        if !delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        info!("transfer worker started");
        while !cancel.is_cancelled() {
            let outcome = self.run_once().await;
            let pause = self.pause_after(&outcome);
            if pause.is_zero() {
                continue;
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }
        debug!("transfer worker stopped");
    }

    /// Ensure connectivity, then attempt the oldest pending upload.
    ///
    /// When disconnected this dials right away; the reconnect interval is
    /// only waited after a failed attempt.
    pub async fn run_once(&self) -> Iteration {
        let active = match self.connection.ensure_connected() {
            Ok(active) => active,
            Err(_) => match self.connection.connect(&self.credentials).await {
                Ok(active) => active,
                Err(e) => {
                    warn!(
                        "connection failed: {e}; retrying in {:?}",
                        self.options.reconnect_interval
                    );
                    return Iteration::Disconnected;
                }
            },
        };

        let Some(pending) = self.queue.peek_oldest(IntentKind::Upload) else {
            return Iteration::Idle;
        };
        let path = pending.intent.path;

        match upload(&active, &self.local_root, &path).await {
            Ok(bytes) => {
                self.queue.remove_oldest(IntentKind::Upload, pending.ticket);
                info!("uploaded {} ({bytes} bytes)", path.display());
                Iteration::Uploaded { path, bytes }
            }
            Err(e) if e.is_local_not_found() => {
                self.queue.remove_oldest(IntentKind::Upload, pending.ticket);
                info!("skipping {}: no longer exists locally", path.display());
                Iteration::Vanished { path }
            }
            Err(e) => {
                self.queue.record_failure(IntentKind::Upload, pending.ticket);
                let attempts = pending.attempts.saturating_add(1);
                warn!(attempt = attempts, "upload failed: {e}");
                if e.step.is_remote() {
                    if let Err(ping) = active.session().ping().await {
                        warn!("session lost ({ping}); reconnecting");
                        if let Err(e) = self.connection.close().await {
                            debug!("close after lost session: {e}");
                        }
                    }
                }
                Iteration::Failed { path, attempts }
            }
        }
    }

    fn pause_after(&self, outcome: &Iteration) -> Duration {
        match outcome {
            Iteration::Disconnected => self.options.reconnect_interval,
            Iteration::Idle => self.options.idle_interval,
            Iteration::Failed { attempts, .. } => self.options.retry.delay(*attempts),
            Iteration::Uploaded { .. } | Iteration::Vanished { .. } => Duration::ZERO,
        }
    }
}
