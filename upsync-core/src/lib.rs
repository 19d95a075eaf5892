//! Core library for upsync – one-way local → remote directory mirroring.

mod config;
mod connection;
mod engine;
mod error;
mod file_op;
mod filter;
mod queue;
mod remote;
mod transfer;
mod utils;
mod watcher;
mod worker;

pub use config::{AuthMethod, AuthType, Credentials, RetryPolicy, SyncConfig, CONFIG_FILE_NAME};
pub use connection::{ActiveSession, ConnectionManager, ConnectionState, CONNECT_TIMEOUT};
pub use engine::{EngineOptions, SyncEngine};
pub use error::{ConfigError, ConnectError, EngineError, TransferError, TransferStep, WatchError};
pub use file_op::{event_to_ops, FsEvent, IntentKind, SyncIntent};
pub use filter::IgnoreFilter;
pub use queue::{ChangeQueue, Pending, Ticket};
pub use remote::{Connector, RemoteWriter, TransportSession};
pub use transfer::upload;
pub use utils::{as_posix_path, remote_parent, remote_path};
pub use watcher::ChangeDetector;
pub use worker::{Iteration, TransferWorker, WorkerOptions};
