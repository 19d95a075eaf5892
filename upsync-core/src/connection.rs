//! Transport session lifecycle.

use crate::config::Credentials;
use crate::error::ConnectError;
use crate::remote::{Connector, TransportSession};
use anyhow::anyhow;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Upper bound on establishing a session, handshake and authentication included.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        })
    }
}

/// An established session together with the remote root it serves.
#[derive(Clone)]
pub struct ActiveSession {
    session: Arc<dyn TransportSession>,
    remote_root: String,
}

impl ActiveSession {
    pub fn session(&self) -> &dyn TransportSession {
        self.session.as_ref()
    }

    pub fn remote_root(&self) -> &str {
        &self.remote_root
    }
}

impl fmt::Debug for ActiveSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveSession")
            .field("remote_root", &self.remote_root)
            .finish_non_exhaustive()
    }
}

enum Connection {
    Disconnected,
    Connecting,
    Connected(ActiveSession),
}

/// Owns the single connection of an engine.
///
/// The state lock is never held across an await point.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    timeout: Duration,
    state: Mutex<Connection>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self::with_timeout(connector, CONNECT_TIMEOUT)
    }

    pub fn with_timeout(connector: Arc<dyn Connector>, timeout: Duration) -> Self {
        Self {
            connector,
            timeout,
            state: Mutex::new(Connection::Disconnected),
        }
    }

    pub fn state(&self) -> ConnectionState {
        match &*self.state.lock() {
            Connection::Disconnected => ConnectionState::Disconnected,
            Connection::Connecting => ConnectionState::Connecting,
            Connection::Connected(_) => ConnectionState::Connected,
        }
    }

    /// Establish a session. An existing session is closed first.
    pub async fn connect(&self, credentials: &Credentials) -> Result<ActiveSession, ConnectError> {
        let previous = std::mem::replace(&mut *self.state.lock(), Connection::Connecting);
        if let Connection::Connected(old) = previous {
            if let Err(e) = self.close_session(&old).await {
                warn!("closing previous session: {e}");
            }
        }

        info!(host = %credentials.host, user = %credentials.user, "connecting");
        let result = match tokio::time::timeout(self.timeout, self.connector.connect(credentials)).await {
            Ok(result) => result,
            Err(_) => Err(ConnectError::Timeout {
                host: credentials.host.clone(),
                timeout: self.timeout,
            }),
        };

        match result {
            Ok(session) => {
                let active = ActiveSession {
                    session: Arc::from(session),
                    remote_root: credentials.remote_root.clone(),
                };
                *self.state.lock() = Connection::Connected(active.clone());
                info!(host = %credentials.host, remote_root = %credentials.remote_root, "connected");
                Ok(active)
            }
            Err(e) => {
                *self.state.lock() = Connection::Disconnected;
                Err(e)
            }
        }
    }

    /// The current session, or `NotConnected`. Never reconnects.
    pub fn ensure_connected(&self) -> Result<ActiveSession, ConnectError> {
        match &*self.state.lock() {
            Connection::Connected(active) => Ok(active.clone()),
            _ => Err(ConnectError::NotConnected),
        }
    }

    /// Release the current session. A no-op when not connected.
    pub async fn close(&self) -> Result<(), ConnectError> {
        let active = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, Connection::Disconnected) {
                Connection::Connected(active) => active,
                other => {
                    *state = other;
                    return Ok(());
                }
            }
        };
        info!("closing connection");
        self.close_session(&active).await
    }

    /// Close a session, bounded by the connect timeout.
    async fn close_session(&self, active: &ActiveSession) -> Result<(), ConnectError> {
        match tokio::time::timeout(self.timeout, active.session.close()).await {
            Ok(result) => result.map_err(ConnectError::Close),
            Err(_) => Err(ConnectError::Close(anyhow!(
                "close did not finish within {}s",
                self.timeout.as_secs_f32()
            ))),
        }
    }
}
