//! SFTP transport for upsync, built on russh.

mod ssh_client;
mod utils;

use crate::utils::{close_errors, create_dir_all, split_host_port};
use anyhow::Result;
use async_trait::async_trait;
use russh::client::{AuthResult, Handle};
use russh::keys::{HashAlg, PrivateKey, PrivateKeyWithHashAlg};
use russh::Disconnect;
use russh_sftp::client::SftpSession;
use ssh_client::Client;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use upsync_core::{AuthMethod, ConnectError, Connector, Credentials, RemoteWriter, TransportSession};

/// Opens SFTP sessions over SSH.
///
/// Host keys are accepted unless the credentials carry an allow-list of
/// fingerprints.
#[derive(Debug, Clone, Default)]
pub struct SftpConnector;

impl SftpConnector {
    pub fn new() -> Self {
        Self
    }
}

enum Auth<'a> {
    Password(&'a str),
    Key(PrivateKey),
}

#[async_trait]
impl Connector for SftpConnector {
    async fn connect(&self, creds: &Credentials) -> Result<Box<dyn TransportSession>, ConnectError> {
        let (host, port) = split_host_port(&creds.host)?;
        // Read the key before dialing so a bad key never reaches the server.
        let auth = match &creds.auth {
            AuthMethod::Password(password) => Auth::Password(password),
            AuthMethod::PrivateKey(path) => Auth::Key(load_key(path).await?),
        };

        let config = Arc::new(russh::client::Config::default());
        let client = Client {
            allowed_fingerprints: creds.host_fingerprints.clone().filter(|f| !f.is_empty()),
        };
        let mut handle = russh::client::connect(config, (host.as_str(), port), client)
            .await
            .map_err(|e| dial_error(&creds.host, e))?;

        let result = match auth {
            Auth::Password(password) => handle.authenticate_password(&creds.user, password).await,
            Auth::Key(key) => {
                let hash_alg: Option<HashAlg> = handle.best_supported_rsa_hash().await.ok().flatten().flatten();
                handle
                    .authenticate_publickey(&creds.user, PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg))
                    .await
            }
        };
        let auth_error = |reason: String| ConnectError::Auth {
            user: creds.user.clone(),
            host: creds.host.clone(),
            reason,
        };
        match result.map_err(|e| auth_error(e.to_string()))? {
            AuthResult::Success => {}
            AuthResult::Failure {
                remaining_methods,
                partial_success,
            } => {
                return Err(auth_error(format!(
                    "remaining_methods: {remaining_methods:?}, partial_success: {partial_success}"
                )));
            }
        }

        let sftp = match open_sftp(&handle).await {
            Ok(sftp) => sftp,
            Err(source) => {
                let _ = handle.disconnect(Disconnect::ByApplication, "", "en").await;
                return Err(ConnectError::Subsystem {
                    host: creds.host.clone(),
                    source,
                });
            }
        };
        info!(host = %host, port, user = %creds.user, "sftp session established");
        Ok(Box::new(SftpTransport {
            sftp,
            handle: Mutex::new(handle),
        }))
    }
}

async fn load_key(path: &Path) -> Result<PrivateKey, ConnectError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConnectError::KeyRead {
            path: path.to_path_buf(),
            source,
        })?;
    russh::keys::decode_secret_key(&text, None).map_err(|e| ConnectError::KeyParse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

async fn open_sftp(handle: &Handle<Client>) -> Result<SftpSession> {
    let channel = handle.channel_open_session().await?;
    channel.request_subsystem(true, "sftp").await?;
    let sftp = SftpSession::new(channel.into_stream()).await?;
    debug!("current path: {:?}", sftp.canonicalize(".").await.ok());
    Ok(sftp)
}

fn dial_error(host: &str, e: anyhow::Error) -> ConnectError {
    if matches!(e.downcast_ref::<russh::Error>(), Some(russh::Error::UnknownKey)) {
        return ConnectError::HostKeyRejected { host: host.to_string() };
    }
    ConnectError::Dial {
        host: host.to_string(),
        source: e,
    }
}

/// An SFTP session and the SSH connection carrying it.
pub struct SftpTransport {
    sftp: SftpSession,
    handle: Mutex<Handle<Client>>,
}

#[async_trait]
impl TransportSession for SftpTransport {
    async fn ensure_dir(&self, path: &str) -> Result<()> {
        create_dir_all(&self.sftp, path).await?;
        Ok(())
    }

    async fn create_file(&self, path: &str) -> Result<RemoteWriter> {
        let file = self.sftp.create(path).await?;
        Ok(Box::new(file))
    }

    async fn ping(&self) -> Result<()> {
        let _ = self.sftp.metadata(".").await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let sftp = self.sftp.close().await.map_err(anyhow::Error::from);
        let ssh = self
            .handle
            .lock()
            .await
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(anyhow::Error::from);
        close_errors([("SFTP session", sftp), ("SSH connection", ssh)])
    }
}
