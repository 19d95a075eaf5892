use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".upsync.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    Password,
    Key,
}

/// Persisted configuration of a single local → remote mirror.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    #[serde(default = "SyncConfig::default_local_dir")]
    pub local_dir: PathBuf,
    pub host: String,
    pub user: String,
    pub auth_type: AuthType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_path: Option<PathBuf>,
    pub remote_dir: String,
    /// Substring patterns; any path containing one of them is not synced.
    #[serde(default)]
    pub ignore: Vec<String>,
    /// Upload every existing file at startup instead of only future changes.
    #[serde(default)]
    pub initial_sync: bool,
    /// Allowed host key fingerprints (OpenSSH SHA256 form or base64 key).
    /// Absent means every host key is accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_fingerprints: Option<Vec<String>>,
    /// Initial backoff in ms before retrying a failed transfer (exponential)
    #[serde(default = "SyncConfig::default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "SyncConfig::default_retry_backoff_max_ms")]
    pub retry_backoff_max_ms: u64,
}

impl SyncConfig {
    fn default_local_dir() -> PathBuf {
        PathBuf::from(".")
    }
    fn default_retry_backoff_ms() -> u64 {
        500
    }
    fn default_retry_backoff_max_ms() -> u64 {
        30_000
    }

    /// Template written by `upsync init`.
    pub fn template() -> Self {
        Self {
            local_dir: Self::default_local_dir(),
            host: String::new(),
            user: String::new(),
            auth_type: AuthType::Password,
            password: None,
            private_key_path: None,
            remote_dir: String::new(),
            ignore: vec![".git".into(), CONFIG_FILE_NAME.into()],
            initial_sync: false,
            host_fingerprints: None,
            retry_backoff_ms: Self::default_retry_backoff_ms(),
            retry_backoff_max_ms: Self::default_retry_backoff_max_ms(),
        }
    }

    /// Load a config file. `.yaml`/`.yml` files are parsed as YAML, anything
    /// else as JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        match ext {
            "yaml" | "yml" => serde_yaml::from_str(&text).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }),
            _ => serde_json::from_str(&text).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }),
        }
    }

    /// Write the config as pretty JSON, readable by the owner only.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let data = serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        fs::write(path, data).map_err(write_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(write_err)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.local_dir.as_os_str().is_empty() {
            return Err(ConfigError::Missing("localDir"));
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::Missing("host"));
        }
        if self.user.trim().is_empty() {
            return Err(ConfigError::Missing("user"));
        }
        if self.remote_dir.trim().is_empty() {
            return Err(ConfigError::Missing("remoteDir"));
        }
        match self.auth_type {
            AuthType::Password if self.password.as_deref().unwrap_or("").is_empty() => {
                Err(ConfigError::Invalid(
                    "password is required when authType is 'password'".into(),
                ))
            }
            AuthType::Key
                if self
                    .private_key_path
                    .as_ref()
                    .map_or(true, |p| p.as_os_str().is_empty()) =>
            {
                Err(ConfigError::Invalid(
                    "privateKeyPath is required when authType is 'key'".into(),
                ))
            }
            _ => Ok(()),
        }
    }

    /// Validated credentials for the connection manager.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        self.validate()?;
        let auth = match self.auth_type {
            AuthType::Password => AuthMethod::Password(self.password.clone().unwrap_or_default()),
            AuthType::Key => AuthMethod::PrivateKey(self.private_key_path.clone().unwrap_or_default()),
        };
        Ok(Credentials {
            host: self.host.clone(),
            user: self.user.clone(),
            auth,
            remote_root: self.remote_dir.clone(),
            host_fingerprints: self.host_fingerprints.clone(),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial: Duration::from_millis(self.retry_backoff_ms),
            max: Duration::from_millis(self.retry_backoff_max_ms.max(self.retry_backoff_ms)),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum AuthMethod {
    Password(String),
    PrivateKey(PathBuf),
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::Password(_) => f.write_str("Password(<redacted>)"),
            AuthMethod::PrivateKey(p) => f.debug_tuple("PrivateKey").field(p).finish(),
        }
    }
}

/// Everything needed to open a transport session.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// `host` or `host:port`
    pub host: String,
    pub user: String,
    pub auth: AuthMethod,
    pub remote_root: String,
    pub host_fingerprints: Option<Vec<String>>,
}

/// Exponential backoff applied between attempts at the same intent.
///
/// There is no attempt limit: a transfer that keeps failing is retried
/// forever, only further apart. A zero `initial` retries immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    pub const IMMEDIATE: RetryPolicy = RetryPolicy {
        initial: Duration::ZERO,
        max: Duration::ZERO,
    };

    /// Delay before the next attempt, given how many attempts already failed.
    pub fn delay(&self, failed_attempts: u32) -> Duration {
        if failed_attempts == 0 || self.initial.is_zero() {
            return Duration::ZERO;
        }
        let shift = (failed_attempts - 1).min(16);
        self.initial.saturating_mul(1 << shift).min(self.max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(SyncConfig::default_retry_backoff_ms()),
            max: Duration::from_millis(SyncConfig::default_retry_backoff_max_ms()),
        }
    }
}
