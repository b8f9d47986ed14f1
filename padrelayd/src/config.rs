use padrelay_common::{tracing, DEFAULT_PORT};
use serde::{Deserialize, Serialize};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tracing::debug;

use crate::cooldown::CooldownPolicy;
use crate::session::SessionSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Daemon configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub server: ServerSettings,
    pub macros: MacroSettings,
    pub session: SessionConfig,
    pub controller: ControllerSettings,
}

/// Listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_address: IpAddr,
    pub port: u16,
    pub backlog: u32,
    pub handshake_timeout_ms: u64,
    pub log_level: String,
}

/// Macro source settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacroSettings {
    pub directory: PathBuf,
}

/// Per-session queue and cooldown settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub queue_capacity: usize,
    pub poll_interval_ms: u64,
    pub cooldown_base_ms: u64,
    pub cooldown_increment_ms: u64,
    pub cooldown_max_ms: u64,
}

/// Virtual controller settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    pub device_name: String,
    pub uinput_path: PathBuf,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            backlog: 4,
            handshake_timeout_ms: 5000,
            log_level: "info".to_string(),
        }
    }
}

impl Default for MacroSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("macros"),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            poll_interval_ms: 10,
            cooldown_base_ms: 500,
            cooldown_increment_ms: 1000,
            cooldown_max_ms: 3000,
        }
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            device_name: "Barcode controller".to_string(),
            uinput_path: PathBuf::from("/dev/uinput"),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from `path`.
    ///
    /// Returns `Ok(None)` when the file does not exist so the caller can fall
    /// back to defaults. Missing keys take their default values.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Option<Self>, ConfigError> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let config = Self::parse(path, &content)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(Some(config))
    }

    fn parse(path: &Path, content: &str) -> Result<Self, ConfigError> {
        // An empty file deserializes to null, which means "all defaults"
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn listen_address(&self) -> SocketAddr {
        SocketAddr::new(self.server.bind_address, self.server.port)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.server.handshake_timeout_ms)
    }

    pub fn session_settings(&self) -> SessionSettings {
        let session = &self.session;
        SessionSettings {
            // A zero-capacity queue would drop every trigger
            queue_capacity: session.queue_capacity.max(1),
            poll_interval: Duration::from_millis(session.poll_interval_ms.max(1)),
            cooldown: CooldownPolicy::new(
                Duration::from_millis(session.cooldown_base_ms),
                Duration::from_millis(session.cooldown_increment_ms),
                Duration::from_millis(session.cooldown_max_ms),
            ),
        }
    }
}
