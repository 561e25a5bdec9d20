//! Configuration management for the peer control daemon.
//!
//! A single TOML file. On first run, if the file does not exist, defaults are
//! written to it. Seed lists for trusted peers and the blacklist are applied
//! once at startup; after that the RPC surface owns both sets.

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_RPC_ADDRESS: &str = "127.0.0.1:9545";

/// Get the platform-specific data directory
pub fn get_data_dir() -> PathBuf {
    if cfg!(windows) {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("peerctl")
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".peerctl")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub node: NodeConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    pub rpc: RpcConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    /// Empty means the platform default from [`get_data_dir`].
    #[serde(default)]
    pub data_dir: String,
}

impl NodeConfig {
    pub fn data_dir(&self) -> PathBuf {
        if self.data_dir.is_empty() {
            get_data_dir()
        } else {
            PathBuf::from(&self.data_dir)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Multiaddresses (`.../p2p/<peer id>`) trusted at startup
    #[serde(default)]
    pub trusted_peers: Vec<String>,
    /// IPs banned at startup
    #[serde(default)]
    pub blacklisted_ips: Vec<String>,
    /// Peer ids banned at startup
    #[serde(default)]
    pub blacklisted_ids: Vec<String>,
    /// Upper bound on the advisory disconnect when a peer loses trust
    #[serde(default = "default_disconnect_timeout_secs")]
    pub disconnect_timeout_secs: u64,
}

fn default_disconnect_timeout_secs() -> u64 {
    5
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            trusted_peers: vec![],
            blacklisted_ips: vec![],
            blacklisted_ids: vec![],
            disconnect_timeout_secs: default_disconnect_timeout_secs(),
        }
    }
}

impl NetworkConfig {
    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_secs(self.disconnect_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    pub enabled: bool,
    pub listen_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty" or "json"
    pub format: String,
    /// "stdout" or "file"
    pub output: String,
    /// Log file path when output = "file"; empty means `<data_dir>/logs/peerctld.log`
    #[serde(default)]
    pub file_path: String,
}

impl LoggingConfig {
    pub fn file_path(&self, data_dir: &Path) -> PathBuf {
        if self.file_path.is_empty() {
            data_dir.join("logs").join("peerctld.log")
        } else {
            PathBuf::from(&self.file_path)
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node: NodeConfig {
                name: "peerctld".to_string(),
                data_dir: String::new(),
            },
            network: NetworkConfig::default(),
            rpc: RpcConfig {
                enabled: true,
                listen_address: DEFAULT_RPC_ADDRESS.to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
                output: "stdout".to_string(),
                file_path: String::new(),
            },
        }
    }
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, or write the defaults there if it does not exist.
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load_from_file(path)
        } else {
            let config = Config::default();
            config.save_to_file(path)?;
            Ok(config)
        }
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), AppError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    fn validate(&self) -> Result<(), AppError> {
        match self.logging.format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(AppError::Config(format!(
                    "unknown logging.format '{}' (expected pretty or json)",
                    other
                )))
            }
        }
        match self.logging.output.as_str() {
            "stdout" | "file" => {}
            other => {
                return Err(AppError::Config(format!(
                    "unknown logging.output '{}' (expected stdout or file)",
                    other
                )))
            }
        }
        if self.network.disconnect_timeout_secs == 0 {
            return Err(AppError::Config(
                "network.disconnect_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
