use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{DEFAULT_CONFIG_PATH, DISPLAY_SETUP_PROGRAM};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub staging_dir: PathBuf,
    pub bind_address: String,
    pub port: Option<u16>, // random in 10000..65000 when absent
    pub tunnel: bool,      // RPC server on loopback, reached through the tunnel
    pub tunnel_bind_address: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BringupConfig {
    pub program: String,
    pub sentinel_dir: PathBuf,
    pub port_poll_interval_ms: u64,
    pub resume_poll_interval_ms: u64,
    pub min_port_sentinel_len: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub registry_dir: PathBuf,
    pub retry_interval_ms: u64,
    pub client_attempts: u32,
    pub publish_attempts: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub download_dir: PathBuf,
    pub viewer: String,
    pub ping_count: u32,
    pub slow_link_threshold_ms: f64,
    pub use_usb_on_slow_link: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub bringup: BringupConfig,
    pub discovery: DiscoveryConfig,
    pub client: ClientConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            staging_dir: PathBuf::from("/tmp"),
            bind_address: String::from("0.0.0.0"),
            port: None,
            tunnel: false,
            tunnel_bind_address: String::from("127.0.0.1"),
        }
    }
}

impl Default for BringupConfig {
    fn default() -> Self {
        Self {
            program: String::from(DISPLAY_SETUP_PROGRAM),
            sentinel_dir: PathBuf::from("/tmp"),
            port_poll_interval_ms: 1000,
            resume_poll_interval_ms: 1,
            min_port_sentinel_len: 4,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            registry_dir: PathBuf::from("/tmp/kimberley-registry"),
            retry_interval_ms: 1000,
            client_attempts: 300,
            publish_attempts: 15,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: String::from("localhost"),
            download_dir: PathBuf::from("/tmp"),
            viewer: String::from("vncviewer"),
            ping_count: 10,
            slow_link_threshold_ms: 1000.0,
            use_usb_on_slow_link: false,
        }
    }
}

impl BringupConfig {
    pub fn port_poll_interval(&self) -> Duration {
        Duration::from_millis(self.port_poll_interval_ms)
    }

    pub fn resume_poll_interval(&self) -> Duration {
        Duration::from_millis(self.resume_poll_interval_ms)
    }
}

impl DiscoveryConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

impl Config {
    /// Loads the configuration from `path`, or from the default location
    /// when no path is given. A missing default file yields built-in
    /// defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::load_from_file(default_path)
                } else {
                    info!(
                        "No configuration at {}, using defaults",
                        default_path.display()
                    );
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;
        Self::from_toml(&config_str)
            .with_context(|| format!("Failed to parse configuration file: {}", path.display()))
    }

    pub fn from_toml(config_str: &str) -> Result<Self> {
        Ok(toml::from_str(config_str)?)
    }
}

// Helper function to log configuration options
pub fn log_config(config: &Config) {
    info!("  Staging Directory: {}", config.server.staging_dir.display());
    info!("  Bind Address: {}", config.server.bind_address);
    info!("  Tunnel Mode: {}", config.server.tunnel);
    info!("  Bring-up Program: {}", config.bringup.program);
    info!("  Sentinel Directory: {}", config.bringup.sentinel_dir.display());
    info!(
        "  Registry Directory: {}",
        config.discovery.registry_dir.display()
    );
}
