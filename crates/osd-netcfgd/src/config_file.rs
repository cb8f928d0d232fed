//! Configuration file support for netcfgd
//!
//! Loads the daemon configuration from TOML files.
//! Default location: /etc/osd/netcfgd.toml
//!
//! The declarative network configuration itself is a separate YAML or JSON
//! document, loaded with [`load_network_config`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{NetcfgError, NetcfgResult, ValidationError};
use crate::types::NetworkConfig;

/// Default daemon configuration path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/osd/netcfgd.toml";

/// Filesystem locations written by the applier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory regenerated with systemd-networkd units on every apply
    #[serde(default = "default_network_dir")]
    pub network_dir: PathBuf,

    /// systemd-timesyncd drop-in holding the fallback NTP servers
    #[serde(default = "default_timesync_file")]
    pub timesync_file: PathBuf,

    /// Environment file exporting the proxy variables
    #[serde(default = "default_proxy_env_file")]
    pub proxy_env_file: PathBuf,
}

/// Apply and polling time limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// Overall apply budget in seconds, shared with the online wait
    #[serde(default = "default_apply_timeout")]
    pub apply_timeout_secs: u64,

    /// Interface rename wait in seconds
    #[serde(default = "default_rename_timeout")]
    pub rename_timeout_secs: u64,

    /// Delay between two convergence probes in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

/// systemd units restarted after the units are written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default = "default_network_unit")]
    pub network_unit: String,

    #[serde(default = "default_timesync_unit")]
    pub timesync_unit: String,
}

/// Applications started once the network is up
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationsConfig {
    #[serde(default)]
    pub enabled: Vec<String>,
}

/// Complete netcfgd configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    #[serde(default)]
    pub services: ServicesConfig,

    #[serde(default)]
    pub applications: ApplicationsConfig,
}

// Default functions
fn default_network_dir() -> PathBuf {
    PathBuf::from("/run/systemd/network")
}

fn default_timesync_file() -> PathBuf {
    PathBuf::from("/run/systemd/timesyncd.conf.d/osd.conf")
}

fn default_proxy_env_file() -> PathBuf {
    PathBuf::from("/run/osd/proxy.env")
}

fn default_apply_timeout() -> u64 {
    30
}

fn default_rename_timeout() -> u64 {
    5
}

fn default_poll_interval() -> u64 {
    500
}

fn default_network_unit() -> String {
    "systemd-networkd".to_string()
}

fn default_timesync_unit() -> String {
    "systemd-timesyncd".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            network_dir: default_network_dir(),
            timesync_file: default_timesync_file(),
            proxy_env_file: default_proxy_env_file(),
        }
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            apply_timeout_secs: default_apply_timeout(),
            rename_timeout_secs: default_rename_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            network_unit: default_network_unit(),
            timesync_unit: default_timesync_unit(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> NetcfgResult<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => {
                let config: Self = toml::from_str(&content).map_err(|e| {
                    NetcfgError::Configuration(format!(
                        "Failed to parse config file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                config.validate()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(NetcfgError::Configuration(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Load from default location or defaults
    pub fn load() -> NetcfgResult<Self> {
        Self::load_or_default(DEFAULT_CONFIG_PATH)
    }

    pub fn apply_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.apply_timeout_secs)
    }

    pub fn rename_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.rename_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.timeouts.poll_interval_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> NetcfgResult<()> {
        if self.timeouts.poll_interval_ms == 0 {
            return Err(NetcfgError::Configuration(
                "poll_interval_ms must be > 0".to_string(),
            ));
        }

        if self.services.network_unit.is_empty() || self.services.timesync_unit.is_empty() {
            return Err(NetcfgError::Configuration(
                "service unit names cannot be empty".to_string(),
            ));
        }

        if self.paths.network_dir.as_os_str().is_empty() {
            return Err(NetcfgError::Configuration(
                "network_dir cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Loads a declarative network configuration.
///
/// `.json` files are parsed as JSON, anything else as YAML. An empty
/// document is rejected as [`ValidationError::Missing`].
pub fn load_network_config(path: impl AsRef<Path>) -> NetcfgResult<NetworkConfig> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        NetcfgError::Configuration(format!(
            "Failed to read network config {}: {}",
            path.display(),
            e
        ))
    })?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    parse_network_config(&content, is_json).map_err(|e| match e {
        NetcfgError::Configuration(msg) => {
            NetcfgError::Configuration(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })
}

/// Parses a declarative network configuration from text.
pub fn parse_network_config(content: &str, json: bool) -> NetcfgResult<NetworkConfig> {
    let trimmed = content.trim();
    if trimmed.is_empty() || trimmed == "null" || trimmed == "~" {
        return Err(ValidationError::Missing.into());
    }

    if json {
        serde_json::from_str(content).map_err(|e| NetcfgError::Configuration(e.to_string()))
    } else {
        serde_yaml::from_str(content).map_err(|e| NetcfgError::Configuration(e.to_string()))
    }
}
