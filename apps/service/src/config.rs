use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::checking::types::CheckConfig;
use crate::watchdog::WatchdogConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[source] std::io::Error),
    #[error("failed to write config file: {0}")]
    Write(#[source] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("no usable config directory (set XDG_CONFIG_HOME or HOME)")]
    ConfigPathUnavailable,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub checks: Checks,
    pub timing: Timing,
    pub watchdog: WatchdogSettings,
    pub logging: Logging,
    #[serde(rename = "endpoint")]
    pub endpoints: Vec<EndpointSeed>,
}

/// The four check switches plus the outbound client identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Checks {
    pub dns: bool,
    pub ssl: bool,
    pub http: bool,
    pub content: bool,
    pub user_agent: String,
}

impl Default for Checks {
    fn default() -> Self {
        let defaults = CheckConfig::default();
        Self {
            dns: defaults.check_dns,
            ssl: defaults.check_ssl,
            http: defaults.check_http,
            content: defaults.check_content,
            user_agent: defaults.user_agent,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub max_concurrent_checks: usize,
}

impl Default for Timing {
    fn default() -> Self {
        Self { poll_interval_secs: 300, request_timeout_secs: 10, max_concurrent_checks: 8 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogSettings {
    pub threshold_secs: u64,
    pub check_interval_secs: u64,
    pub ping_interval_secs: u64,
    pub max_recovery_attempts: u32,
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        let defaults = WatchdogConfig::default();
        Self {
            threshold_secs: defaults.threshold.as_secs(),
            check_interval_secs: defaults.check_interval.as_secs(),
            ping_interval_secs: defaults.ping_interval.as_secs(),
            max_recovery_attempts: defaults.max_recovery_attempts,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// Durable watchdog log, rotated by size.
    pub file: String,
    pub max_bytes: u64,
    pub backups: usize,
    /// Where the emergency snapshot lands on a forced shutdown.
    pub snapshot_file: String,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            file: "webwatch-watchdog.log".into(),
            max_bytes: 5 * 1024 * 1024,
            backups: 3,
            snapshot_file: "webwatch-snapshot.json".into(),
        }
    }
}

/// An endpoint declared in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointSeed {
    pub name: Option<String>,
    pub url: String,
    pub check_string: Option<String>,
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/webwatch/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Ok(home_dir) = env::var("HOME") {
        path::PathBuf::from(home_dir).join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("webwatch/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Current Internal Configuration State:")?;
        writeln!(f, "  Checks")?;
        writeln!(f, "    DNS: {}", self.checks.dns)?;
        writeln!(f, "    SSL: {}", self.checks.ssl)?;
        writeln!(f, "    HTTP: {}", self.checks.http)?;
        writeln!(f, "    Content: {}", self.checks.content)?;
        writeln!(f, "  Timing")?;
        writeln!(f, "    Poll Interval: {}s", self.timing.poll_interval_secs)?;
        writeln!(f, "    Request Timeout: {}s", self.timing.request_timeout_secs)?;
        writeln!(f, "  Endpoints: {}", self.endpoints.len())?;
        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/webwatch/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path).map_err(ConfigError::Read)?;
            Ok(toml::from_str(raw_string.as_str())?)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(ConfigError::Write)?;
            }
        }

        fs::write(path, config_str).map_err(ConfigError::Write)
    }

    /// Frozen snapshot handed to the check engine.
    pub fn check_config(&self) -> CheckConfig {
        CheckConfig {
            check_dns: self.checks.dns,
            check_ssl: self.checks.ssl,
            check_http: self.checks.http,
            check_content: self.checks.content,
            request_timeout: std::time::Duration::from_secs(self.timing.request_timeout_secs),
            user_agent: self.checks.user_agent.clone(),
        }
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timing.poll_interval_secs)
    }

    pub fn watchdog_config(&self) -> WatchdogConfig {
        WatchdogConfig {
            threshold: std::time::Duration::from_secs(self.watchdog.threshold_secs),
            check_interval: std::time::Duration::from_secs(self.watchdog.check_interval_secs),
            ping_interval: std::time::Duration::from_secs(self.watchdog.ping_interval_secs),
            max_recovery_attempts: self.watchdog.max_recovery_attempts,
        }
    }
}
