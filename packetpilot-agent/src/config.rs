//! Configuration loading and validation
//!
//! Handles:
//! - Defaults for every setting
//! - YAML config file (explicit path, `PACKETPILOT_CONFIG`, or standard locations)
//! - `.env` files and `PACKETPILOT_<SECTION>_<KEY>` environment overrides
//! - Validation and parsing of interval strings

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::error::ConfigError;
use crate::repository::DEFAULT_USAGE_FILE;

const ENV_PREFIX: &str = "PACKETPILOT";
const CONFIG_ENV: &str = "PACKETPILOT_CONFIG";
const CONFIG_FILE_NAME: &str = "config.yaml";
const SYSTEM_DIR: &str = "/etc/packetpilot";
const USER_DIR: &str = ".packetpilot";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub monitor: MonitorConfig,
    pub reporter: ReporterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    pub api_key: String,
    pub device_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Log file written in addition to stdout
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Interface name, or `any` for every interface with counters
    pub interface: String,
    pub update_interval: String,
    pub buffer_size: usize,
    pub usage_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    pub report_interval: String,
    pub batch_size: usize,
    pub retry_attempts: u32,
    pub retry_delay: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
            use_tls: false,
            api_key: String::new(),
            device_id: default_device_id(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interface: "any".to_string(),
            update_interval: "5s".to_string(),
            buffer_size: 1000,
            usage_file: PathBuf::from(DEFAULT_USAGE_FILE),
        }
    }
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            report_interval: "30s".to_string(),
            batch_size: 100,
            retry_attempts: 3,
            retry_delay: "5s".to_string(),
        }
    }
}

/// Parsed intervals of a validated configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub update_interval: Duration,
    pub report_interval: Duration,
    pub retry_delay: Duration,
}

/// Machine id when available, hostname otherwise
fn default_device_id() -> String {
    if let Ok(id) = std::fs::read_to_string("/etc/machine-id") {
        let id = id.trim();
        if !id.is_empty() {
            return id.to_string();
        }
    }

    hostname::get()
        .ok()
        .map(|h| h.to_string_lossy().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "unknown-device".to_string())
}

impl AgentConfig {
    /// Load config from defaults, file and environment, then validate
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_env_files();

        let mut config = match Self::config_file_path(explicit) {
            Some(path) => Self::from_file(&path)?,
            None => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// `.env` files are optional; missing ones are skipped
    fn load_env_files() {
        dotenvy::dotenv().ok();
        dotenvy::from_path(Path::new(SYSTEM_DIR).join(".env")).ok();
        if let Some(home) = dirs::home_dir() {
            dotenvy::from_path(home.join(USER_DIR).join(".env")).ok();
        }
    }

    /// Config file to read, if any
    pub fn config_file_path(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        Self::search_paths().into_iter().find(|p| p.exists())
    }

    /// Standard config locations, highest priority first
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from(CONFIG_FILE_NAME),
            Path::new(SYSTEM_DIR).join(CONFIG_FILE_NAME),
        ];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(USER_DIR).join(CONFIG_FILE_NAME));
        }
        paths
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Apply `PACKETPILOT_<SECTION>_<KEY>` overrides found through `lookup`
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |section: &str, key: &str| {
            let name = format!("{}_{}_{}", ENV_PREFIX, section, key).to_uppercase();
            lookup(&name).map(|value| (name, value))
        };

        if let Some((_, v)) = var("server", "host") {
            self.server.host = v;
        }
        if let Some((k, v)) = var("server", "port") {
            self.server.port = parse_override(&k, &v)?;
        }
        if let Some((k, v)) = var("server", "use_tls") {
            self.server.use_tls = parse_bool(&k, &v)?;
        }
        if let Some((_, v)) = var("server", "api_key") {
            self.server.api_key = v;
        }
        if let Some((_, v)) = var("server", "device_id") {
            self.server.device_id = v;
        }
        if let Some((_, v)) = var("logging", "level") {
            self.logging.level = v;
        }
        if let Some((_, v)) = var("logging", "file") {
            self.logging.file = if v.is_empty() { None } else { Some(PathBuf::from(v)) };
        }
        if let Some((_, v)) = var("monitor", "interface") {
            self.monitor.interface = v;
        }
        if let Some((_, v)) = var("monitor", "update_interval") {
            self.monitor.update_interval = v;
        }
        if let Some((k, v)) = var("monitor", "buffer_size") {
            self.monitor.buffer_size = parse_override(&k, &v)?;
        }
        if let Some((_, v)) = var("monitor", "usage_file") {
            self.monitor.usage_file = PathBuf::from(v);
        }
        if let Some((_, v)) = var("reporter", "report_interval") {
            self.reporter.report_interval = v;
        }
        if let Some((k, v)) = var("reporter", "batch_size") {
            self.reporter.batch_size = parse_override(&k, &v)?;
        }
        if let Some((k, v)) = var("reporter", "retry_attempts") {
            self.reporter.retry_attempts = parse_override(&k, &v)?;
        }
        if let Some((_, v)) = var("reporter", "retry_delay") {
            self.reporter.retry_delay = v;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.settings().map(|_| ())
    }

    /// Validate the configuration and parse its intervals
    pub fn settings(&self) -> Result<Settings, ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Invalid("server host cannot be empty"));
        }
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server port must be between 1 and 65535"));
        }
        if self.server.device_id.trim().is_empty() {
            return Err(ConfigError::Invalid("device ID cannot be empty"));
        }
        if self.monitor.interface.trim().is_empty() {
            return Err(ConfigError::Invalid("monitor interface cannot be empty"));
        }
        if self.reporter.retry_attempts == 0 {
            return Err(ConfigError::Invalid("retry attempts must be at least 1"));
        }

        Ok(Settings {
            update_interval: parse_interval("monitor.update_interval", &self.monitor.update_interval)?,
            report_interval: parse_interval("reporter.report_interval", &self.reporter.report_interval)?,
            retry_delay: parse_duration("reporter.retry_delay", &self.reporter.retry_delay)?,
        })
    }
}

fn parse_override<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidOverride {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_duration(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value.trim()).map_err(|e| ConfigError::InvalidDuration {
        field,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Tick periods must be non-zero
fn parse_interval(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let duration = parse_duration(field, value)?;
    if duration.is_zero() {
        return Err(ConfigError::InvalidDuration {
            field,
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(duration)
}
