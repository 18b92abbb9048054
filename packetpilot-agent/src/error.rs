//! Error taxonomy of the agent
//!
//! Startup errors (`ConfigError`, `DiscoveryError`) are fatal. Everything
//! else is local to one interface, one tick or one report attempt and is
//! logged by the owning loop.

use std::path::PathBuf;

/// Invalid or unreadable configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid value for {key}: {value:?}")]
    InvalidOverride { key: String, value: String },
    #[error("invalid duration for {field}: {value:?} ({reason})")]
    InvalidDuration {
        field: &'static str,
        value: String,
        reason: String,
    },
    #[error("invalid log level: {0:?}")]
    InvalidLogLevel(String),
    #[error("{0}")]
    Invalid(&'static str),
    #[error("failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Interface discovery failures, fatal at startup
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("failed to enumerate network interfaces: {0}")]
    Enumerate(#[source] std::io::Error),
    #[error("interface {0} not found or no statistics available")]
    InterfaceUnavailable(String),
    #[error("no suitable network interfaces found")]
    NoInterfaces,
}

/// A single counter read failure
#[derive(Debug, thiserror::Error)]
pub enum CounterError {
    #[error("failed to read {counter} counter for {interface}: {source}")]
    Io {
        interface: String,
        counter: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid {counter} counter value for {interface}: {value:?}")]
    Parse {
        interface: String,
        counter: &'static str,
        value: String,
    },
}

/// Persistence failures of the daily usage document
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("no usage file at {0}")]
    NotFound(PathBuf),
    #[error("corrupt usage file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("usage file I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode usage: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Report delivery failures
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to marshal report: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("server returned status {0}")]
    Status(u16),
}

/// Top-level engine error returned by `Daemon::start`
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to discover interfaces: {0}")]
    Discovery(#[from] DiscoveryError),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
