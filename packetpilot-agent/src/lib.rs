//! PacketPilot Agent - daily per-interface traffic accounting
//!
//! This crate provides the accounting and reporting engine of the agent:
//! - Interface discovery (specific name or `any` wildcard)
//! - Raw counter delta accumulation with day rollover handling
//! - Crash-safe JSON persistence of the current day's usage
//! - Periodic report delivery with bounded retries
//! - Relay of server-issued commands to placeholder handlers

pub mod accounting;
pub mod clock;
pub mod commands;
pub mod config;
pub mod counters;
pub mod daemon;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod reporting;
pub mod repository;
pub mod usage;

pub use accounting::{AccountingEngine, UsageSnapshot};
pub use clock::{Clock, SystemClock};
pub use commands::{Command, CommandDispatcher, Dispatched};
pub use config::{AgentConfig, Settings};
pub use counters::{CounterReading, CounterSource, SysfsCounters};
pub use daemon::Daemon;
pub use error::{
    AgentError, ConfigError, CounterError, DiscoveryError, ReportError, RepositoryError,
};
pub use reporting::{ReportOutcome, ReporterSettings, ReportingEngine, ServerResponse, UsageReport};
pub use repository::{JsonFileRepository, UsageRepository};
pub use usage::{DailyUsage, InterfaceUsage};

/// Agent version reported in logs and by the `version` subcommand
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
