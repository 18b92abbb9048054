//! Upstream reporting of the day's usage
//!
//! On its own tick the reporter takes a snapshot from the accounting engine,
//! builds a `UsageReport` and POSTs it to the collector, retrying a bounded
//! number of times with a fixed delay. Totals are never reset after a
//! successful send: the day keeps accumulating and the collector deduplicates
//! by date and timestamp.

use chrono::{DateTime, Utc};
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::accounting::UsageSnapshot;
use crate::clock::Clock;
use crate::commands::{Command, CommandDispatcher, Dispatched};
use crate::error::ReportError;
use crate::usage::{DailyUsage, BYTES_PER_MB};

/// Collector path receiving daily usage reports
pub const REPORT_PATH: &str = "/api/v1/traffic/report";

pub const USER_AGENT_VALUE: &str = "PacketPilot-Daemon/1.0";

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-interface entry of a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceUsageReport {
    pub interface: String,
    pub total_rx: u64,
    pub total_tx: u64,
    pub total_rx_mb: f64,
    pub total_tx_mb: f64,
}

/// Report document sent to the collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageReport {
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    /// YYYY-MM-DD
    pub date: String,
    /// Sorted by interface name
    pub interfaces: Vec<InterfaceUsageReport>,
    pub total_rx_mb: f64,
    pub total_tx_mb: f64,
}

impl UsageReport {
    pub fn build(device_id: &str, timestamp: DateTime<Utc>, usage: &DailyUsage) -> Self {
        // BTreeMap iteration is already ordered by interface name
        let interfaces = usage
            .interfaces
            .values()
            .map(|stats| InterfaceUsageReport {
                interface: stats.interface.clone(),
                total_rx: stats.total_rx,
                total_tx: stats.total_tx,
                total_rx_mb: stats.total_rx_mb(),
                total_tx_mb: stats.total_tx_mb(),
            })
            .collect();

        Self {
            device_id: device_id.to_string(),
            timestamp,
            date: usage.date.clone(),
            interfaces,
            total_rx_mb: usage.total_rx() as f64 / BYTES_PER_MB,
            total_tx_mb: usage.total_tx() as f64 / BYTES_PER_MB,
        }
    }
}

/// Collector reply to a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub commands: Vec<Command>,
}

/// `"commands": null` reads as no commands
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Command>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Command>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Result of one reporting tick
#[derive(Debug, Clone, PartialEq)]
pub enum ReportOutcome {
    /// No usage available yet
    Skipped,
    Delivered {
        attempts: u32,
        /// `None` when the collector's body could not be parsed
        response: Option<ServerResponse>,
        commands: Vec<Dispatched>,
    },
}

#[derive(Debug, Clone)]
pub struct ReporterSettings {
    /// Full report URL
    pub endpoint: String,
    pub api_key: String,
    pub device_id: String,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub request_timeout: Duration,
}

impl ReporterSettings {
    /// Report URL for a collector at `host:port`
    pub fn endpoint_url(host: &str, port: u16, use_tls: bool) -> String {
        let protocol = if use_tls { "https" } else { "http" };
        format!("{}://{}:{}{}", protocol, host, port, REPORT_PATH)
    }
}

pub struct ReportingEngine {
    client: reqwest::Client,
    settings: ReporterSettings,
    usage: Arc<dyn UsageSnapshot>,
    clock: Arc<dyn Clock>,
    dispatcher: CommandDispatcher,
}

impl ReportingEngine {
    pub fn new(
        settings: ReporterSettings,
        usage: Arc<dyn UsageSnapshot>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()?;

        Ok(Self {
            client,
            settings,
            usage,
            clock,
            dispatcher: CommandDispatcher::new(),
        })
    }

    pub fn settings(&self) -> &ReporterSettings {
        &self.settings
    }

    /// Snapshot, build, deliver and dispatch returned commands
    pub async fn send_report(&self) -> Result<ReportOutcome, ReportError> {
        let Some(usage) = self.usage.daily_usage() else {
            debug!("No daily usage data to report");
            return Ok(ReportOutcome::Skipped);
        };

        debug!(interfaces_count = usage.interfaces.len(), date = %usage.date, "Got daily usage data");

        let report = UsageReport::build(&self.settings.device_id, self.clock.now(), &usage);
        let body = serde_json::to_vec(&report).map_err(ReportError::Encode)?;

        let (attempts, response) = self.deliver(&report, &body).await?;

        let commands = match &response {
            Some(reply) => {
                info!(
                    message = %reply.message,
                    date = %report.date,
                    interfaces = report.interfaces.len(),
                    total_rx_mb = report.total_rx_mb,
                    total_tx_mb = report.total_tx_mb,
                    "Daily usage report sent successfully"
                );
                if reply.commands.is_empty() {
                    Vec::new()
                } else {
                    self.dispatcher.dispatch_all(&reply.commands)
                }
            }
            None => Vec::new(),
        };

        Ok(ReportOutcome::Delivered {
            attempts,
            response,
            commands,
        })
    }

    /// POST `body` until it is accepted or the attempt budget is spent
    async fn deliver(
        &self,
        report: &UsageReport,
        body: &[u8],
    ) -> Result<(u32, Option<ServerResponse>), ReportError> {
        let max_attempts = self.settings.retry_attempts.max(1);
        let mut attempt = 1;

        loop {
            debug!(
                attempt,
                url = %self.settings.endpoint,
                date = %report.date,
                interfaces = report.interfaces.len(),
                total_rx_mb = report.total_rx_mb,
                total_tx_mb = report.total_tx_mb,
                "Sending daily usage report"
            );

            match self.attempt(body).await {
                Ok(response) => return Ok((attempt, response)),
                Err(e) if attempt >= max_attempts => return Err(e),
                Err(e) => {
                    warn!(attempt, error = %e, "Report attempt failed");
                    tokio::time::sleep(self.settings.retry_delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// One request built from scratch. A 2xx with an unreadable body still
    /// counts as delivered.
    async fn attempt(&self, body: &[u8]) -> Result<Option<ServerResponse>, ReportError> {
        let response = self
            .client
            .post(&self.settings.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, USER_AGENT_VALUE)
            .bearer_auth(&self.settings.api_key)
            .body(body.to_vec())
            .send()
            .await
            .map_err(ReportError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Server returned error status");
            return Err(ReportError::Status(status.as_u16()));
        }

        let parsed = match response.text().await {
            Ok(text) => serde_json::from_str::<ServerResponse>(&text)
                .map_err(|e| warn!(error = %e, "Failed to parse server response"))
                .ok(),
            Err(e) => {
                warn!(error = %e, "Failed to read server response");
                None
            }
        };

        Ok(parsed)
    }

    /// Report every `period` until `cancel` fires
    pub async fn run(self: Arc<Self>, period: Duration, cancel: CancellationToken) {
        info!(server = %self.settings.endpoint, interval = ?period, "Starting daily usage reporter");

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.send_report().await {
                        error!(error = %e, "Failed to send report");
                    }
                }
            }
        }

        info!("Daily usage reporter stopped");
    }
}
