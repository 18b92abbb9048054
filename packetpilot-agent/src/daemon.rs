//! Daemon wiring
//!
//! Builds the accounting and reporting engines from a validated
//! configuration and runs both periodic tasks until cancellation.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::accounting::{AccountingEngine, UsageSnapshot};
use crate::clock::{Clock, SystemClock};
use crate::config::{AgentConfig, Settings};
use crate::counters::{CounterSource, SysfsCounters};
use crate::error::{AgentError, RepositoryError};
use crate::reporting::{ReporterSettings, ReportingEngine, DEFAULT_REQUEST_TIMEOUT};
use crate::repository::{JsonFileRepository, UsageRepository};
use crate::usage::DailyUsage;

pub struct Daemon {
    config: AgentConfig,
    settings: Settings,
    accounting: Arc<AccountingEngine>,
    reporter: Arc<ReportingEngine>,
}

impl Daemon {
    /// Daemon reading sysfs counters and persisting to the configured usage file
    pub fn new(config: AgentConfig) -> Result<Self, AgentError> {
        let repository = Arc::new(JsonFileRepository::new(config.monitor.usage_file.clone()));
        Self::with_components(
            config,
            Arc::new(SysfsCounters::new()),
            repository,
            Arc::new(SystemClock),
        )
    }

    /// Daemon over explicit collaborators
    pub fn with_components(
        config: AgentConfig,
        source: Arc<dyn CounterSource>,
        repository: Arc<dyn UsageRepository>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AgentError> {
        let settings = config.settings()?;

        let accounting = Arc::new(AccountingEngine::new(source, repository, clock.clone()));

        let reporter_settings = ReporterSettings {
            endpoint: ReporterSettings::endpoint_url(
                &config.server.host,
                config.server.port,
                config.server.use_tls,
            ),
            api_key: config.server.api_key.clone(),
            device_id: config.server.device_id.clone(),
            retry_attempts: config.reporter.retry_attempts,
            retry_delay: settings.retry_delay,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        };
        let reporter = ReportingEngine::new(reporter_settings, accounting.clone(), clock)
            .map_err(AgentError::HttpClient)?;

        Ok(Self {
            config,
            settings,
            accounting,
            reporter: Arc::new(reporter),
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    pub fn accounting(&self) -> &Arc<AccountingEngine> {
        &self.accounting
    }

    pub fn reporter(&self) -> &Arc<ReportingEngine> {
        &self.reporter
    }

    /// Run until `cancel` fires.
    ///
    /// Discovery and the initial load happen before any task starts; a
    /// discovery failure is returned without spawning anything.
    pub async fn start(&self, cancel: CancellationToken) -> Result<(), AgentError> {
        info!(interface = %self.config.monitor.interface, "Starting PacketPilot daemon components");

        self.accounting.initialize(&self.config.monitor.interface)?;

        let monitor = tokio::spawn(
            self.accounting
                .clone()
                .run(self.settings.update_interval, cancel.clone()),
        );
        let reporter = tokio::spawn(
            self.reporter
                .clone()
                .run(self.settings.report_interval, cancel.clone()),
        );

        cancel.cancelled().await;
        info!("Shutting down daemon components");

        let (monitor, reporter) = tokio::join!(monitor, reporter);
        monitor?;
        reporter?;
        Ok(())
    }

    /// Copy of the current day's usage
    pub fn daily_usage(&self) -> Option<DailyUsage> {
        self.accounting.daily_usage()
    }

    /// Manually zero today's totals
    pub fn reset_stats(&self) -> Result<(), RepositoryError> {
        self.accounting.reset_stats()
    }
}
