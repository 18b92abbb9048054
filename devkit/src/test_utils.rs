/*!
Test harness for the PacketPilot agent

Wires the engines the way the daemon does, but over:
- a scripted counter source
- a settable clock
- a usage file inside a temporary directory
*/

use packetpilot_agent::reporting::DEFAULT_REQUEST_TIMEOUT;
use packetpilot_agent::{
    AccountingEngine, AgentConfig, AgentError, Daemon, JsonFileRepository, ReporterSettings,
    ReportingEngine,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use crate::clock::FixedClock;
use crate::counters_stub::ScriptedCounters;

pub const TEST_DEVICE_ID: &str = "test-device";
pub const TEST_API_KEY: &str = "test-api-key";

pub struct TestHarness {
    pub counters: Arc<ScriptedCounters>,
    pub clock: Arc<FixedClock>,
    pub repository: Arc<JsonFileRepository>,
    _dir: TempDir,
}

impl TestHarness {
    /// Harness on `date` with no interfaces yet
    pub fn new(date: &str) -> anyhow::Result<Self> {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init()
            .ok();

        let dir = tempfile::tempdir()?;
        let repository = Arc::new(JsonFileRepository::new(dir.path().join("daily_usage.json")));

        Ok(Self {
            counters: Arc::new(ScriptedCounters::new()),
            clock: Arc::new(FixedClock::on(date)),
            repository,
            _dir: dir,
        })
    }

    pub fn usage_file(&self) -> PathBuf {
        self.repository.path().to_path_buf()
    }

    /// Accounting engine sharing this harness' collaborators
    pub fn engine(&self) -> Arc<AccountingEngine> {
        Arc::new(AccountingEngine::new(
            self.counters.clone(),
            self.repository.clone(),
            self.clock.clone(),
        ))
    }

    /// Reporter for `engine` posting to `endpoint` without retry delay
    pub fn reporter(
        &self,
        engine: &Arc<AccountingEngine>,
        endpoint: String,
        retry_attempts: u32,
    ) -> anyhow::Result<ReportingEngine> {
        let settings = ReporterSettings {
            endpoint,
            api_key: TEST_API_KEY.to_string(),
            device_id: TEST_DEVICE_ID.to_string(),
            retry_attempts,
            retry_delay: Duration::ZERO,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        };
        Ok(ReportingEngine::new(settings, engine.clone(), self.clock.clone())?)
    }

    /// Config pointing at `collector` with the usage file in the temp dir
    pub fn config(&self, interface: &str, collector: SocketAddr) -> AgentConfig {
        let mut config = AgentConfig::default();
        config.server.host = collector.ip().to_string();
        config.server.port = collector.port();
        config.server.use_tls = false;
        config.server.api_key = TEST_API_KEY.to_string();
        config.server.device_id = TEST_DEVICE_ID.to_string();
        config.monitor.interface = interface.to_string();
        config.monitor.usage_file = self.usage_file();
        config.monitor.update_interval = "1s".to_string();
        config.reporter.report_interval = "2s".to_string();
        config.reporter.retry_delay = "1s".to_string();
        config
    }

    /// Daemon over this harness' collaborators
    pub fn daemon(&self, config: AgentConfig) -> Result<Daemon, AgentError> {
        Daemon::with_components(
            config,
            self.counters.clone(),
            self.repository.clone(),
            self.clock.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packetpilot_agent::UsageSnapshot;

    #[test]
    fn test_harness_engine() {
        let harness = TestHarness::new("2024-05-01").unwrap();
        harness.counters.set("eth0", 1000, 2000);

        let engine = harness.engine();
        engine.initialize("eth0").unwrap();

        let usage = engine.daily_usage().unwrap();
        assert_eq!(usage.date, "2024-05-01");
        assert_eq!(usage.interfaces["eth0"].last_rx, 1000);
        assert!(harness.usage_file().exists());
    }
}
