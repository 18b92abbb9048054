//! Daily usage accounting engine
//!
//! Holds the authoritative `DailyUsage` of the running day behind a single
//! read/write lock:
//! - startup: discovery, then load or fresh initialization from live counters
//! - per tick: rollover check, per-interface delta accumulation, persistence
//! - readers get deep copies, never references into the locked state
//!
//! Interfaces present in a loaded snapshot but no longer discovered are kept
//! as-is for the rest of the day and are not read anymore.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::counters::CounterSource;
use crate::discovery;
use crate::error::{DiscoveryError, RepositoryError};
use crate::repository::UsageRepository;
use crate::usage::{DailyUsage, InterfaceUsage, BYTES_PER_MB};

/// Read side of the accounting state
pub trait UsageSnapshot: Send + Sync {
    /// Deep copy of the current day's usage, `None` before initialization
    fn daily_usage(&self) -> Option<DailyUsage>;
}

struct Ledger {
    interfaces: Vec<String>,
    usage: DailyUsage,
}

pub struct AccountingEngine {
    state: RwLock<Option<Ledger>>,
    source: Arc<dyn CounterSource>,
    repository: Arc<dyn UsageRepository>,
    clock: Arc<dyn Clock>,
}

impl AccountingEngine {
    pub fn new(
        source: Arc<dyn CounterSource>,
        repository: Arc<dyn UsageRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            state: RwLock::new(None),
            source,
            repository,
            clock,
        }
    }

    /// Discover interfaces for `selector`, then load or build today's usage.
    ///
    /// Discovery runs first because loading needs the interface set to heal
    /// snapshots missing newly discovered interfaces.
    pub fn initialize(&self, selector: &str) -> Result<Vec<String>, DiscoveryError> {
        let interfaces = discovery::discover(selector, self.source.as_ref())?;
        self.initialize_with(interfaces.clone());
        Ok(interfaces)
    }

    /// Load or build today's usage for an already discovered interface set
    pub fn initialize_with(&self, interfaces: Vec<String>) {
        let usage = self.load_or_init(&interfaces);
        *self.state.write() = Some(Ledger { interfaces, usage });
    }

    pub fn is_initialized(&self) -> bool {
        self.state.read().is_some()
    }

    /// Interfaces this engine reads on every tick
    pub fn interfaces(&self) -> Vec<String> {
        self.state
            .read()
            .as_ref()
            .map(|ledger| ledger.interfaces.clone())
            .unwrap_or_default()
    }

    fn load_or_init(&self, interfaces: &[String]) -> DailyUsage {
        let today = self.clock.today();

        let mut usage = match self.repository.load() {
            Ok(usage) if usage.is_for(&today) => usage,
            Ok(stale) => {
                info!(old_date = %stale.date, new_date = %today, "New day detected, resetting daily usage");
                return self.init_daily_usage(interfaces, today);
            }
            Err(RepositoryError::NotFound(path)) => {
                info!(path = %path.display(), "No saved daily usage, starting fresh");
                return self.init_daily_usage(interfaces, today);
            }
            Err(e) => {
                warn!(error = %e, "Failed to load daily usage, starting fresh");
                return self.init_daily_usage(interfaces, today);
            }
        };

        let missing: Vec<String> = usage.missing(interfaces).into_iter().cloned().collect();
        if !missing.is_empty() {
            info!(interfaces = ?missing, "Found new interfaces, initializing them");
            for iface in &missing {
                self.seed_interface(&mut usage, iface);
            }
            self.persist(&usage);
        }

        for (iface, stats) in &usage.interfaces {
            info!(
                interface = %iface,
                date = %usage.date,
                total_rx_mb = stats.total_rx_mb(),
                total_tx_mb = stats.total_tx_mb(),
                "Loaded daily usage for interface"
            );
        }

        usage
    }

    fn init_daily_usage(&self, interfaces: &[String], today: String) -> DailyUsage {
        let usage = self.seed_all(interfaces, today);
        self.persist(&usage);
        info!(date = %usage.date, interfaces = ?interfaces, "Initialized daily usage for all interfaces");
        usage
    }

    fn seed_all(&self, interfaces: &[String], today: String) -> DailyUsage {
        let mut usage = DailyUsage::new(today);
        for iface in interfaces {
            self.seed_interface(&mut usage, iface);
        }
        usage
    }

    /// Baseline `iface` on its live counters with zero totals.
    ///
    /// On a failed read the interface stays out of the snapshot and the next
    /// tick tries again; a zero baseline would credit the whole raw counter.
    fn seed_interface(&self, usage: &mut DailyUsage, iface: &str) {
        match self.source.read(iface) {
            Ok(reading) => {
                info!(interface = %iface, last_rx = reading.rx, last_tx = reading.tx, "Initialized interface usage");
                usage.insert(InterfaceUsage::seeded(iface, reading));
            }
            Err(e) => {
                warn!(interface = %iface, error = %e, "Failed to read interface counters, deferring initialization");
            }
        }
    }

    fn update_interface(&self, stats: &mut InterfaceUsage) {
        let reading = match self.source.read(&stats.interface) {
            Ok(reading) => reading,
            Err(e) => {
                warn!(interface = %stats.interface, error = %e, "Failed to read interface counters");
                return;
            }
        };

        if reading.rx < stats.last_rx || reading.tx < stats.last_tx {
            info!(
                interface = %stats.interface,
                last_rx = stats.last_rx,
                raw_rx = reading.rx,
                last_tx = stats.last_tx,
                raw_tx = reading.tx,
                "Interface counters went backwards, treating as counter reset"
            );
        }

        let delta = stats.apply(reading);
        debug!(
            interface = %stats.interface,
            delta_rx_kb = delta.rx as f64 / 1024.0,
            delta_tx_kb = delta.tx as f64 / 1024.0,
            total_rx_mb = stats.total_rx as f64 / BYTES_PER_MB,
            total_tx_mb = stats.total_tx as f64 / BYTES_PER_MB,
            "Interface usage updated"
        );
    }

    fn persist(&self, usage: &DailyUsage) {
        if let Err(e) = self.repository.save(usage) {
            warn!(error = %e, "Failed to save daily usage");
        }
    }

    /// One accounting pass over every monitored interface.
    ///
    /// The write lock is held for the whole pass including persistence, so
    /// readers observe either none or all of this tick's updates.
    pub fn tick(&self) {
        let mut guard = self.state.write();
        let Some(Ledger { interfaces, usage }) = guard.as_mut() else {
            return;
        };

        let today = self.clock.today();
        if !usage.is_for(&today) {
            info!(old_date = %usage.date, new_date = %today, "Day rollover, resetting daily usage");
            *usage = self.seed_all(interfaces, today);
        } else {
            for iface in interfaces.iter() {
                match usage.interfaces.get_mut(iface) {
                    Some(stats) => self.update_interface(stats),
                    None => self.seed_interface(usage, iface),
                }
            }
        }

        self.persist(usage);
    }

    /// Zero every interface's totals, keeping baselines, and persist at once
    pub fn reset_stats(&self) -> Result<(), RepositoryError> {
        let mut guard = self.state.write();
        if let Some(ledger) = guard.as_mut() {
            ledger.usage.reset_totals();
            if let Err(e) = self.repository.save(&ledger.usage) {
                warn!(error = %e, "Failed to save daily usage after reset");
                return Err(e);
            }
        }
        info!("Daily usage statistics reset for all interfaces");
        Ok(())
    }

    /// Tick every `period` until `cancel` fires
    pub async fn run(self: Arc<Self>, period: Duration, cancel: CancellationToken) {
        info!(interval = ?period, "Starting daily usage monitor");

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    // Sysfs reads and fsync run under the write lock; keep them off the workers
                    let engine = self.clone();
                    if let Err(e) = tokio::task::spawn_blocking(move || engine.tick()).await {
                        error!(error = %e, "Accounting tick failed");
                    }
                }
            }
        }

        info!("Daily usage monitor stopped");
    }
}

impl UsageSnapshot for AccountingEngine {
    fn daily_usage(&self) -> Option<DailyUsage> {
        self.state.read().as_ref().map(|ledger| ledger.usage.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::CounterReading;
    use crate::error::CounterError;
    use crate::repository::JsonFileRepository;
    use chrono::{DateTime, Utc};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct Counters {
        readings: Mutex<HashMap<String, CounterReading>>,
    }

    impl Counters {
        fn set(&self, iface: &str, rx: u64, tx: u64) {
            self.readings
                .lock()
                .insert(iface.to_string(), CounterReading { rx, tx });
        }

        fn remove(&self, iface: &str) {
            self.readings.lock().remove(iface);
        }
    }

    impl CounterSource for Counters {
        fn read(&self, interface: &str) -> Result<CounterReading, CounterError> {
            self.readings
                .lock()
                .get(interface)
                .copied()
                .ok_or_else(|| CounterError::Io {
                    interface: interface.to_string(),
                    counter: "rx_bytes",
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                })
        }

        fn has_counters(&self, interface: &str) -> bool {
            self.readings.lock().contains_key(interface)
        }
    }

    struct Calendar(Mutex<String>);

    impl Calendar {
        fn new(date: &str) -> Self {
            Self(Mutex::new(date.to_string()))
        }

        fn set(&self, date: &str) {
            *self.0.lock() = date.to_string();
        }
    }

    impl Clock for Calendar {
        fn today(&self) -> String {
            self.0.lock().clone()
        }

        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        counters: Arc<Counters>,
        calendar: Arc<Calendar>,
        repo: Arc<JsonFileRepository>,
    }

    impl Fixture {
        fn new(today: &str) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let repo = Arc::new(JsonFileRepository::new(dir.path().join("daily_usage.json")));
            Self {
                _dir: dir,
                counters: Arc::new(Counters::default()),
                calendar: Arc::new(Calendar::new(today)),
                repo,
            }
        }

        fn engine(&self) -> AccountingEngine {
            AccountingEngine::new(self.counters.clone(), self.repo.clone(), self.calendar.clone())
        }
    }

    /// JSON repository whose saves can be switched off
    struct FlakyRepository {
        inner: JsonFileRepository,
        failing: AtomicBool,
    }

    impl UsageRepository for FlakyRepository {
        fn load(&self) -> Result<DailyUsage, RepositoryError> {
            self.inner.load()
        }

        fn save(&self, usage: &DailyUsage) -> Result<(), RepositoryError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(RepositoryError::Io {
                    path: self.inner.path().to_path_buf(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
                });
            }
            self.inner.save(usage)
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_uninitialized_engine() {
        let fx = Fixture::new("2024-05-01");
        let engine = fx.engine();

        assert!(engine.daily_usage().is_none());
        engine.tick();
        assert!(engine.reset_stats().is_ok());
        assert!(!fx.repo.path().exists());
    }

    #[test]
    fn test_fresh_start_seeds_from_live_counters() {
        let fx = Fixture::new("2024-05-01");
        fx.counters.set("eth0", 1000, 2000);
        let engine = fx.engine();

        let interfaces = engine.initialize("eth0").unwrap();
        assert_eq!(interfaces, names(&["eth0"]));

        let usage = engine.daily_usage().unwrap();
        assert_eq!(usage.date, "2024-05-01");
        assert_eq!(usage.interfaces["eth0"], InterfaceUsage::seeded("eth0", CounterReading { rx: 1000, tx: 2000 }));
        assert_eq!(fx.repo.load().unwrap(), usage);
    }

    #[test]
    fn test_discovery_failure_is_fatal() {
        let fx = Fixture::new("2024-05-01");
        let engine = fx.engine();

        assert!(matches!(
            engine.initialize("eth0"),
            Err(DiscoveryError::InterfaceUnavailable(_))
        ));
        assert!(!engine.is_initialized());
    }

    #[test]
    fn test_tick_accumulates_deltas() {
        let fx = Fixture::new("2024-05-01");
        fx.counters.set("eth0", 1000, 2000);
        let engine = fx.engine();
        engine.initialize_with(names(&["eth0"]));

        fx.counters.set("eth0", 1500, 2500);
        engine.tick();

        let eth0 = engine.daily_usage().unwrap().interfaces["eth0"].clone();
        assert_eq!(
            eth0,
            InterfaceUsage {
                interface: "eth0".into(),
                total_rx: 500,
                total_tx: 500,
                last_rx: 1500,
                last_tx: 2500,
            }
        );
        assert_eq!(fx.repo.load().unwrap().interfaces["eth0"], eth0);
    }

    #[test]
    fn test_failed_read_skips_only_that_interface() {
        let fx = Fixture::new("2024-05-01");
        fx.counters.set("eth0", 100, 100);
        fx.counters.set("wlan0", 100, 100);
        let engine = fx.engine();
        engine.initialize_with(names(&["eth0", "wlan0"]));

        fx.counters.remove("eth0");
        fx.counters.set("wlan0", 400, 300);
        engine.tick();

        let usage = engine.daily_usage().unwrap();
        assert_eq!(usage.interfaces["eth0"].total_rx, 0);
        assert_eq!(usage.interfaces["eth0"].last_rx, 100);
        assert_eq!(usage.interfaces["wlan0"].total_rx, 300);
        assert_eq!(usage.interfaces["wlan0"].total_tx, 200);

        fx.counters.set("eth0", 150, 120);
        engine.tick();
        let usage = engine.daily_usage().unwrap();
        assert_eq!(usage.interfaces["eth0"].total_rx, 50);
        assert_eq!(usage.interfaces["eth0"].total_tx, 20);
    }

    #[test]
    fn test_stale_snapshot_is_replaced() {
        let fx = Fixture::new("2024-05-02");
        let mut old = DailyUsage::new("2024-05-01");
        old.insert(InterfaceUsage {
            interface: "eth0".into(),
            total_rx: 9_999,
            total_tx: 9_999,
            last_rx: 10,
            last_tx: 10,
        });
        fx.repo.save(&old).unwrap();
        fx.counters.set("eth0", 5000, 6000);

        let engine = fx.engine();
        engine.initialize_with(names(&["eth0"]));

        let usage = engine.daily_usage().unwrap();
        assert_eq!(usage.date, "2024-05-02");
        let eth0 = &usage.interfaces["eth0"];
        assert_eq!((eth0.total_rx, eth0.total_tx), (0, 0));
        assert_eq!((eth0.last_rx, eth0.last_tx), (5000, 6000));
    }

    #[test]
    fn test_corrupt_snapshot_is_replaced() {
        let fx = Fixture::new("2024-05-01");
        std::fs::write(fx.repo.path(), "not json").unwrap();
        fx.counters.set("eth0", 42, 43);

        let engine = fx.engine();
        engine.initialize_with(names(&["eth0"]));

        assert_eq!(fx.repo.load().unwrap(), engine.daily_usage().unwrap());
        assert_eq!(engine.daily_usage().unwrap().interfaces["eth0"].last_rx, 42);
    }

    #[test]
    fn test_missing_interface_is_healed() {
        let fx = Fixture::new("2024-05-01");
        let mut saved = DailyUsage::new("2024-05-01");
        let eth0 = InterfaceUsage {
            interface: "eth0".into(),
            total_rx: 500,
            total_tx: 700,
            last_rx: 1500,
            last_tx: 2700,
        };
        saved.insert(eth0.clone());
        fx.repo.save(&saved).unwrap();

        fx.counters.set("eth0", 1600, 2800);
        fx.counters.set("wlan0", 80, 90);

        let engine = fx.engine();
        engine.initialize_with(names(&["eth0", "wlan0"]));

        let usage = engine.daily_usage().unwrap();
        assert_eq!(usage.interfaces["eth0"], eth0);
        assert_eq!(usage.interfaces["wlan0"], InterfaceUsage::seeded("wlan0", CounterReading { rx: 80, tx: 90 }));
        assert_eq!(fx.repo.load().unwrap(), usage);
    }

    #[test]
    fn test_rollover_during_tick() {
        let fx = Fixture::new("2024-05-01");
        fx.counters.set("eth0", 1000, 1000);
        let engine = fx.engine();
        engine.initialize_with(names(&["eth0"]));

        fx.counters.set("eth0", 3000, 4000);
        engine.tick();
        assert_eq!(engine.daily_usage().unwrap().interfaces["eth0"].total_rx, 2000);

        fx.calendar.set("2024-05-02");
        fx.counters.set("eth0", 3500, 4200);
        engine.tick();

        let usage = engine.daily_usage().unwrap();
        assert_eq!(usage.date, "2024-05-02");
        assert_eq!(usage.interfaces["eth0"], InterfaceUsage::seeded("eth0", CounterReading { rx: 3500, tx: 4200 }));
        assert_eq!(fx.repo.load().unwrap().date, "2024-05-02");
    }

    #[test]
    fn test_deferred_seed_never_credits_raw_counter() {
        let fx = Fixture::new("2024-05-01");
        let engine = fx.engine();
        engine.initialize_with(names(&["eth0"]));
        assert!(engine.daily_usage().unwrap().interfaces.is_empty());

        fx.counters.set("eth0", 1_000_000, 2_000_000);
        engine.tick();
        let eth0 = engine.daily_usage().unwrap().interfaces["eth0"].clone();
        assert_eq!((eth0.total_rx, eth0.total_tx), (0, 0));

        fx.counters.set("eth0", 1_000_100, 2_000_200);
        engine.tick();
        let eth0 = engine.daily_usage().unwrap().interfaces["eth0"].clone();
        assert_eq!((eth0.total_rx, eth0.total_tx), (100, 200));
    }

    #[test]
    fn test_snapshot_is_isolated_copy() {
        let fx = Fixture::new("2024-05-01");
        fx.counters.set("eth0", 10, 10);
        let engine = fx.engine();
        engine.initialize_with(names(&["eth0"]));

        let mut copy = engine.daily_usage().unwrap();
        copy.interfaces.get_mut("eth0").unwrap().total_rx = 123_456;
        copy.interfaces.clear();
        copy.date = "1999-01-01".into();

        let fresh = engine.daily_usage().unwrap();
        assert_eq!(fresh.date, "2024-05-01");
        assert_eq!(fresh.interfaces["eth0"].total_rx, 0);
    }

    #[test]
    fn test_reset_stats_persists() {
        let fx = Fixture::new("2024-05-01");
        fx.counters.set("eth0", 1000, 2000);
        let engine = fx.engine();
        engine.initialize_with(names(&["eth0"]));
        fx.counters.set("eth0", 1500, 2500);
        engine.tick();

        engine.reset_stats().unwrap();

        let eth0 = engine.daily_usage().unwrap().interfaces["eth0"].clone();
        assert_eq!((eth0.total_rx, eth0.total_tx), (0, 0));
        assert_eq!((eth0.last_rx, eth0.last_tx), (1500, 2500));
        assert_eq!(fx.repo.load().unwrap().interfaces["eth0"], eth0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_cancel() {
        let fx = Fixture::new("2024-05-01");
        fx.counters.set("eth0", 0, 0);
        let engine = Arc::new(fx.engine());
        engine.initialize_with(names(&["eth0"]));

        let cancel = CancellationToken::new();
        let task = tokio::spawn(engine.clone().run(Duration::from_secs(5), cancel.clone()));

        fx.counters.set("eth0", 64, 32);
        tokio::time::sleep(Duration::from_secs(6)).await;
        cancel.cancel();
        task.await.unwrap();

        let eth0 = engine.daily_usage().unwrap().interfaces["eth0"].clone();
        assert_eq!((eth0.total_rx, eth0.total_tx), (64, 32));
    }

    #[test]
    fn test_failed_save_is_retried_next_tick() {
        let fx = Fixture::new("2024-05-01");
        fx.counters.set("eth0", 1000, 2000);
        let repo = Arc::new(FlakyRepository {
            inner: JsonFileRepository::new(fx.repo.path()),
            failing: AtomicBool::new(false),
        });
        let engine = AccountingEngine::new(fx.counters.clone(), repo.clone(), fx.calendar.clone());
        engine.initialize_with(names(&["eth0"]));

        repo.failing.store(true, Ordering::SeqCst);
        fx.counters.set("eth0", 1200, 2100);
        engine.tick();

        assert_eq!(engine.daily_usage().unwrap().interfaces["eth0"].total_rx, 200);
        assert_eq!(fx.repo.load().unwrap().interfaces["eth0"].total_rx, 0);

        repo.failing.store(false, Ordering::SeqCst);
        engine.tick();

        let on_disk = fx.repo.load().unwrap().interfaces["eth0"].clone();
        assert_eq!((on_disk.total_rx, on_disk.total_tx), (200, 100));
        assert_eq!((on_disk.last_rx, on_disk.last_tx), (1200, 2100));
    }
}
