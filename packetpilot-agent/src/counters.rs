//! Raw interface byte counters
//!
//! The engine only depends on `CounterSource`. The production source reads
//! the statistics Linux exposes under `/sys/class/net/<iface>/statistics`.

use std::path::{Path, PathBuf};

use crate::error::CounterError;

/// Raw rx/tx byte counters of an interface as reported by the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterReading {
    pub rx: u64,
    pub tx: u64,
}

/// Source of raw interface counters
pub trait CounterSource: Send + Sync {
    /// Current raw counters for `interface`
    fn read(&self, interface: &str) -> Result<CounterReading, CounterError>;

    /// Whether `interface` exposes counters at all
    fn has_counters(&self, interface: &str) -> bool;
}

const DEFAULT_SYSFS_ROOT: &str = "/sys/class/net";

/// Counter source backed by sysfs statistics files
#[derive(Debug, Clone)]
pub struct SysfsCounters {
    root: PathBuf,
}

impl Default for SysfsCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl SysfsCounters {
    pub fn new() -> Self {
        Self::with_root(DEFAULT_SYSFS_ROOT)
    }

    /// Use another directory laid out like `/sys/class/net`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn counter_path(&self, interface: &str, counter: &str) -> PathBuf {
        self.root.join(interface).join("statistics").join(counter)
    }

    fn read_counter(&self, interface: &str, counter: &'static str) -> Result<u64, CounterError> {
        let path = self.counter_path(interface, counter);
        let raw = std::fs::read_to_string(&path).map_err(|source| CounterError::Io {
            interface: interface.to_string(),
            counter,
            source,
        })?;

        let value = raw.trim();
        value.parse().map_err(|_| CounterError::Parse {
            interface: interface.to_string(),
            counter,
            value: value.to_string(),
        })
    }
}

impl CounterSource for SysfsCounters {
    fn read(&self, interface: &str) -> Result<CounterReading, CounterError> {
        let rx = self.read_counter(interface, "rx_bytes")?;
        let tx = self.read_counter(interface, "tx_bytes")?;
        Ok(CounterReading { rx, tx })
    }

    fn has_counters(&self, interface: &str) -> bool {
        is_file(&self.counter_path(interface, "rx_bytes"))
            && is_file(&self.counter_path(interface, "tx_bytes"))
    }
}

fn is_file(path: &Path) -> bool {
    path.metadata().map(|m| m.is_file()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_stats(root: &Path, iface: &str, rx: &str, tx: &str) {
        let dir = root.join(iface).join("statistics");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("rx_bytes"), rx).unwrap();
        fs::write(dir.join("tx_bytes"), tx).unwrap();
    }

    #[test]
    fn test_read_counters() {
        let tmp = tempfile::tempdir().unwrap();
        write_stats(tmp.path(), "eth0", "1000\n", "2000\n");

        let source = SysfsCounters::with_root(tmp.path());
        assert!(source.has_counters("eth0"));
        assert_eq!(
            source.read("eth0").unwrap(),
            CounterReading { rx: 1000, tx: 2000 }
        );
    }

    #[test]
    fn test_missing_interface() {
        let tmp = tempfile::tempdir().unwrap();
        let source = SysfsCounters::with_root(tmp.path());

        assert!(!source.has_counters("eth9"));
        assert!(matches!(
            source.read("eth9"),
            Err(CounterError::Io { counter: "rx_bytes", .. })
        ));
    }

    #[test]
    fn test_garbage_counter_value() {
        let tmp = tempfile::tempdir().unwrap();
        write_stats(tmp.path(), "eth0", "12", "not-a-number");

        let source = SysfsCounters::with_root(tmp.path());
        match source.read("eth0") {
            Err(CounterError::Parse { counter, value, .. }) => {
                assert_eq!(counter, "tx_bytes");
                assert_eq!(value, "not-a-number");
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }
}
