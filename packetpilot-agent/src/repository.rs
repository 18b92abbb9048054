//! Durable storage of the current day's usage
//!
//! A single JSON document per installation:
//! ```json
//! {
//!   "date": "2024-05-01",
//!   "interfaces": {
//!     "eth0": { "interface": "eth0", "total_rx": 500, "total_tx": 500, "last_rx": 1500, "last_tx": 2500 }
//!   }
//! }
//! ```
//! Saves go through a sibling temporary file and a rename, so a failed save
//! leaves the previous document intact.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::RepositoryError;
use crate::usage::DailyUsage;

/// Load/save interface for the daily usage snapshot
pub trait UsageRepository: Send + Sync {
    fn load(&self) -> Result<DailyUsage, RepositoryError>;

    fn save(&self, usage: &DailyUsage) -> Result<(), RepositoryError>;
}

/// Default location of the usage document
pub const DEFAULT_USAGE_FILE: &str = "/var/lib/packetpilot/daily_usage.json";

/// JSON file backed repository
#[derive(Debug, Clone)]
pub struct JsonFileRepository {
    path: PathBuf,
}

impl JsonFileRepository {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "daily_usage.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> RepositoryError {
        RepositoryError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl UsageRepository for JsonFileRepository {
    fn load(&self) -> Result<DailyUsage, RepositoryError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RepositoryError::NotFound(self.path.clone()));
            }
            Err(e) => return Err(self.io_error(&self.path, e)),
        };

        serde_json::from_str(&content).map_err(|source| RepositoryError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, usage: &DailyUsage) -> Result<(), RepositoryError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.io_error(parent, e))?;
            }
        }

        let json = serde_json::to_string_pretty(usage).map_err(RepositoryError::Encode)?;

        let temp = self.temp_path();
        let write = || -> std::io::Result<()> {
            let mut file = fs::File::create(&temp)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()
        };
        if let Err(e) = write() {
            let _ = fs::remove_file(&temp);
            return Err(self.io_error(&temp, e));
        }

        fs::rename(&temp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&temp);
            self.io_error(&self.path, e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::CounterReading;
    use crate::usage::InterfaceUsage;

    fn sample() -> DailyUsage {
        let mut usage = DailyUsage::new("2024-05-01");
        let mut eth0 = InterfaceUsage::seeded("eth0", CounterReading { rx: 1000, tx: 2000 });
        eth0.apply(CounterReading { rx: 1500, tx: 2500 });
        usage.insert(eth0);
        usage.insert(InterfaceUsage::seeded("wlan0", CounterReading { rx: 7, tx: 9 }));
        usage
    }

    #[test]
    fn test_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::new(tmp.path().join("state").join("daily_usage.json"));

        let usage = sample();
        repo.save(&usage).unwrap();

        assert_eq!(repo.load().unwrap(), usage);
        assert!(!repo.temp_path().exists());
    }

    #[test]
    fn test_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::new(tmp.path().join("daily_usage.json"));
        assert!(matches!(repo.load(), Err(RepositoryError::NotFound(_))));
    }

    #[test]
    fn test_corrupt_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("daily_usage.json");
        fs::write(&path, "{\"date\": \"2024-05-01\", \"interfaces\": ").unwrap();

        let repo = JsonFileRepository::new(&path);
        assert!(matches!(repo.load(), Err(RepositoryError::Corrupt { .. })));
    }

    #[test]
    fn test_document_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::new(tmp.path().join("daily_usage.json"));
        repo.save(&sample()).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(repo.path()).unwrap()).unwrap();
        assert_eq!(raw["date"], "2024-05-01");
        assert_eq!(raw["interfaces"]["eth0"]["interface"], "eth0");
        assert_eq!(raw["interfaces"]["eth0"]["total_rx"], 500);
        assert_eq!(raw["interfaces"]["eth0"]["last_tx"], 2500);
    }

    #[test]
    fn test_failed_save_keeps_previous_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("daily_usage.json");
        let repo = JsonFileRepository::new(&path);
        repo.save(&sample()).unwrap();

        // A directory squatting on the temp path makes the write fail
        fs::create_dir(repo.temp_path()).unwrap();
        let mut changed = sample();
        changed.reset_totals();

        assert!(matches!(repo.save(&changed), Err(RepositoryError::Io { .. })));
        assert_eq!(repo.load().unwrap(), sample());
    }
}
