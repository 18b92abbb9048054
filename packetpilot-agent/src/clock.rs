//! Calendar source for day boundaries and report timestamps

use chrono::{DateTime, Local, Utc};

/// Format of `DailyUsage::date`
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub trait Clock: Send + Sync {
    /// Today's local calendar date as YYYY-MM-DD
    fn today(&self) -> String;

    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock of the host, local time zone for dates
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> String {
        Local::now().format(DATE_FORMAT).to_string()
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
