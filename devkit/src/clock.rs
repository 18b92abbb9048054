//! Settable clock for rollover tests

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use packetpilot_agent::clock::DATE_FORMAT;
use packetpilot_agent::Clock;
use parking_lot::RwLock;

#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    /// Clock pinned to noon UTC of `date` (YYYY-MM-DD)
    pub fn on(date: &str) -> Self {
        Self {
            now: RwLock::new(noon(date)),
        }
    }

    /// Move to noon of another day
    pub fn set_date(&self, date: &str) {
        *self.now.write() = noon(date);
    }
}

fn noon(date: &str) -> DateTime<Utc> {
    let day = NaiveDate::parse_from_str(date, DATE_FORMAT)
        .unwrap_or_else(|e| panic!("invalid test date {date:?}: {e}"));
    Utc.from_utc_datetime(&day.and_hms_opt(12, 0, 0).unwrap_or_default())
}

impl Clock for FixedClock {
    fn today(&self) -> String {
        self.now.read().format(DATE_FORMAT).to_string()
    }

    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}
