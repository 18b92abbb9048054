//! Daily usage data model
//!
//! `DailyUsage` is the whole-day snapshot persisted to disk and copied to
//! readers. Interfaces are kept in a `BTreeMap` so every iteration, copy and
//! serialization is ordered by interface name.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::counters::CounterReading;

/// Bytes per megabyte used for every human-unit conversion
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Accumulated usage of a single interface for the current day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceUsage {
    pub interface: String,
    /// Bytes received since the start of the day
    pub total_rx: u64,
    /// Bytes sent since the start of the day
    pub total_tx: u64,
    /// Last raw rx counter observed
    pub last_rx: u64,
    /// Last raw tx counter observed
    pub last_tx: u64,
}

/// Bytes credited to the totals by one reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delta {
    pub rx: u64,
    pub tx: u64,
}

impl InterfaceUsage {
    /// Fresh entry with zero totals and the given baseline
    pub fn seeded(interface: impl Into<String>, baseline: CounterReading) -> Self {
        Self {
            interface: interface.into(),
            total_rx: 0,
            total_tx: 0,
            last_rx: baseline.rx,
            last_tx: baseline.tx,
        }
    }

    /// Credit the bytes seen since the previous reading and move the baseline.
    pub fn apply(&mut self, reading: CounterReading) -> Delta {
        let delta = Delta {
            rx: counter_delta(self.last_rx, reading.rx),
            tx: counter_delta(self.last_tx, reading.tx),
        };

        self.total_rx = self.total_rx.saturating_add(delta.rx);
        self.total_tx = self.total_tx.saturating_add(delta.tx);
        self.last_rx = reading.rx;
        self.last_tx = reading.tx;

        delta
    }

    pub fn reset_totals(&mut self) {
        self.total_rx = 0;
        self.total_tx = 0;
    }

    pub fn total_rx_mb(&self) -> f64 {
        self.total_rx as f64 / BYTES_PER_MB
    }

    pub fn total_tx_mb(&self) -> f64 {
        self.total_tx as f64 / BYTES_PER_MB
    }
}

/// Bytes between two raw readings of the same counter.
///
/// A reading lower than the previous one means the counter restarted from
/// zero (interface reset, driver reload, wraparound), so everything counted
/// since then is the new value itself.
pub fn counter_delta(last: u64, current: u64) -> u64 {
    if current >= last {
        current - last
    } else {
        current
    }
}

/// Usage of every monitored interface for one calendar day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyUsage {
    /// Local calendar date, YYYY-MM-DD
    pub date: String,
    #[serde(default)]
    pub interfaces: BTreeMap<String, InterfaceUsage>,
}

impl DailyUsage {
    pub fn new(date: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            interfaces: BTreeMap::new(),
        }
    }

    pub fn is_for(&self, date: &str) -> bool {
        self.date == date
    }

    /// Interface names absent from this snapshot, in the order given
    pub fn missing<'a>(&self, names: &'a [String]) -> Vec<&'a String> {
        names
            .iter()
            .filter(|name| !self.interfaces.contains_key(name.as_str()))
            .collect()
    }

    pub fn insert(&mut self, usage: InterfaceUsage) {
        self.interfaces.insert(usage.interface.clone(), usage);
    }

    pub fn reset_totals(&mut self) {
        for usage in self.interfaces.values_mut() {
            usage.reset_totals();
        }
    }

    pub fn total_rx(&self) -> u64 {
        self.interfaces
            .values()
            .fold(0u64, |acc, u| acc.saturating_add(u.total_rx))
    }

    pub fn total_tx(&self) -> u64 {
        self.interfaces
            .values()
            .fold(0u64, |acc, u| acc.saturating_add(u.total_tx))
    }
}
