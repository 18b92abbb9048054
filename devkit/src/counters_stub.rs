/*!
Scriptable counter source

Replaces sysfs in tests: raw readings are set per interface, and reads of a
given interface can be made to fail without removing it from discovery.
*/

use packetpilot_agent::{CounterError, CounterReading, CounterSource};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct ScriptedCounters {
    readings: Mutex<HashMap<String, CounterReading>>,
    failing: Mutex<HashSet<String>>,
    reads: Mutex<Vec<String>>,
}

impl ScriptedCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source already exposing the given interfaces
    pub fn with(interfaces: &[(&str, u64, u64)]) -> Self {
        let source = Self::new();
        for (name, rx, tx) in interfaces {
            source.set(name, *rx, *tx);
        }
        source
    }

    /// Set the raw counters of `interface`, clearing any injected failure
    pub fn set(&self, interface: &str, rx: u64, tx: u64) {
        self.readings
            .lock()
            .insert(interface.to_string(), CounterReading { rx, tx });
        self.failing.lock().remove(interface);
    }

    /// Make reads of `interface` fail while it stays discoverable
    pub fn fail(&self, interface: &str) {
        self.failing.lock().insert(interface.to_string());
    }

    /// Remove `interface` entirely
    pub fn remove(&self, interface: &str) {
        self.readings.lock().remove(interface);
        self.failing.lock().remove(interface);
    }

    /// Interfaces read so far, in call order
    pub fn reads(&self) -> Vec<String> {
        self.reads.lock().clone()
    }
}

impl CounterSource for ScriptedCounters {
    fn read(&self, interface: &str) -> Result<CounterReading, CounterError> {
        self.reads.lock().push(interface.to_string());

        if self.failing.lock().contains(interface) {
            return Err(CounterError::Io {
                interface: interface.to_string(),
                counter: "rx_bytes",
                source: std::io::Error::new(std::io::ErrorKind::Other, "injected read failure"),
            });
        }

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
