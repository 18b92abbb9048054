//! Network interface discovery for the accounting engine
//!
//! This module handles:
//! - Interface enumeration with assigned addresses
//! - Wildcard (`any` / `all`) or specific-name selection
//! - Filtering to interfaces exposing byte counters
//! - Deterministic, deduplicated, alphabetical output

use if_addrs::get_if_addrs;
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::counters::CounterSource;
use crate::error::DiscoveryError;

/// Selector values meaning "every interface"
const WILDCARDS: &[&str] = &["any", "all"];

pub fn is_wildcard(selector: &str) -> bool {
    WILDCARDS
        .iter()
        .any(|w| selector.trim().eq_ignore_ascii_case(w))
}

/// Discover the interfaces to monitor on this host
pub fn discover(selector: &str, source: &dyn CounterSource) -> Result<Vec<String>, DiscoveryError> {
    debug!(selector, "Enumerating network interfaces");

    let candidates = if is_wildcard(selector) {
        get_if_addrs()
            .map_err(DiscoveryError::Enumerate)?
            .into_iter()
            .map(|if_addr| if_addr.name)
            .collect()
    } else {
        Vec::new()
    };

    let interfaces = select_interfaces(selector, candidates, source)?;
    info!(interfaces = ?interfaces, "Monitoring interfaces");
    Ok(interfaces)
}

/// Pick the monitored interfaces out of `candidates`.
///
/// `candidates` holds one name per assigned address and is only consulted in
/// wildcard mode; a specific selector is checked against the counter source
/// directly.
pub fn select_interfaces<I>(
    selector: &str,
    candidates: I,
    source: &dyn CounterSource,
) -> Result<Vec<String>, DiscoveryError>
where
    I: IntoIterator<Item = String>,
{
    let mut selected = BTreeSet::new();

    if is_wildcard(selector) {
        for name in candidates {
            if selected.contains(&name) {
                continue;
            }
            if source.has_counters(&name) {
                selected.insert(name);
            } else {
                debug!(interface = %name, "Skipping interface without statistics");
            }
        }
    } else {
        let name = selector.trim();
        if !source.has_counters(name) {
            return Err(DiscoveryError::InterfaceUnavailable(name.to_string()));
        }
        selected.insert(name.to_string());
    }

    if selected.is_empty() {
        return Err(DiscoveryError::NoInterfaces);
    }

    Ok(selected.into_iter().collect())
}
