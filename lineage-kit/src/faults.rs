//! Fault injection for the lineage tracker
//!
//! Lets tests drive the tracker's best-effort paths deterministically.
//! Compiled only with the `dev-faults` feature.
//!
//! ## Configuration via Environment Variables
//! ```bash
//! LINEAGE_FAULTS_SCOPE=tracking           # Enable faults for the tracker
//! LINEAGE_FAULTS=fingerprint:2,append:1   # Fail 2 fingerprints, drop 1 append
//! ```

// Note: #[cfg(feature = "dev-faults")] is specified at the module inclusion site (lib.rs)

use std::collections::HashMap;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

/// Subsystem a fault applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultScope {
    Tracking,
}

/// A fault to inject into the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InjectedFault {
    /// Output fingerprint cannot be computed
    #[error("fingerprint computation failed (fault injected)")]
    Fingerprint,
    /// Record cannot be appended to the field history
    #[error("history append failed (fault injected)")]
    Append,
}

#[derive(Debug, Default)]
struct FaultConfig {
    fingerprint: AtomicUsize,
    append: AtomicUsize,
}

static CONFIG: OnceLock<HashMap<FaultScope, FaultConfig>> = OnceLock::new();

fn parse_fault_scope(value: Option<&str>) -> Option<FaultScope> {
    match value {
        Some("tracking") | Some("tracker") => Some(FaultScope::Tracking),
        _ => None,
    }
}

fn parse_fault_spec(spec: &str) -> FaultConfig {
    let cfg = FaultConfig::default();
    for entry in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if let Some((label, count)) = entry.split_once(':')
            && let Ok(num) = count.trim().parse::<usize>()
        {
            match label.trim() {
                "fingerprint" => cfg.fingerprint.store(num, Ordering::Relaxed),
                "append" => cfg.append.store(num, Ordering::Relaxed),
                other => {
                    tracing::warn!(fault = other, "[faults] Unknown fault type");
                }
            }
        }
    }
    cfg
}

fn init_config() -> HashMap<FaultScope, FaultConfig> {
    let mut map = HashMap::new();

    let scope_var = std::env::var("LINEAGE_FAULTS_SCOPE").ok();
    if let Some(scope) = parse_fault_scope(scope_var.as_deref())
        && let Ok(spec) = std::env::var("LINEAGE_FAULTS")
    {
        let cfg = parse_fault_spec(&spec);
        tracing::info!(
            ?scope,
            fingerprint = cfg.fingerprint.load(Ordering::Relaxed),
            append = cfg.append.load(Ordering::Relaxed),
            "[faults] Initialized"
        );
        map.insert(scope, cfg);
    }

    map
}

fn config() -> &'static HashMap<FaultScope, FaultConfig> {
    CONFIG.get_or_init(init_config)
}

fn take(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
        .is_ok()
}

fn next_from(cfg: &FaultConfig) -> Option<InjectedFault> {
    if take(&cfg.fingerprint) {
        tracing::warn!("[faults] Injecting fingerprint failure");
        return Some(InjectedFault::Fingerprint);
    }
    if take(&cfg.append) {
        tracing::warn!("[faults] Injecting append failure");
        return Some(InjectedFault::Append);
    }
    None
}

/// Consume one pending fault for `scope`, fingerprint faults first.
pub fn next_fault(scope: FaultScope) -> Option<InjectedFault> {
    next_from(config().get(&scope)?)
}

/// Check if fault injection is enabled for a scope.
pub fn faults_enabled(scope: FaultScope) -> bool {
    config().contains_key(&scope)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_parsing() {
        assert_eq!(parse_fault_scope(Some("tracking")), Some(FaultScope::Tracking));
        assert_eq!(parse_fault_scope(Some("boundary")), None);
        assert_eq!(parse_fault_scope(None), None);
    }

    #[test]
    fn test_spec_parsing_and_priority() {
        let cfg = parse_fault_spec("fingerprint:1, append:2, bogus:3, malformed");
        assert_eq!(next_from(&cfg), Some(InjectedFault::Fingerprint));
        assert_eq!(next_from(&cfg), Some(InjectedFault::Append));
        assert_eq!(next_from(&cfg), Some(InjectedFault::Append));
        assert_eq!(next_from(&cfg), None);
    }

    #[test]
    fn test_fault_messages() {
        assert!(InjectedFault::Fingerprint.to_string().contains("fault injected"));
        assert!(InjectedFault::Append.to_string().contains("append"));
    }
}
