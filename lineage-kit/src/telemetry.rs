//! Diagnostic events
//!
//! Events are inert records handed to an external sink. The engine never
//! depends on emission succeeding: without a sink every emit is a no-op, and
//! sink failures are logged and dropped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

use crate::fingerprint::Fingerprint;
use crate::types::{BoundaryStatus, Direction, FieldPath, LineageStatus, Operation, Severity};

/// One record per diagnostic occasion.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum DiagnosticEvent {
    #[serde(rename = "stage.recorded")]
    StageRecorded {
        run_id: Uuid,
        sequence: u64,
        phase: String,
        operation: Operation,
        input_path: FieldPath,
        output_path: FieldPath,
        input_fingerprint: Option<Fingerprint>,
        output_fingerprint: Fingerprint,
        best_effort: bool,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "boundary.checked")]
    BoundaryChecked {
        run_id: Uuid,
        phase: String,
        direction: Direction,
        field: FieldPath,
        status: BoundaryStatus,
        severity: Severity,
    },
    #[serde(rename = "chain.verified")]
    ChainVerified {
        run_id: Uuid,
        chain_id: String,
        coverage_pct: f64,
    },
    #[serde(rename = "chain.broken")]
    ChainBroken {
        run_id: Uuid,
        chain_id: String,
        status: LineageStatus,
        first_broken_phase: Option<String>,
        missing_stages: usize,
        broken_links: usize,
        unrecorded_mutations: usize,
    },
    #[serde(rename = "audit.complete")]
    AuditComplete {
        run_id: Uuid,
        totals: BTreeMap<String, usize>,
        integrity_pct: f64,
    },
}

impl DiagnosticEvent {
    /// Dotted event name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Self::StageRecorded { .. } => "stage.recorded",
            Self::BoundaryChecked { .. } => "boundary.checked",
            Self::ChainVerified { .. } => "chain.verified",
            Self::ChainBroken { .. } => "chain.broken",
            Self::AuditComplete { .. } => "audit.complete",
        }
    }

    pub fn run_id(&self) -> Uuid {
        match self {
            Self::StageRecorded { run_id, .. }
            | Self::BoundaryChecked { run_id, .. }
            | Self::ChainVerified { run_id, .. }
            | Self::ChainBroken { run_id, .. }
            | Self::AuditComplete { run_id, .. } => *run_id,
        }
    }
}

/// Errors a sink may report. The emitter logs them and carries on.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("telemetry sink unavailable: {0}")]
    Unavailable(String),

    #[error("failed to encode event: {0}")]
    Encode(String),
}

/// Destination for diagnostic events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &DiagnosticEvent) -> Result<(), SinkError>;
}

/// Fan-in point the engine emits through.
#[derive(Clone, Default)]
pub struct Emitter {
    sink: Option<Arc<dyn EventSink>>,
}

impl Emitter {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink: Some(sink) }
    }

    /// Emitter with no sink; every emit is a no-op.
    pub fn noop() -> Self {
        Self { sink: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    pub fn emit(&self, event: DiagnosticEvent) {
        let Some(sink) = &self.sink else {
            return;
        };
        if let Err(e) = sink.emit(&event) {
            tracing::warn!(event = event.name(), error = %e, "Dropping diagnostic event");
        }
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Collects events in memory; handy for tests and post-run inspection.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Events whose wire name equals `name`.
    pub fn events_named(&self, name: &str) -> Vec<DiagnosticEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.name() == name)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &DiagnosticEvent) -> Result<(), SinkError> {
        self.events
            .lock()
            .map_err(|e| SinkError::Unavailable(e.to_string()))?
            .push(event.clone());
        Ok(())
    }
}

/// Forwards events to `tracing` as JSON payloads.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &DiagnosticEvent) -> Result<(), SinkError> {
        let payload = serde_json::to_string(event).map_err(|e| SinkError::Encode(e.to_string()))?;
        tracing::info!(
            target: "lineage_kit::events",
            event = event.name(),
            run_id = %event.run_id(),
            payload = %payload,
            "diagnostic event"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSink;

    impl EventSink for FailingSink {
        fn emit(&self, _event: &DiagnosticEvent) -> Result<(), SinkError> {
            Err(SinkError::Unavailable("collector offline".into()))
        }
    }

    fn verified_event() -> DiagnosticEvent {
        DiagnosticEvent::ChainVerified {
            run_id: Uuid::nil(),
            chain_id: "domain_chain".into(),
            coverage_pct: 100.0,
        }
    }

    #[test]
    fn noop_emitter_drops_events() {
        let emitter = Emitter::noop();
        assert!(!emitter.is_enabled());
        emitter.emit(verified_event());
    }

    #[test]
    fn memory_sink_collects_events() {
        let sink = Arc::new(MemorySink::new());
        let emitter = Emitter::new(sink.clone());
        emitter.emit(verified_event());
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.events_named("chain.verified").len(), 1);
        assert!(sink.events_named("chain.broken").is_empty());
    }

    #[test]
    fn failing_sink_never_propagates() {
        let emitter = Emitter::new(Arc::new(FailingSink));
        emitter.emit(verified_event());
    }

    #[test]
    fn events_serialize_with_dotted_tag() {
        let json = serde_json::to_value(verified_event()).expect("serialize");
        assert_eq!(json["event"], "chain.verified");
        assert_eq!(json["chain_id"], "domain_chain");
        assert_eq!(json["coverage_pct"], 100.0);
    }

    #[test]
    fn tracing_sink_accepts_events() {
        assert!(TracingSink.emit(&verified_event()).is_ok());
    }
}
