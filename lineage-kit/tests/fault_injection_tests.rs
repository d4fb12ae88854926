//! Best-effort tracking under injected faults (`--features dev-faults`).
//!
//! Fault counters are read from the environment once per process, so this
//! file holds a single test.

#![cfg(feature = "dev-faults")]

use std::sync::Arc;

use lineage_kit::faults::{FaultScope, faults_enabled};
use lineage_kit::{
    DiagnosticEvent, Emitter, FieldPath, LineageTracker, MemorySink, Operation, PipelineContext,
};
use pretty_assertions::assert_eq;

#[test]
fn injected_faults_yield_best_effort_records() {
    unsafe {
        std::env::set_var("LINEAGE_FAULTS_SCOPE", "tracking");
        std::env::set_var("LINEAGE_FAULTS", "fingerprint:1,append:1");
    }

    let sink = Arc::new(MemorySink::new());
    let tracker = LineageTracker::new(16, Emitter::new(sink.clone()));
    assert!(faults_enabled(FaultScope::Tracking));

    let domain = FieldPath::parse("domain").expect("valid path");
    let mut ctx = PipelineContext::new();

    // First call: output fingerprint fails, record is stored with the sentinel.
    let origin = tracker.record_origin(&mut ctx, "plan", &domain, "web_app");
    assert!(origin.best_effort);
    assert!(origin.record.output_fingerprint.is_sentinel());
    assert_eq!(ctx.lineage().history(&domain).len(), 1);

    // Second call: append is dropped, but the sequence is consumed and the event emitted.
    let dropped = tracker.record(
        &mut ctx,
        "scaffold",
        Operation::Passthrough,
        &domain,
        &domain,
        Some("web_app"),
        "web_app",
    );
    assert!(dropped.best_effort);
    assert_eq!(dropped.record.sequence, 1);
    assert!(!dropped.record.output_fingerprint.is_sentinel());
    assert_eq!(ctx.lineage().record_count(), 1);

    let events = sink.events_named("stage.recorded");
    assert_eq!(events.len(), 2);
    assert!(matches!(
        events[1],
        DiagnosticEvent::StageRecorded { sequence: 1, best_effort: true, .. }
    ));

    // Counters are exhausted; tracking is back to normal.
    let clean = tracker.record(
        &mut ctx,
        "design",
        Operation::Passthrough,
        &domain,
        &domain,
        Some("web_app"),
        "web_app",
    );
    assert!(!clean.best_effort);
    assert_eq!(clean.record.sequence, 2);
    assert_eq!(ctx.lineage().record_count(), 2);

    unsafe {
        std::env::remove_var("LINEAGE_FAULTS_SCOPE");
        std::env::remove_var("LINEAGE_FAULTS");
    }
}
