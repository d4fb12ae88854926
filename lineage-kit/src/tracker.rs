//! Provenance & lineage tracking
//!
//! Every value a phase produces for a tracked field is stamped with a
//! [`TransformationRecord`] appended to that field's history, and the field's
//! [`ProvenanceRecord`] is replaced. Recording never fails: internal faults
//! degrade the record to best-effort and are logged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::context::PipelineContext;
use crate::contract::LineageChainSpec;
use crate::fingerprint::{Fingerprint, try_fingerprint};
use crate::telemetry::{DiagnosticEvent, Emitter};
use crate::types::{FieldPath, Operation};

/// Latest write of a field. Replaced wholesale on each write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    /// Phase that last wrote the field
    pub origin_phase: String,
    pub recorded_at: DateTime<Utc>,
    pub fingerprint: Fingerprint,
}

/// One stamped transformation. Append-only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformationRecord {
    /// Per-run counter ordering records across fields
    pub sequence: u64,
    pub phase: String,
    pub operation: Operation,
    pub input_fingerprint: Option<Fingerprint>,
    pub output_fingerprint: Fingerprint,
    pub timestamp: DateTime<Utc>,
    pub input_field_path: FieldPath,
    pub output_field_path: FieldPath,
    /// Set when part of the record could not be computed faithfully
    #[serde(default)]
    pub best_effort: bool,
}

impl TransformationRecord {
    /// Build a record by hand, e.g. when replaying a history.
    pub fn new(
        sequence: u64,
        phase: impl Into<String>,
        operation: Operation,
        input_field_path: FieldPath,
        output_field_path: FieldPath,
        input_fingerprint: Option<Fingerprint>,
        output_fingerprint: Fingerprint,
    ) -> Self {
        Self {
            sequence,
            phase: phase.into(),
            operation,
            input_fingerprint,
            output_fingerprint,
            timestamp: Utc::now(),
            input_field_path,
            output_field_path,
            best_effort: false,
        }
    }

    /// Whether the record moves a value from one field into another.
    pub fn crosses_fields(&self) -> bool {
        self.input_field_path != self.output_field_path
    }
}

/// Engine-owned lineage slot of the pipeline context.
#[derive(Clone, Debug, Default)]
pub struct LineageState {
    histories: BTreeMap<FieldPath, Vec<TransformationRecord>>,
    provenance: BTreeMap<FieldPath, ProvenanceRecord>,
    next_sequence: u64,
}

impl LineageState {
    /// Records that produced `field`, in recording order.
    pub fn history(&self, field: &FieldPath) -> &[TransformationRecord] {
        self.histories.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn provenance(&self, field: &FieldPath) -> Option<&ProvenanceRecord> {
        self.provenance.get(field)
    }

    /// Fields with at least one record.
    pub fn tracked_fields(&self) -> impl Iterator<Item = &FieldPath> {
        self.histories.keys()
    }

    /// Every record of the run, ordered by sequence.
    pub fn all_records(&self) -> Vec<&TransformationRecord> {
        let mut records: Vec<&TransformationRecord> = self.histories.values().flatten().collect();
        records.sort_by_key(|r| r.sequence);
        records
    }

    /// Records relevant to one chain, ordered by sequence.
    ///
    /// Includes every record writing a field the chain touches and every
    /// record deriving some other field from one of them.
    pub fn chain_history(&self, chain: &LineageChainSpec) -> Vec<TransformationRecord> {
        let touched = chain.touched_fields();
        self.all_records()
            .into_iter()
            .filter(|r| touched.contains(&r.output_field_path) || touched.contains(&r.input_field_path))
            .cloned()
            .collect()
    }

    pub fn record_count(&self) -> usize {
        self.histories.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }

    fn next_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    fn append(&mut self, record: TransformationRecord) {
        self.provenance.insert(
            record.output_field_path.clone(),
            ProvenanceRecord {
                origin_phase: record.phase.clone(),
                recorded_at: record.timestamp,
                fingerprint: record.output_fingerprint.clone(),
            },
        );
        self.histories
            .entry(record.output_field_path.clone())
            .or_default()
            .push(record);
    }
}

/// Result of [`LineageTracker::record`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RecordOutcome {
    pub record: TransformationRecord,
    pub best_effort: bool,
}

/// Stamps transformation facts into a context's lineage slot.
#[derive(Clone, Debug)]
pub struct LineageTracker {
    fingerprint_len: usize,
    emitter: Emitter,
    detached: bool,
}

impl LineageTracker {
    pub fn new(fingerprint_len: usize, emitter: Emitter) -> Self {
        #[cfg(feature = "dev-faults")]
        if crate::faults::faults_enabled(crate::faults::FaultScope::Tracking) {
            tracing::warn!("Fault injection is active for lineage tracking");
        }
        Self {
            fingerprint_len,
            emitter,
            detached: false,
        }
    }

    /// Stamp records without storing or emitting them.
    pub fn detached(mut self) -> Self {
        self.detached = true;
        self
    }

    /// Record one transformation of `input_path` into `output_path`.
    ///
    /// When a non-`Origin` call has no input value, the input fingerprint is
    /// taken from the input field's provenance; with no provenance either the
    /// record is best-effort and carries no input fingerprint.
    #[allow(clippy::too_many_arguments)]
    pub fn record<I, O>(
        &self,
        ctx: &mut PipelineContext,
        phase: &str,
        operation: Operation,
        input_path: &FieldPath,
        output_path: &FieldPath,
        input_value: Option<&I>,
        output_value: &O,
    ) -> RecordOutcome
    where
        I: serde::Serialize + ?Sized,
        O: serde::Serialize + ?Sized,
    {
        let mut best_effort = false;

        #[cfg(feature = "dev-faults")]
        let injected = crate::faults::next_fault(crate::faults::FaultScope::Tracking);
        #[cfg(not(feature = "dev-faults"))]
        let injected: Option<std::convert::Infallible> = None;

        let output_fingerprint = match self.fingerprint_output(output_value, injected.as_ref()) {
            Ok(fp) => fp,
            Err(error) => {
                tracing::warn!(phase, field = %output_path, %error, "Output fingerprint unavailable");
                best_effort = true;
                Fingerprint::sentinel(self.fingerprint_len)
            }
        };

        let input_fingerprint = if operation.has_input() {
            match input_value {
                Some(value) => match try_fingerprint(value, self.fingerprint_len) {
                    Ok(fp) => Some(fp),
                    Err(error) => {
                        tracing::warn!(phase, field = %input_path, %error, "Input fingerprint unavailable");
                        best_effort = true;
                        Some(Fingerprint::sentinel(self.fingerprint_len))
                    }
                },
                None => match ctx.lineage().provenance(input_path) {
                    Some(provenance) => Some(provenance.fingerprint.clone()),
                    None => {
                        tracing::warn!(
                            phase,
                            field = %input_path,
                            "No input value and no provenance; recording best-effort"
                        );
                        best_effort = true;
                        None
                    }
                },
            }
        } else {
            None
        };

        if self.detached {
            let record = TransformationRecord {
                best_effort,
                ..TransformationRecord::new(
                    ctx.lineage().next_sequence,
                    phase,
                    operation,
                    input_path.clone(),
                    output_path.clone(),
                    input_fingerprint,
                    output_fingerprint,
                )
            };
            return RecordOutcome {
                best_effort,
                record,
            };
        }

        let lineage = ctx.lineage_mut();
        let mut record = TransformationRecord::new(
            lineage.next_sequence(),
            phase,
            operation,
            input_path.clone(),
            output_path.clone(),
            input_fingerprint,
            output_fingerprint,
        );
        record.best_effort = best_effort;

        if self.append_blocked(injected.as_ref()) {
            tracing::warn!(phase, field = %output_path, "History append failed; record not stored");
            record.best_effort = true;
        } else {
            lineage.append(record.clone());
        }

        tracing::debug!(
            phase,
            operation = operation.as_str(),
            input = %input_path,
            output = %output_path,
            fingerprint = %record.output_fingerprint,
            sequence = record.sequence,
            "Transformation recorded"
        );

        self.emitter.emit(DiagnosticEvent::StageRecorded {
            run_id: ctx.run_id(),
            sequence: record.sequence,
            phase: record.phase.clone(),
            operation,
            input_path: record.input_field_path.clone(),
            output_path: record.output_field_path.clone(),
            input_fingerprint: record.input_fingerprint.clone(),
            output_fingerprint: record.output_fingerprint.clone(),
            best_effort: record.best_effort,
            timestamp: record.timestamp,
        });

        RecordOutcome {
            best_effort: record.best_effort,
            record,
        }
    }

    /// Record the first write of a field.
    pub fn record_origin<O>(
        &self,
        ctx: &mut PipelineContext,
        phase: &str,
        path: &FieldPath,
        value: &O,
    ) -> RecordOutcome
    where
        O: serde::Serialize + ?Sized,
    {
        self.record::<O, O>(ctx, phase, Operation::Origin, path, path, None, value)
    }

    #[cfg(feature = "dev-faults")]
    fn fingerprint_output<O>(
        &self,
        value: &O,
        injected: Option<&crate::faults::InjectedFault>,
    ) -> Result<Fingerprint, String>
    where
        O: serde::Serialize + ?Sized,
    {
        if let Some(fault @ crate::faults::InjectedFault::Fingerprint) = injected {
            return Err(fault.to_string());
        }
        try_fingerprint(value, self.fingerprint_len).map_err(|e| e.to_string())
    }

    #[cfg(not(feature = "dev-faults"))]
    fn fingerprint_output<O>(
        &self,
        value: &O,
        _injected: Option<&std::convert::Infallible>,
    ) -> Result<Fingerprint, String>
    where
        O: serde::Serialize + ?Sized,
    {
        try_fingerprint(value, self.fingerprint_len).map_err(|e| e.to_string())
    }

    #[cfg(feature = "dev-faults")]
    fn append_blocked(&self, injected: Option<&crate::faults::InjectedFault>) -> bool {
        matches!(injected, Some(crate::faults::InjectedFault::Append))
    }

    #[cfg(not(feature = "dev-faults"))]
    fn append_blocked(&self, _injected: Option<&std::convert::Infallible>) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;
    use crate::telemetry::MemorySink;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn path(raw: &str) -> FieldPath {
        FieldPath::parse(raw).expect("valid path")
    }

    fn tracker() -> LineageTracker {
        LineageTracker::new(16, Emitter::noop())
    }

    #[test]
    fn origin_has_no_input_fingerprint() {
        let mut ctx = PipelineContext::new();
        let outcome = tracker().record_origin(&mut ctx, "plan", &path("domain"), "web_app");

        assert!(!outcome.best_effort);
        assert_eq!(outcome.record.input_fingerprint, None);
        assert_eq!(outcome.record.output_fingerprint, fingerprint("web_app"));
        assert_eq!(ctx.lineage().history(&path("domain")).len(), 1);

        let provenance = ctx.lineage().provenance(&path("domain")).expect("provenance");
        assert_eq!(provenance.origin_phase, "plan");
        assert_eq!(provenance.fingerprint, fingerprint("web_app"));
    }

    #[test]
    fn provenance_is_replaced_on_each_write() {
        let mut ctx = PipelineContext::new();
        let tracker = tracker();
        let domain = path("domain");
        tracker.record_origin(&mut ctx, "plan", &domain, "web_app");
        tracker.record(
            &mut ctx,
            "scaffold",
            Operation::Transform,
            &domain,
            &domain,
            Some("web_app"),
            "webapp",
        );

        let provenance = ctx.lineage().provenance(&domain).expect("provenance");
        assert_eq!(provenance.origin_phase, "scaffold");
        assert_eq!(provenance.fingerprint, fingerprint("webapp"));
        assert_eq!(ctx.lineage().history(&domain).len(), 2);
    }

    #[test]
    fn missing_input_falls_back_to_provenance() {
        let mut ctx = PipelineContext::new();
        let tracker = tracker();
        let domain = path("domain");
        tracker.record_origin(&mut ctx, "plan", &domain, "web_app");
        let outcome = tracker.record::<str, str>(
            &mut ctx,
            "scaffold",
            Operation::Passthrough,
            &domain,
            &domain,
            None,
            "web_app",
        );

        assert!(!outcome.best_effort);
        assert_eq!(outcome.record.input_fingerprint, Some(fingerprint("web_app")));
    }

    #[test]
    fn missing_input_without_provenance_is_best_effort() {
        let mut ctx = PipelineContext::new();
        let outcome = tracker().record::<str, str>(
            &mut ctx,
            "design",
            Operation::Transform,
            &path("domain"),
            &path("design.domain"),
            None,
            "web_app",
        );

        assert!(outcome.best_effort);
        assert_eq!(outcome.record.input_fingerprint, None);
        assert_eq!(ctx.lineage().history(&path("design.domain")).len(), 1);
    }

    #[test]
    fn unrepresentable_output_is_best_effort_sentinel() {
        let mut ctx = PipelineContext::new();
        let mut weird: HashMap<(u8, u8), u8> = HashMap::new();
        weird.insert((0, 1), 2);

        let outcome = tracker().record_origin(&mut ctx, "plan", &path("matrix"), &weird);
        assert!(outcome.best_effort);
        assert!(outcome.record.output_fingerprint.is_sentinel());
    }

    #[test]
    fn sequences_order_records_across_fields() {
        let mut ctx = PipelineContext::new();
        let tracker = tracker();
        tracker.record_origin(&mut ctx, "plan", &path("domain"), "web_app");
        tracker.record(
            &mut ctx,
            "implement",
            Operation::Derive,
            &path("domain"),
            &path("constraints"),
            Some("web_app"),
            &json!({"framework": "axum"}),
        );
        tracker.record_origin(&mut ctx, "plan", &path("budget"), &json!(100));

        let sequences: Vec<u64> = ctx.lineage().all_records().iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
        assert_eq!(ctx.lineage().record_count(), 3);
        assert!(ctx.lineage().history(&path("constraints"))[0].crosses_fields());
    }

    #[test]
    fn chain_history_includes_outgoing_derivations() {
        let mut ctx = PipelineContext::new();
        let tracker = tracker();
        tracker.record_origin(&mut ctx, "plan", &path("domain"), "web_app");
        tracker.record_origin(&mut ctx, "plan", &path("budget"), &json!(100));
        tracker.record(
            &mut ctx,
            "implement",
            Operation::Derive,
            &path("domain"),
            &path("constraints"),
            Some("web_app"),
            &json!({}),
        );

        let chain = LineageChainSpec::new(
            "domain_chain",
            path("domain"),
            vec![crate::contract::StageSpec::new(
                "plan",
                Operation::Origin,
                path("domain"),
                path("domain"),
            )],
        );
        let history = ctx.lineage().chain_history(&chain);
        let phases: Vec<&str> = history.iter().map(|r| r.phase.as_str()).collect();
        assert_eq!(phases, vec!["plan", "implement"]);
    }

    #[test]
    fn detached_tracker_leaves_context_untouched() {
        let sink = Arc::new(MemorySink::new());
        let tracker = LineageTracker::new(16, Emitter::new(sink.clone())).detached();
        let mut ctx = PipelineContext::new();
        let outcome = tracker.record_origin(&mut ctx, "plan", &path("domain"), "web_app");

        assert_eq!(outcome.record.output_fingerprint, fingerprint("web_app"));
        assert!(ctx.lineage().is_empty());
        assert!(ctx.lineage().provenance(&path("domain")).is_none());
        assert!(sink.is_empty());
    }

    #[test]
    fn emits_stage_recorded() {
        let sink = Arc::new(MemorySink::new());
        let tracker = LineageTracker::new(12, Emitter::new(sink.clone()));
        let mut ctx = PipelineContext::new();
        tracker.record_origin(&mut ctx, "plan", &path("domain"), "web_app");

        let events = sink.events_named("stage.recorded");
        assert_eq!(events.len(), 1);
        match &events[0] {
            DiagnosticEvent::StageRecorded {
                run_id,
                output_fingerprint,
                ..
            } => {
                assert_eq!(*run_id, ctx.run_id());
                assert_eq!(output_fingerprint.as_str().len(), 12);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
