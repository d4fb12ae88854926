//! Forensic tracing
//!
//! Starting from a field that turned out wrong, walk its history backward
//! looking for the first record that breaks the link or passthrough
//! invariant. A clean history whose earliest record was derived from another
//! field continues the search in that field; if the upstream is clean too the
//! derivation itself is the suspect.
//!
//! The report is evidence with a confidence score, not a proof of causation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::context::PipelineContext;
use crate::fingerprint::{Fingerprint, fingerprint_with_len};
use crate::graph::LineageGraph;
use crate::tracker::{LineageState, TransformationRecord};
use crate::types::{ConfidenceLevel, FieldPath, Operation};

const MUTATION_CONFIDENCE: f32 = 0.95;
const BROKEN_LINK_CONFIDENCE: f32 = 0.90;
const DERIVATION_CONFIDENCE: f32 = 0.60;
const DEGRADED_OUTPUT_BONUS: f32 = 0.15;
const ORIGIN_CONFIDENCE: f32 = 0.30;

/// What kind of evidence located the break point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakKind {
    PassthroughMutation,
    BrokenLink,
    Derivation,
    Origin,
}

/// The phase pair where lineage was lost.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakPoint {
    pub kind: BreakKind,
    pub previous_phase: Option<String>,
    pub phase: String,
    pub field: FieldPath,
    pub sequence: u64,
}

/// One record visited during the trace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailStep {
    pub field: FieldPath,
    pub phase: String,
    pub operation: Operation,
    pub sequence: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForensicReport {
    pub failing_field: FieldPath,
    pub break_point: Option<BreakPoint>,
    pub suspect_phase: Option<String>,
    pub suspect_operation: Option<Operation>,
    pub expected_fingerprint: Option<Fingerprint>,
    pub actual_fingerprint: Option<Fingerprint>,
    pub contributing_fields: Vec<FieldPath>,
    pub recommendation: String,
    pub confidence: f32,
    pub confidence_level: ConfidenceLevel,
    pub trail: Vec<TrailStep>,
    /// Hops into upstream fields
    pub steps: usize,
}

impl ForensicReport {
    pub fn is_conclusive(&self) -> bool {
        matches!(
            self.break_point.as_ref().map(|b| b.kind),
            Some(BreakKind::PassthroughMutation | BreakKind::BrokenLink)
        )
    }
}

#[derive(Clone, Debug)]
struct Finding {
    kind: BreakKind,
    previous: Option<TransformationRecord>,
    record: TransformationRecord,
    expected: Option<Fingerprint>,
    actual: Option<Fingerprint>,
}

struct Walk<'a> {
    lineage: &'a LineageState,
    visited: HashSet<FieldPath>,
    trail: Vec<TrailStep>,
    steps: usize,
}

/// Reconstructs the causal chain behind a failing field.
#[derive(Clone, Debug)]
pub struct ForensicAnalyzer {
    max_depth: usize,
    degraded: HashSet<Fingerprint>,
}

impl ForensicAnalyzer {
    /// `sentinels` are the strings counted as degraded values in addition to
    /// `null`, `""`, `[]` and `{}`.
    pub fn new<I, S>(max_depth: usize, fingerprint_len: usize, sentinels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut degraded: HashSet<Fingerprint> = [
            Value::Null,
            Value::String(String::new()),
            Value::Array(Vec::new()),
            Value::Object(serde_json::Map::new()),
        ]
        .iter()
        .map(|v| fingerprint_with_len(v, fingerprint_len))
        .collect();
        degraded.extend(
            sentinels
                .into_iter()
                .map(|s| fingerprint_with_len(s.as_ref().trim().to_lowercase().as_str(), fingerprint_len)),
        );

        Self {
            max_depth,
            degraded,
        }
    }

    pub fn trace(&self, failing_field: &FieldPath, ctx: &PipelineContext) -> ForensicReport {
        let lineage = ctx.lineage();
        let mut walk = Walk {
            lineage,
            visited: HashSet::new(),
            trail: Vec::new(),
            steps: 0,
        };
        let finding = self.walk_field(&mut walk, failing_field, 0, None);

        let graph = LineageGraph::from_state(lineage);
        let contributing_fields: Vec<FieldPath> = graph.ancestors(failing_field).into_iter().collect();

        let confidence = match &finding {
            None => 0.0,
            Some(f) => match f.kind {
                BreakKind::PassthroughMutation => MUTATION_CONFIDENCE,
                BreakKind::BrokenLink => BROKEN_LINK_CONFIDENCE,
                BreakKind::Derivation if self.is_degraded(&f.record.output_fingerprint) => {
                    DERIVATION_CONFIDENCE + DEGRADED_OUTPUT_BONUS
                }
                BreakKind::Derivation => DERIVATION_CONFIDENCE,
                BreakKind::Origin => ORIGIN_CONFIDENCE,
            },
        };

        let recommendation = self.recommend(failing_field, finding.as_ref());

        let report = ForensicReport {
            failing_field: failing_field.clone(),
            break_point: finding.as_ref().map(|f| BreakPoint {
                kind: f.kind,
                previous_phase: f.previous.as_ref().map(|p| p.phase.clone()),
                phase: f.record.phase.clone(),
                field: f.record.output_field_path.clone(),
                sequence: f.record.sequence,
            }),
            suspect_phase: finding.as_ref().map(|f| f.record.phase.clone()),
            suspect_operation: finding.as_ref().map(|f| f.record.operation),
            expected_fingerprint: finding.as_ref().and_then(|f| f.expected.clone()),
            actual_fingerprint: finding.as_ref().and_then(|f| f.actual.clone()),
            contributing_fields,
            recommendation,
            confidence,
            confidence_level: ConfidenceLevel::from_value(confidence),
            trail: walk.trail,
            steps: walk.steps,
        };

        tracing::info!(
            field = %failing_field,
            suspect = report.suspect_phase.as_deref().unwrap_or("none"),
            confidence = report.confidence,
            steps = report.steps,
            "Forensic trace complete"
        );
        report
    }

    /// Walk `field` backward. Upstream walks pass `before`, the sequence of
    /// the derivation that read the field; later writes cannot explain it.
    fn walk_field(
        &self,
        walk: &mut Walk<'_>,
        field: &FieldPath,
        depth: usize,
        before: Option<u64>,
    ) -> Option<Finding> {
        if !walk.visited.insert(field.clone()) {
            return None;
        }
        let lineage = walk.lineage;
        let full = lineage.history(field);
        let history = match before {
            Some(ceiling) => &full[..full.partition_point(|r| r.sequence < ceiling)],
            None => full,
        };
        let earliest = history.first()?;

        for record in history.iter().rev() {
            walk.trail.push(TrailStep {
                field: field.clone(),
                phase: record.phase.clone(),
                operation: record.operation,
                sequence: record.sequence,
            });
            if let Some(finding) = check_record(lineage, record) {
                return Some(finding);
            }
        }

        if !earliest.crosses_fields() {
            return Some(Finding {
                kind: BreakKind::Origin,
                previous: None,
                record: earliest.clone(),
                expected: None,
                actual: Some(earliest.output_fingerprint.clone()),
            });
        }

        if depth < self.max_depth {
            walk.steps += 1;
            let upstream = self.walk_field(
                walk,
                &earliest.input_field_path,
                depth + 1,
                Some(earliest.sequence),
            );
            if let Some(finding) = upstream
                && finding.kind != BreakKind::Origin
                && finding.kind != BreakKind::Derivation
            {
                return Some(finding);
            }
        } else {
            tracing::debug!(field = %field, depth, "Forensic depth limit reached");
        }

        Some(Finding {
            kind: BreakKind::Derivation,
            previous: predecessor_of(lineage, earliest).cloned(),
            record: earliest.clone(),
            expected: earliest.input_fingerprint.clone(),
            actual: Some(earliest.output_fingerprint.clone()),
        })
    }

    fn is_degraded(&self, fp: &Fingerprint) -> bool {
        self.degraded.contains(fp)
    }

    fn recommend(&self, field: &FieldPath, finding: Option<&Finding>) -> String {
        let Some(f) = finding else {
            return format!(
                "No transformations were recorded for '{field}'; add lineage tracking to the phases that write it."
            );
        };
        let phase = &f.record.phase;
        let previous = f
            .previous
            .as_ref()
            .map(|p| p.phase.as_str())
            .unwrap_or("an earlier phase");
        let operation = f.record.operation.display_name();

        match f.kind {
            BreakKind::PassthroughMutation => format!(
                "Phase '{phase}' declared a passthrough of '{}' but changed its value; record the change as a Transform or stop mutating the field.",
                f.record.output_field_path
            ),
            BreakKind::BrokenLink => format!(
                "Phase '{phase}' consumed '{}' with a different value than '{previous}' produced; a write between these phases went unrecorded.",
                f.record.input_field_path
            ),
            BreakKind::Derivation => {
                let mut text = format!(
                    "'{}' was produced from '{}' by a {operation} in phase '{phase}' and the upstream lineage is clean; inspect that {operation} step.",
                    f.record.output_field_path, f.record.input_field_path
                );
                if self.is_degraded(&f.record.output_fingerprint) {
                    text.push_str(" Its output was an empty or placeholder value.");
                }
                text
            }
            BreakKind::Origin => format!(
                "No lineage violation found; '{field}' originates in phase '{phase}'. Check the value produced there."
            ),
        }
    }
}

/// Latest record produced before `record` for the field it consumes.
fn predecessor_of<'a>(lineage: &'a LineageState, record: &TransformationRecord) -> Option<&'a TransformationRecord> {
    lineage
        .history(&record.input_field_path)
        .iter()
        .rev()
        .find(|r| r.sequence < record.sequence)
}

fn check_record(lineage: &LineageState, record: &TransformationRecord) -> Option<Finding> {
    if record.operation == Operation::Origin {
        return None;
    }
    let previous = predecessor_of(lineage, record);

    if record.operation == Operation::Passthrough {
        let expected = record
            .input_fingerprint
            .clone()
            .or_else(|| previous.map(|p| p.output_fingerprint.clone()));
        if let Some(expected) = expected
            && expected != record.output_fingerprint
        {
            return Some(Finding {
                kind: BreakKind::PassthroughMutation,
                previous: previous.cloned(),
                record: record.clone(),
                expected: Some(expected),
                actual: Some(record.output_fingerprint.clone()),
            });
        }
    }

    if let Some(prev) = previous
        && record.input_fingerprint.as_ref() != Some(&prev.output_fingerprint)
    {
        return Some(Finding {
            kind: BreakKind::BrokenLink,
            previous: Some(prev.clone()),
            record: record.clone(),
            expected: Some(prev.output_fingerprint.clone()),
            actual: record.input_fingerprint.clone(),
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::Emitter;
    use crate::tracker::LineageTracker;
    use serde_json::json;

    fn path(raw: &str) -> FieldPath {
        FieldPath::parse(raw).expect("valid path")
    }

    fn analyzer() -> ForensicAnalyzer {
        ForensicAnalyzer::new(16, 16, ["unknown", "none", "n/a"])
    }

    #[test]
    fn no_history_has_zero_confidence() {
        let ctx = PipelineContext::new();
        let report = analyzer().trace(&path("domain"), &ctx);
        assert!(report.break_point.is_none());
        assert_eq!(report.confidence, 0.0);
        assert_eq!(report.confidence_level, ConfidenceLevel::Low);
        assert!(report.recommendation.contains("No transformations"));
    }

    #[test]
    fn clean_origin_is_low_confidence_suspect() {
        let mut ctx = PipelineContext::new();
        let tracker = LineageTracker::new(16, Emitter::noop());
        tracker.record_origin(&mut ctx, "plan", &path("domain"), "web_app");

        let report = analyzer().trace(&path("domain"), &ctx);
        assert_eq!(report.suspect_phase.as_deref(), Some("plan"));
        assert_eq!(report.break_point.map(|b| b.kind), Some(BreakKind::Origin));
        assert_eq!(report.confidence_level, ConfidenceLevel::Low);
    }

    #[test]
    fn latest_violation_is_reported_first() {
        let mut ctx = PipelineContext::new();
        let tracker = LineageTracker::new(16, Emitter::noop());
        let domain = path("domain");
        tracker.record_origin(&mut ctx, "plan", &domain, "a");
        tracker.record(&mut ctx, "scaffold", Operation::Passthrough, &domain, &domain, Some("a"), "b");
        tracker.record(&mut ctx, "design", Operation::Passthrough, &domain, &domain, Some("b"), "c");

        let report = analyzer().trace(&domain, &ctx);
        let bp = report.break_point.expect("break point");
        assert_eq!(bp.kind, BreakKind::PassthroughMutation);
        assert_eq!(bp.phase, "design");
        assert_eq!(bp.previous_phase.as_deref(), Some("scaffold"));
        assert_eq!(report.confidence_level, ConfidenceLevel::High);
        assert_eq!(report.trail.len(), 1);
    }

    #[test]
    fn degraded_derivation_gets_bonus() {
        let mut ctx = PipelineContext::new();
        let tracker = LineageTracker::new(16, Emitter::noop());
        tracker.record_origin(&mut ctx, "plan", &path("domain"), "web_app");
        tracker.record(
            &mut ctx,
            "implement",
            Operation::Transform,
            &path("domain"),
            &path("constraints"),
            Some("web_app"),
            &json!({}),
        );

        let report = analyzer().trace(&path("constraints"), &ctx);
        assert_eq!(report.suspect_phase.as_deref(), Some("implement"));
        assert_eq!(report.suspect_operation, Some(Operation::Transform));
        assert!((report.confidence - 0.75).abs() < f32::EPSILON);
        assert_eq!(report.confidence_level, ConfidenceLevel::Medium);
        assert_eq!(report.steps, 1);
        assert_eq!(report.contributing_fields, vec![path("domain")]);
        assert!(report.recommendation.contains("placeholder"));
    }

    #[test]
    fn later_upstream_writes_do_not_explain_derivation() {
        let mut ctx = PipelineContext::new();
        let tracker = LineageTracker::new(16, Emitter::noop());
        let domain = path("domain");
        tracker.record_origin(&mut ctx, "plan", &domain, "web_app");
        tracker.record(
            &mut ctx,
            "implement",
            Operation::Transform,
            &domain,
            &path("constraints"),
            Some("web_app"),
            &json!({}),
        );
        tracker.record(&mut ctx, "ship", Operation::Passthrough, &domain, &domain, Some("web_app"), "cli");

        let report = analyzer().trace(&path("constraints"), &ctx);
        let bp = report.break_point.expect("break point");
        assert_eq!(bp.kind, BreakKind::Derivation);
        assert_eq!(bp.phase, "implement");
        assert_eq!(report.confidence_level, ConfidenceLevel::Medium);
        assert!(report.trail.iter().all(|step| step.phase != "ship"));

        // The mutation is still found when domain itself is traced.
        let direct = analyzer().trace(&domain, &ctx);
        assert_eq!(direct.suspect_phase.as_deref(), Some("ship"));
        assert_eq!(direct.break_point.map(|b| b.kind), Some(BreakKind::PassthroughMutation));
    }

    #[test]
    fn depth_limit_stops_recursion() {
        let mut ctx = PipelineContext::new();
        let tracker = LineageTracker::new(16, Emitter::noop());
        tracker.record_origin(&mut ctx, "p0", &path("f0"), &json!(0));
        for i in 1..=5 {
            let from = path(&format!("f{}", i - 1));
            let to = path(&format!("f{i}"));
            tracker.record(&mut ctx, &format!("p{i}"), Operation::Derive, &from, &to, Some(&json!(i - 1)), &json!(i));
        }

        let shallow = ForensicAnalyzer::new(2, 16, Vec::<String>::new()).trace(&path("f5"), &ctx);
        assert_eq!(shallow.steps, 2);
        assert_eq!(shallow.suspect_phase.as_deref(), Some("p5"));

        let deep = analyzer().trace(&path("f5"), &ctx);
        assert_eq!(deep.steps, 5);
        assert_eq!(deep.break_point.map(|b| b.kind), Some(BreakKind::Derivation));
    }
}
