//! Provenance auditing
//!
//! Compares a recorded history against its declared chain: which stages never
//! recorded, where consecutive fingerprints disagree, and which passthroughs
//! changed their value. Auditing is pure; findings are values, not errors.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::context::PipelineContext;
use crate::contract::{AuditRequirements, ContractModel, LineageChainSpec};
use crate::fingerprint::Fingerprint;
use crate::telemetry::{DiagnosticEvent, Emitter};
use crate::tracker::TransformationRecord;
use crate::types::{FieldPath, LineageStatus, Operation};

/// Consecutive records whose fingerprints do not connect.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokenLink {
    pub from_index: usize,
    pub to_index: usize,
    pub from_phase: String,
    pub to_phase: String,
    /// Output fingerprint of the earlier record
    pub expected: Fingerprint,
    /// Input fingerprint of the later record, if it has one
    pub actual: Option<Fingerprint>,
}

/// A passthrough whose output differs from its input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnrecordedMutation {
    pub index: usize,
    pub previous_phase: Option<String>,
    pub phase: String,
    pub field: FieldPath,
    pub expected: Fingerprint,
    pub actual: Fingerprint,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineageAuditResult {
    pub chain_id: String,
    pub status: LineageStatus,
    pub missing_stages: Vec<String>,
    pub broken_links: Vec<BrokenLink>,
    pub unrecorded_mutations: Vec<UnrecordedMutation>,
    pub coverage_pct: f64,
    pub records_examined: usize,
    pub requirements: AuditRequirements,
}

impl LineageAuditResult {
    /// Whether the findings breach the chain's declared requirements.
    pub fn violates_requirements(&self) -> bool {
        (self.requirements.every_stage_recorded && !self.missing_stages.is_empty())
            || (self.requirements.no_unrecorded_mutation && !self.unrecorded_mutations.is_empty())
            || (self.requirements.hash_chain_intact && !self.broken_links.is_empty())
    }

    /// Earliest offending phase in recording order.
    ///
    /// Falls back to the first missing stage when no recorded phase offends.
    pub fn first_broken_phase(&self) -> Option<&str> {
        let by_link = self.broken_links.iter().map(|l| (l.to_index, l.to_phase.as_str()));
        let by_mutation = self
            .unrecorded_mutations
            .iter()
            .map(|m| (m.index, m.phase.as_str()));
        by_link
            .chain(by_mutation)
            .min_by_key(|(index, _)| *index)
            .map(|(_, phase)| phase)
            .or_else(|| self.missing_stages.first().map(String::as_str))
    }
}

/// Nearest earlier record producing the field `history[index]` consumes.
pub(crate) fn predecessor(history: &[TransformationRecord], index: usize) -> Option<usize> {
    let current = history.get(index)?;
    history[..index]
        .iter()
        .rposition(|r| r.output_field_path == current.input_field_path)
}

/// Audit one chain against its recorded history.
///
/// A stage counts as recorded only when its phase wrote the stage's output
/// field; deriving some other field in that phase does not cover it.
pub fn audit(chain: &LineageChainSpec, history: &[TransformationRecord]) -> LineageAuditResult {
    let missing_stages: Vec<String> = chain
        .stages
        .iter()
        .filter(|stage| {
            !history
                .iter()
                .any(|r| r.phase == stage.phase && r.output_field_path == stage.output_path)
        })
        .map(|stage| stage.phase.clone())
        .collect();

    let mut broken_links = Vec::new();
    let mut unrecorded_mutations = Vec::new();

    for (index, current) in history.iter().enumerate() {
        if current.operation == Operation::Origin {
            continue;
        }
        let previous = predecessor(history, index).map(|p| (p, &history[p]));

        if let Some((from_index, prev)) = previous
            && current.input_fingerprint.as_ref() != Some(&prev.output_fingerprint)
        {
            broken_links.push(BrokenLink {
                from_index,
                to_index: index,
                from_phase: prev.phase.clone(),
                to_phase: current.phase.clone(),
                expected: prev.output_fingerprint.clone(),
                actual: current.input_fingerprint.clone(),
            });
        }

        if current.operation == Operation::Passthrough {
            let expected = current
                .input_fingerprint
                .clone()
                .or_else(|| previous.map(|(_, prev)| prev.output_fingerprint.clone()));
            if let Some(expected) = expected
                && expected != current.output_fingerprint
            {
                unrecorded_mutations.push(UnrecordedMutation {
                    index,
                    previous_phase: previous.map(|(_, prev)| prev.phase.clone()),
                    phase: current.phase.clone(),
                    field: current.output_field_path.clone(),
                    expected,
                    actual: current.output_fingerprint.clone(),
                });
            }
        }
    }

    let requirements = chain.audit_requirements;
    let status = if !missing_stages.is_empty() && requirements.every_stage_recorded {
        LineageStatus::Incomplete
    } else if !unrecorded_mutations.is_empty() {
        LineageStatus::MutationDetected
    } else if !broken_links.is_empty() {
        LineageStatus::ChainBroken
    } else {
        LineageStatus::Verified
    };

    let declared = chain.stages.len();
    let coverage_pct = if declared == 0 {
        100.0
    } else {
        (declared - missing_stages.len()) as f64 / declared as f64 * 100.0
    };

    LineageAuditResult {
        chain_id: chain.chain_id.clone(),
        status,
        missing_stages,
        broken_links,
        unrecorded_mutations,
        coverage_pct,
        records_examined: history.len(),
        requirements,
    }
}

/// Emit `chain.verified` or `chain.broken` for one result.
pub fn emit_audit_result(result: &LineageAuditResult, run_id: Uuid, emitter: &Emitter) {
    if result.status.is_verified() {
        emitter.emit(DiagnosticEvent::ChainVerified {
            run_id,
            chain_id: result.chain_id.clone(),
            coverage_pct: result.coverage_pct,
        });
    } else {
        tracing::warn!(
            chain_id = %result.chain_id,
            status = %result.status,
            missing = result.missing_stages.len(),
            broken_links = result.broken_links.len(),
            mutations = result.unrecorded_mutations.len(),
            "Lineage chain not verified"
        );
        emitter.emit(DiagnosticEvent::ChainBroken {
            run_id,
            chain_id: result.chain_id.clone(),
            status: result.status,
            first_broken_phase: result.first_broken_phase().map(str::to_string),
            missing_stages: result.missing_stages.len(),
            broken_links: result.broken_links.len(),
            unrecorded_mutations: result.unrecorded_mutations.len(),
        });
    }
}

/// Results of auditing every declared chain of a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub results: Vec<LineageAuditResult>,
    pub totals_by_status: BTreeMap<LineageStatus, usize>,
    pub integrity_pct: f64,
}

impl AuditSummary {
    pub fn all_verified(&self) -> bool {
        self.results.iter().all(|r| r.status.is_verified())
    }

    pub fn result(&self, chain_id: &str) -> Option<&LineageAuditResult> {
        self.results.iter().find(|r| r.chain_id == chain_id)
    }

    pub fn count(&self, status: LineageStatus) -> usize {
        self.totals_by_status.get(&status).copied().unwrap_or(0)
    }
}

/// Audit every chain of `contract` against the run in `ctx`.
pub fn audit_all(contract: &ContractModel, ctx: &PipelineContext, emitter: &Emitter) -> AuditSummary {
    let results: Vec<LineageAuditResult> = contract
        .chains()
        .iter()
        .map(|chain| {
            let result = audit(chain, &ctx.lineage().chain_history(chain));
            emit_audit_result(&result, ctx.run_id(), emitter);
            result
        })
        .collect();

    let mut totals_by_status: BTreeMap<LineageStatus, usize> =
        LineageStatus::all().into_iter().map(|s| (s, 0)).collect();
    for result in &results {
        *totals_by_status.entry(result.status).or_default() += 1;
    }

    let verified = totals_by_status
        .get(&LineageStatus::Verified)
        .copied()
        .unwrap_or(0);
    let integrity_pct = if results.is_empty() {
        100.0
    } else {
        verified as f64 / results.len() as f64 * 100.0
    };

    emitter.emit(DiagnosticEvent::AuditComplete {
        run_id: ctx.run_id(),
        totals: totals_by_status
            .iter()
            .map(|(status, count)| (status.as_str().to_string(), *count))
            .collect(),
        integrity_pct,
    });

    tracing::info!(
        pipeline = contract.pipeline(),
        chains = results.len(),
        integrity_pct,
        "Lineage audit complete"
    );

    AuditSummary {
        results,
        totals_by_status,
        integrity_pct,
    }
}
