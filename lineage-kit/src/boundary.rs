//! Boundary validation
//!
//! Each (phase, direction, field) key moves once from "not checked" to a
//! terminal [`BoundaryStatus`]. A repeated check of the same key returns the
//! recorded outcome without reading the context again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::config::BoundaryConfig;
use crate::context::PipelineContext;
use crate::contract::ContractModel;
use crate::error::{LineageError, Result};
use crate::telemetry::{DiagnosticEvent, Emitter};
use crate::types::{BoundaryStatus, ChainStatus, Direction, FieldPath, Severity};

/// Outcome of checking one declared field at one phase edge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundaryCheckResult {
    pub phase: String,
    pub direction: Direction,
    pub field: FieldPath,
    pub status: BoundaryStatus,
    pub severity: Severity,
    pub checked_at: DateTime<Utc>,
}

impl BoundaryCheckResult {
    /// Missing with blocking severity
    pub fn is_blocking_failure(&self) -> bool {
        self.status == BoundaryStatus::Missing && self.severity.is_blocking()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct BoundaryKey {
    phase: String,
    direction: Direction,
    field: FieldPath,
}

/// Engine-owned propagation slot of the pipeline context.
#[derive(Clone, Debug, Default)]
pub struct PropagationState {
    outcomes: BTreeMap<BoundaryKey, BoundaryCheckResult>,
    log: Vec<BoundaryCheckResult>,
}

impl PropagationState {
    /// Every evaluated result in evaluation order.
    pub fn log(&self) -> &[BoundaryCheckResult] {
        &self.log
    }

    pub fn outcome(&self, phase: &str, direction: Direction, field: &FieldPath) -> Option<&BoundaryCheckResult> {
        self.outcomes.get(&BoundaryKey {
            phase: phase.to_string(),
            direction,
            field: field.clone(),
        })
    }

    /// Presence summary across every boundary this field was checked at.
    pub fn chain_status(&self, field: &FieldPath) -> ChainStatus {
        ChainStatus::from_statuses(
            self.log
                .iter()
                .filter(|r| &r.field == field)
                .map(|r| r.status),
        )
    }

    /// Fields with at least one `Missing` or `Defaulted` result.
    pub fn degraded_fields(&self) -> Vec<&FieldPath> {
        let mut fields: Vec<&FieldPath> = self
            .log
            .iter()
            .filter(|r| r.status != BoundaryStatus::Propagated)
            .map(|r| &r.field)
            .collect();
        fields.sort();
        fields.dedup();
        fields
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    fn insert(&mut self, key: BoundaryKey, result: BoundaryCheckResult) {
        self.log.push(result.clone());
        self.outcomes.insert(key, result);
    }
}

/// What the orchestrator should do after a boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum BoundaryVerdict {
    Continue,
    Halt { field: FieldPath },
}

/// All results of one boundary check and the resulting verdict.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundaryReport {
    pub phase: String,
    pub direction: Direction,
    pub results: Vec<BoundaryCheckResult>,
    pub verdict: BoundaryVerdict,
}

impl BoundaryReport {
    fn empty(phase: &str, direction: Direction) -> Self {
        Self {
            phase: phase.to_string(),
            direction,
            results: Vec::new(),
            verdict: BoundaryVerdict::Continue,
        }
    }

    pub fn is_halt(&self) -> bool {
        matches!(self.verdict, BoundaryVerdict::Halt { .. })
    }

    pub fn missing(&self) -> impl Iterator<Item = &BoundaryCheckResult> {
        self.results
            .iter()
            .filter(|r| r.status == BoundaryStatus::Missing)
    }

    pub fn defaulted(&self) -> impl Iterator<Item = &BoundaryCheckResult> {
        self.results
            .iter()
            .filter(|r| r.status == BoundaryStatus::Defaulted)
    }

    /// Turn a halt verdict into `LineageError::BlockingFieldMissing`.
    pub fn into_result(self) -> Result<Self> {
        match &self.verdict {
            BoundaryVerdict::Continue => Ok(self),
            BoundaryVerdict::Halt { field } => Err(LineageError::BlockingFieldMissing {
                phase: self.phase.clone(),
                direction: self.direction,
                field: field.to_string(),
            }),
        }
    }
}

/// Values that count as absent even though a key is present.
#[derive(Clone, Debug, PartialEq)]
pub struct SentinelSet {
    strings: Vec<String>,
    empty_collections: bool,
}

impl SentinelSet {
    pub fn new<I, S>(strings: I, empty_collections: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            strings: strings
                .into_iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .collect(),
            empty_collections,
        }
    }

    pub fn from_config(config: &BoundaryConfig) -> Self {
        Self::new(&config.sentinels, config.empty_collections_absent)
    }

    /// `null` is always a sentinel.
    pub fn is_sentinel(&self, value: &Value) -> bool {
        match value {
            Value::Null => true,
            Value::String(s) => {
                let normalized = s.trim().to_lowercase();
                self.strings.iter().any(|sentinel| *sentinel == normalized)
            }
            Value::Array(items) => self.empty_collections && items.is_empty(),
            Value::Object(map) => self.empty_collections && map.is_empty(),
            Value::Bool(_) | Value::Number(_) => false,
        }
    }
}

impl Default for SentinelSet {
    fn default() -> Self {
        Self::from_config(&BoundaryConfig::default())
    }
}

/// Checks declared fields at phase entry and exit.
#[derive(Debug)]
pub struct BoundaryValidator<'a> {
    contract: &'a ContractModel,
    sentinels: &'a SentinelSet,
    apply_defaults: bool,
    emitter: &'a Emitter,
}

impl<'a> BoundaryValidator<'a> {
    pub fn new(
        contract: &'a ContractModel,
        sentinels: &'a SentinelSet,
        apply_defaults: bool,
        emitter: &'a Emitter,
    ) -> Self {
        Self {
            contract,
            sentinels,
            apply_defaults,
            emitter,
        }
    }

    /// Check every field declared for `phase`.
    ///
    /// Evaluation covers all applicable fields even after a blocking miss;
    /// the verdict names the first blocking field in declaration order.
    pub fn check(
        &self,
        ctx: &mut PipelineContext,
        phase: &str,
        direction: Direction,
    ) -> BoundaryReport {
        let mut report = BoundaryReport::empty(phase, direction);

        for field in self.contract.fields_for_phase(phase) {
            let key = BoundaryKey {
                phase: phase.to_string(),
                direction,
                field: field.path.clone(),
            };

            if let Some(previous) = ctx.propagation().outcomes.get(&key) {
                report.results.push(previous.clone());
                continue;
            }

            let present = ctx
                .get(&field.path)
                .is_some_and(|value| !self.sentinels.is_sentinel(value));

            let status = if present {
                BoundaryStatus::Propagated
            } else if let Some(default) = field.default.as_ref().filter(|_| self.apply_defaults) {
                ctx.set(&field.path, default.clone());
                BoundaryStatus::Defaulted
            } else {
                BoundaryStatus::Missing
            };

            match status {
                BoundaryStatus::Propagated => {
                    tracing::trace!(phase, %direction, field = %field.path, "Field propagated");
                }
                BoundaryStatus::Defaulted => {
                    tracing::debug!(phase, %direction, field = %field.path, "Field absent, default applied");
                }
                BoundaryStatus::Missing => {
                    tracing::warn!(
                        phase,
                        %direction,
                        field = %field.path,
                        severity = field.severity.as_str(),
                        "Declared field missing at boundary"
                    );
                }
            }

            let result = BoundaryCheckResult {
                phase: phase.to_string(),
                direction,
                field: field.path.clone(),
                status,
                severity: field.severity,
                checked_at: Utc::now(),
            };

            self.emitter.emit(DiagnosticEvent::BoundaryChecked {
                run_id: ctx.run_id(),
                phase: phase.to_string(),
                direction,
                field: field.path.clone(),
                status,
                severity: field.severity,
            });

            ctx.propagation_mut().insert(key, result.clone());
            report.results.push(result);
        }

        if let Some(blocking) = report.results.iter().find(|r| r.is_blocking_failure()) {
            report.verdict = BoundaryVerdict::Halt {
                field: blocking.field.clone(),
            };
        }
        report
    }
}
