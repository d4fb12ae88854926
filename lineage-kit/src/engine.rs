//! Engine facade
//!
//! Binds one contract, one configuration and one emitter. The orchestrator
//! creates a context per run and calls the engine at each phase edge, after
//! each value it wants stamped, and at checkpoints.

use std::path::Path;
use std::sync::Arc;

use crate::auditor::{self, AuditSummary, LineageAuditResult};
use crate::boundary::{BoundaryReport, BoundaryValidator, SentinelSet};
use crate::config::EngineConfig;
use crate::context::PipelineContext;
use crate::contract::{ContractLoader, ContractModel};
use crate::error::{LineageError, Result};
use crate::forensics::{ForensicAnalyzer, ForensicReport};
use crate::graph::LineageGraph;
use crate::measure_time;
use crate::telemetry::{Emitter, EventSink};
use crate::tracker::{LineageTracker, RecordOutcome};
use crate::types::{ChainStatus, Direction, FieldPath, Operation};
use crate::VERSION;

/// Main entry point for lineage operations
#[derive(Debug)]
pub struct LineageEngine {
    contract: ContractModel,
    config: EngineConfig,
    sentinels: SentinelSet,
    emitter: Emitter,
    tracker: LineageTracker,
    analyzer: ForensicAnalyzer,
}

impl LineageEngine {
    /// Create an engine with no telemetry sink.
    pub fn new(contract: ContractModel, config: EngineConfig) -> Self {
        Self::build(contract, config, Emitter::noop())
    }

    /// Load the contract at `path`, honouring the configured schema validation.
    pub fn load<P: AsRef<Path>>(path: P, config: EngineConfig) -> Result<Self> {
        let mut loader = ContractLoader::new();
        if !config.validation.schema_validation {
            loader = loader.without_schema_validation();
        }
        let contract = loader.load_path(path)?;
        Ok(Self::new(contract, config))
    }

    /// Attach a telemetry sink; ignored when `telemetry.enabled` is off.
    pub fn with_sink(self, sink: Arc<dyn EventSink>) -> Self {
        let emitter = if self.config.telemetry.enabled {
            Emitter::new(sink)
        } else {
            tracing::debug!("Telemetry disabled; sink not attached");
            Emitter::noop()
        };
        Self::build(self.contract, self.config, emitter)
    }

    fn build(contract: ContractModel, config: EngineConfig, emitter: Emitter) -> Self {
        if !config.enabled {
            tracing::info!("Lineage engine is disabled via configuration");
        }
        let emitter = if config.enabled { emitter } else { Emitter::noop() };

        let mut tracker = LineageTracker::new(config.fingerprint.length, emitter.clone());
        if !config.enabled {
            tracker = tracker.detached();
        }
        let analyzer = ForensicAnalyzer::new(
            config.forensics.max_depth,
            config.fingerprint.length,
            &config.boundary.sentinels,
        );

        tracing::info!(
            version = VERSION,
            pipeline = contract.pipeline(),
            fields = contract.fields().len(),
            chains = contract.chains().len(),
            telemetry = emitter.is_enabled(),
            "Lineage engine initialized"
        );

        Self {
            sentinels: SentinelSet::from_config(&config.boundary),
            contract,
            config,
            emitter,
            tracker,
            analyzer,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn contract(&self) -> &ContractModel {
        &self.contract
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fresh context for a new run.
    pub fn new_context(&self) -> PipelineContext {
        PipelineContext::new()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Boundaries
    // ─────────────────────────────────────────────────────────────────────────

    pub fn check_entry(&self, ctx: &mut PipelineContext, phase: &str) -> BoundaryReport {
        self.check(ctx, phase, Direction::Entry)
    }

    pub fn check_exit(&self, ctx: &mut PipelineContext, phase: &str) -> BoundaryReport {
        self.check(ctx, phase, Direction::Exit)
    }

    fn check(&self, ctx: &mut PipelineContext, phase: &str, direction: Direction) -> BoundaryReport {
        if !self.config.enabled {
            return BoundaryReport {
                phase: phase.to_string(),
                direction,
                results: Vec::new(),
                verdict: crate::boundary::BoundaryVerdict::Continue,
            };
        }
        BoundaryValidator::new(
            &self.contract,
            &self.sentinels,
            self.config.boundary.apply_defaults,
            &self.emitter,
        )
        .check(ctx, phase, direction)
    }

    /// Presence summary of `field` across the boundaries checked so far.
    pub fn chain_status(&self, ctx: &PipelineContext, field: &FieldPath) -> ChainStatus {
        ctx.propagation().chain_status(field)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tracking
    // ─────────────────────────────────────────────────────────────────────────

    /// See [`LineageTracker::record`].
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
        self.tracker
            .record(ctx, phase, operation, input_path, output_path, input_value, output_value)
    }

    pub fn record_origin<O>(&self, ctx: &mut PipelineContext, phase: &str, path: &FieldPath, value: &O) -> RecordOutcome
    where
        O: serde::Serialize + ?Sized,
    {
        self.tracker.record_origin(ctx, phase, path, value)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Audit & forensics
    // ─────────────────────────────────────────────────────────────────────────

    /// Audit one declared chain.
    pub fn audit_chain(&self, ctx: &PipelineContext, chain_id: &str) -> Result<LineageAuditResult> {
        let chain = self
            .contract
            .chain(chain_id)
            .ok_or_else(|| LineageError::UnknownChain(chain_id.to_string()))?;
        let result = auditor::audit(chain, &ctx.lineage().chain_history(chain));
        auditor::emit_audit_result(&result, ctx.run_id(), &self.emitter);
        Ok(result)
    }

    /// Audit every declared chain and emit the summary.
    pub fn audit_all(&self, ctx: &PipelineContext) -> AuditSummary {
        measure_time!("lineage_audit_all", {
            auditor::audit_all(&self.contract, ctx, &self.emitter)
        })
    }

    /// Trace `field` backward to the most likely break point.
    pub fn trace(&self, ctx: &PipelineContext, field: &FieldPath) -> ForensicReport {
        measure_time!("lineage_trace", { self.analyzer.trace(field, ctx) })
    }

    /// Cross-field graph of everything recorded so far.
    pub fn graph(&self, ctx: &PipelineContext) -> LineageGraph {
        LineageGraph::from_state(ctx.lineage())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{FieldSpec, LineageChainSpec, StageSpec};
    use crate::telemetry::MemorySink;
    use crate::types::{LineageStatus, Severity};
    use serde_json::json;

    fn path(raw: &str) -> FieldPath {
        FieldPath::parse(raw).expect("valid path")
    }

    fn contract() -> ContractModel {
        let domain = path("domain");
        let chain = LineageChainSpec::new(
            "domain_chain",
            domain.clone(),
            vec![
                StageSpec::new("plan", Operation::Origin, domain.clone(), domain.clone()),
                StageSpec::new("scaffold", Operation::Passthrough, domain.clone(), domain.clone()),
            ],
        );
        ContractModel::new(
            "codegen",
            vec![FieldSpec::new(domain, Severity::Blocking)],
            vec![chain],
        )
        .expect("contract")
    }

    #[test]
    fn unknown_chain_is_an_error() {
        let engine = LineageEngine::new(contract(), EngineConfig::default());
        let ctx = engine.new_context();
        assert!(matches!(
            engine.audit_chain(&ctx, "nope"),
            Err(LineageError::UnknownChain(_))
        ));
    }

    #[test]
    fn audit_chain_emits_verdict() {
        let sink = Arc::new(MemorySink::new());
        let engine = LineageEngine::new(contract(), EngineConfig::default()).with_sink(sink.clone());
        let mut ctx = engine.new_context();
        let domain = path("domain");

        engine.record_origin(&mut ctx, "plan", &domain, "web_app");
        engine.record(&mut ctx, "scaffold", Operation::Passthrough, &domain, &domain, Some("web_app"), "web_app");

        let result = engine.audit_chain(&ctx, "domain_chain").expect("known chain");
        assert_eq!(result.status, LineageStatus::Verified);
        assert_eq!(sink.events_named("stage.recorded").len(), 2);
        assert_eq!(sink.events_named("chain.verified").len(), 1);
    }

    #[test]
    fn telemetry_switch_detaches_sink() {
        let sink = Arc::new(MemorySink::new());
        let mut config = EngineConfig::default();
        config.telemetry.enabled = false;
        let engine = LineageEngine::new(contract(), config).with_sink(sink.clone());
        let mut ctx = engine.new_context();
        engine.record_origin(&mut ctx, "plan", &path("domain"), "web_app");
        assert!(sink.is_empty());
        assert_eq!(ctx.lineage().record_count(), 1);
    }

    #[test]
    fn disabled_engine_leaves_context_alone() {
        let mut config = EngineConfig::default();
        config.enabled = false;
        let engine = LineageEngine::new(contract(), config);
        let mut ctx = engine.new_context();

        let report = engine.check_entry(&mut ctx, "plan");
        assert!(report.results.is_empty());
        assert!(!report.is_halt());

        let outcome = engine.record_origin(&mut ctx, "plan", &path("domain"), &json!("web_app"));
        assert!(!outcome.best_effort);
        assert!(ctx.lineage().is_empty());
        assert!(ctx.propagation().is_empty());
    }
}
