//! Provenance & Lineage Engine for multi-phase pipelines
//!
//! Detects values that silently degrade, mutate without record, or lose
//! their causal history while flowing through sequential phases that share
//! one mutable context:
//! - boundary validation checks declared fields at every phase edge
//! - the tracker stamps each transformation with value fingerprints
//! - the auditor verifies the fingerprint chain against the declared stages
//! - forensics walks backward from a failing field to the break point
//!
//! ```no_run
//! use lineage_kit::{ConfigLoader, ContractLoader, FieldPath, LineageEngine, Operation};
//!
//! # fn main() -> lineage_kit::Result<()> {
//! let contract = ContractLoader::new().load_path("pipeline.lineage.toml")?;
//! let engine = LineageEngine::new(contract, ConfigLoader::load_default()?);
//! let mut ctx = engine.new_context();
//!
//! let domain = FieldPath::parse("domain")?;
//! engine.check_entry(&mut ctx, "plan").into_result()?;
//! ctx.set(&domain, "web_app".into());
//! engine.record_origin(&mut ctx, "plan", &domain, "web_app");
//! engine.check_exit(&mut ctx, "plan").into_result()?;
//!
//! let summary = engine.audit_all(&ctx);
//! if !summary.all_verified() {
//!     let report = engine.trace(&ctx, &domain);
//!     tracing::warn!(suspect = ?report.suspect_phase, "{}", report.recommendation);
//! }
//! # Ok(())
//! # }
//! ```

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod auditor;
pub mod boundary;
pub mod config;
pub mod context;
pub mod contract;
pub mod engine;
pub mod error;
#[cfg(feature = "dev-faults")]
pub mod faults;
pub mod fingerprint;
pub mod forensics;
pub mod graph;
pub mod telemetry;
pub mod timing;
pub mod tracker;
pub mod types;

pub use auditor::{AuditSummary, BrokenLink, LineageAuditResult, UnrecordedMutation, audit, audit_all};
pub use boundary::{
    BoundaryCheckResult, BoundaryReport, BoundaryValidator, BoundaryVerdict, PropagationState,
    SentinelSet,
};
pub use config::{ConfigError, ConfigLoader, EngineConfig};
pub use context::PipelineContext;
pub use contract::{
    AuditRequirements, ContractFormat, ContractLoader, ContractModel, FieldSpec, LineageChainSpec,
    StageSpec,
};
pub use engine::LineageEngine;
pub use error::{LineageError, Result};
pub use fingerprint::{Fingerprint, fingerprint, fingerprint_with_len};
pub use forensics::{BreakKind, BreakPoint, ForensicAnalyzer, ForensicReport, TrailStep};
pub use graph::{LineageEdge, LineageGraph};
pub use telemetry::{DiagnosticEvent, Emitter, EventSink, MemorySink, SinkError, TracingSink};
pub use tracker::{LineageState, LineageTracker, ProvenanceRecord, RecordOutcome, TransformationRecord};
pub use types::{
    BoundaryStatus, ChainStatus, ConfidenceLevel, Direction, FieldPath, LineageStatus, Operation,
    Severity,
};

/// Lineage-kit version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
