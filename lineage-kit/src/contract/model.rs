//! In-memory contract model.
//!
//! A contract declares which fields must survive which phase boundaries and,
//! per tracked field, the ordered transformation stages expected to touch it.
//! The model is validated once at construction and read-only afterwards.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::error::{LineageError, Result};
use crate::types::{FieldPath, Operation, Severity};

/// One expected transformation step in a lineage chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    pub phase: String,
    pub operation: Operation,
    pub input_path: FieldPath,
    pub output_path: FieldPath,
    /// Informational type hint (e.g. "object"); not enforced by the auditor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_type: Option<String>,
}

impl StageSpec {
    pub fn new(
        phase: impl Into<String>,
        operation: Operation,
        input_path: FieldPath,
        output_path: FieldPath,
    ) -> Self {
        Self {
            phase: phase.into(),
            operation,
            input_path,
            output_path,
            expected_type: None,
        }
    }

    pub fn with_expected_type(mut self, expected_type: impl Into<String>) -> Self {
        self.expected_type = Some(expected_type.into());
        self
    }
}

/// Which audit findings a chain treats as violations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRequirements {
    #[serde(default = "default_true")]
    pub every_stage_recorded: bool,
    #[serde(default = "default_true")]
    pub no_unrecorded_mutation: bool,
    #[serde(default = "default_true")]
    pub hash_chain_intact: bool,
}

fn default_true() -> bool {
    true
}

impl Default for AuditRequirements {
    fn default() -> Self {
        Self {
            every_stage_recorded: default_true(),
            no_unrecorded_mutation: default_true(),
            hash_chain_intact: default_true(),
        }
    }
}

/// Declared, ordered sequence of expected stages for one tracked field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineageChainSpec {
    pub chain_id: String,
    pub tracked_field: FieldPath,
    pub stages: Vec<StageSpec>,
    #[serde(default)]
    pub audit_requirements: AuditRequirements,
}

impl LineageChainSpec {
    pub fn new(chain_id: impl Into<String>, tracked_field: FieldPath, stages: Vec<StageSpec>) -> Self {
        Self {
            chain_id: chain_id.into(),
            tracked_field,
            stages,
            audit_requirements: AuditRequirements::default(),
        }
    }

    pub fn with_requirements(mut self, requirements: AuditRequirements) -> Self {
        self.audit_requirements = requirements;
        self
    }

    /// Declared phase names in order.
    pub fn phases(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(|s| s.phase.as_str())
    }

    /// Every field path a stage of this chain reads or writes.
    pub fn touched_fields(&self) -> HashSet<&FieldPath> {
        let mut fields = HashSet::new();
        fields.insert(&self.tracked_field);
        for stage in &self.stages {
            fields.insert(&stage.input_path);
            fields.insert(&stage.output_path);
        }
        fields
    }

    fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            return Err(LineageError::EmptyChain {
                chain_id: self.chain_id.clone(),
            });
        }

        let mut seen = HashSet::new();
        for (position, stage) in self.stages.iter().enumerate() {
            if !seen.insert(stage.phase.as_str()) {
                return Err(LineageError::DuplicateStage {
                    chain_id: self.chain_id.clone(),
                    phase: stage.phase.clone(),
                });
            }
            if position > 0 && stage.operation == Operation::Origin {
                return Err(LineageError::MisplacedOrigin {
                    chain_id: self.chain_id.clone(),
                    position,
                });
            }
        }
        Ok(())
    }
}

/// A field that must survive phase boundaries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub path: FieldPath,
    #[serde(default)]
    pub severity: Severity,
    /// Value written into the context when the field is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Phases whose boundaries check this field; empty means every phase.
    #[serde(default)]
    pub phases: Vec<String>,
}

impl FieldSpec {
    pub fn new(path: FieldPath, severity: Severity) -> Self {
        Self {
            path,
            severity,
            default: None,
            phases: Vec::new(),
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn at_phases<I, S>(mut self, phases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.phases = phases.into_iter().map(Into::into).collect();
        self
    }

    pub fn applies_to(&self, phase: &str) -> bool {
        self.phases.is_empty() || self.phases.iter().any(|p| p == phase)
    }
}

/// Validated propagation and lineage contract for one pipeline.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ContractModel {
    pipeline: String,
    fields: Vec<FieldSpec>,
    chains: Vec<LineageChainSpec>,
}

impl ContractModel {
    /// Build and validate a contract.
    ///
    /// Rejects duplicate fields, duplicate chain ids, empty chains, duplicate
    /// stages for one phase and `Origin` stages after the first position.
    pub fn new(
        pipeline: impl Into<String>,
        fields: Vec<FieldSpec>,
        chains: Vec<LineageChainSpec>,
    ) -> Result<Self> {
        let mut field_paths = HashSet::new();
        for field in &fields {
            if !field_paths.insert(&field.path) {
                return Err(LineageError::DuplicateField(field.path.to_string()));
            }
        }

        let mut chain_ids = HashSet::new();
        for chain in &chains {
            if !chain_ids.insert(chain.chain_id.as_str()) {
                return Err(LineageError::DuplicateChain(chain.chain_id.clone()));
            }
            chain.validate()?;
        }

        Ok(Self {
            pipeline: pipeline.into(),
            fields,
            chains,
        })
    }

    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn chains(&self) -> &[LineageChainSpec] {
        &self.chains
    }

    pub fn chain(&self, chain_id: &str) -> Option<&LineageChainSpec> {
        self.chains.iter().find(|c| c.chain_id == chain_id)
    }

    pub fn field(&self, path: &FieldPath) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| &f.path == path)
    }

    /// Fields checked at the boundaries of `phase`, in declaration order.
    pub fn fields_for_phase<'a>(&'a self, phase: &'a str) -> impl Iterator<Item = &'a FieldSpec> {
        self.fields.iter().filter(move |f| f.applies_to(phase))
    }
}
