use jsonschema::{Draft, JSONSchema};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

use crate::contract::model::{
    AuditRequirements, ContractModel, FieldSpec, LineageChainSpec, StageSpec,
};
use crate::error::{LineageError, Result};
use crate::types::{FieldPath, Operation, Severity};

/// Source document format
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContractFormat {
    Toml,
    Json,
}

impl ContractFormat {
    /// Infer from a file extension; anything but `.json` is read as TOML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Toml,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawContract {
    pipeline: String,
    #[serde(default)]
    fields: Vec<RawField>,
    #[serde(default)]
    chains: Vec<RawChain>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawField {
    path: String,
    #[serde(default)]
    severity: Severity,
    #[serde(default)]
    default: Option<Value>,
    #[serde(default)]
    phases: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawChain {
    chain_id: String,
    tracked_field: String,
    stages: Vec<RawStage>,
    #[serde(default)]
    audit_requirements: AuditRequirements,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStage {
    phase: String,
    // Kept as text so unknown kinds surface as `UnknownOperation`.
    operation: String,
    #[serde(default)]
    input_path: Option<String>,
    #[serde(default)]
    output_path: Option<String>,
    #[serde(default)]
    expected_type: Option<String>,
}

/// Loads contract documents into a validated [`ContractModel`].
///
/// Unknown keys are rejected twice: by the embedded JSON Schema
/// (`additionalProperties: false`) and by `deny_unknown_fields` on the raw
/// document types, so the policy holds even with schema validation disabled.
pub struct ContractLoader {
    schema_validation: bool,
}

impl ContractLoader {
    pub fn new() -> Self {
        Self {
            schema_validation: true,
        }
    }

    /// Skip the JSON Schema pass (serde still rejects unknown keys).
    pub fn without_schema_validation(mut self) -> Self {
        self.schema_validation = false;
        self
    }

    /// Read and load a contract file; the format follows the extension.
    pub fn load_path<P: AsRef<Path>>(&self, path: P) -> Result<ContractModel> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| LineageError::ContractRead {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "Loading lineage contract");
        self.load_str(&text, ContractFormat::from_path(path))
    }

    pub fn load_str(&self, text: &str, format: ContractFormat) -> Result<ContractModel> {
        let document = match format {
            ContractFormat::Json => serde_json::from_str::<Value>(text)?,
            ContractFormat::Toml => {
                let table: toml::Table = toml::from_str(text)?;
                serde_json::to_value(table)?
            }
        };
        self.load_value(document)
    }

    pub fn load_value(&self, document: Value) -> Result<ContractModel> {
        if self.schema_validation {
            validate_against_schema(&document)?;
        }
        let raw: RawContract = serde_json::from_value(document)?;
        let contract = build_model(raw)?;

        tracing::info!(
            pipeline = contract.pipeline(),
            fields = contract.fields().len(),
            chains = contract.chains().len(),
            "Lineage contract loaded"
        );
        Ok(contract)
    }
}

impl Default for ContractLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_against_schema(document: &Value) -> Result<()> {
    let schema_str = include_str!("schemas/contract.schema.json");
    let schema_value: Value = serde_json::from_str(schema_str)
        .map_err(|e| LineageError::ContractSchema(format!("Failed to parse contract schema: {e}")))?;

    let schema = JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(&schema_value)
        .map_err(|e| LineageError::ContractSchema(format!("Failed to compile contract schema: {e}")))?;

    if let Err(errors) = schema.validate(document) {
        let error_messages: Vec<String> = errors
            .map(|e| {
                let path_str = e.instance_path.to_string();
                let path = if path_str.is_empty() {
                    "root".to_string()
                } else {
                    path_str
                };
                format!("{e} at '{path}'")
            })
            .collect();

        return Err(LineageError::ContractSchema(format!(
            "{} error{}:\n  - {}",
            error_messages.len(),
            if error_messages.len() == 1 { "" } else { "s" },
            error_messages.join("\n  - ")
        )));
    }
    Ok(())
}

fn build_model(raw: RawContract) -> Result<ContractModel> {
    let fields = raw
        .fields
        .into_iter()
        .map(|f| -> Result<FieldSpec> {
            Ok(FieldSpec {
                path: FieldPath::parse(f.path)?,
                severity: f.severity,
                default: f.default,
                phases: f.phases,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let chains = raw
        .chains
        .into_iter()
        .map(build_chain)
        .collect::<Result<Vec<_>>>()?;

    ContractModel::new(raw.pipeline, fields, chains)
}

fn build_chain(raw: RawChain) -> Result<LineageChainSpec> {
    let tracked_field = FieldPath::parse(raw.tracked_field)?;
    let stages = raw
        .stages
        .into_iter()
        .map(|s| -> Result<StageSpec> {
            let operation: Operation = s.operation.parse()?;
            let input_path = match s.input_path {
                Some(p) => FieldPath::parse(p)?,
                None => tracked_field.clone(),
            };
            let output_path = match s.output_path {
                Some(p) => FieldPath::parse(p)?,
                None => tracked_field.clone(),
            };
            Ok(StageSpec {
                phase: s.phase,
                operation,
                input_path,
                output_path,
                expected_type: s.expected_type,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(LineageChainSpec {
        chain_id: raw.chain_id,
        tracked_field,
        stages,
        audit_requirements: raw.audit_requirements,
    })
}
