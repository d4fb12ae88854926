use crate::config::error::{ConfigError, Result};
use crate::config::loader::EngineConfig;
use jsonschema::{Draft, JSONSchema};
use serde_json::Value;

/// Schema validator for the engine configuration
pub struct SchemaValidator {
    engine_schema: JSONSchema,
}

impl SchemaValidator {
    /// Compile the embedded Draft 7 schema
    pub fn new() -> Result<Self> {
        let schema_str = include_str!("schemas/engine_config.schema.json");
        let schema_value: Value = serde_json::from_str(schema_str).map_err(|e| {
            ConfigError::SchemaUnavailable(format!("parse: {e}"))
        })?;

        let engine_schema = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&schema_value)
            .map_err(|e| {
                ConfigError::SchemaUnavailable(format!("compile: {e}"))
            })?;

        Ok(Self { engine_schema })
    }

    /// Validate an EngineConfig, listing every failure in the error message
    ///
    /// ```no_run
    /// use lineage_kit::config::{EngineConfig, SchemaValidator};
    ///
    /// let validator = SchemaValidator::new()?;
    /// validator.validate(&EngineConfig::default())?;
    /// # Ok::<(), lineage_kit::config::ConfigError>(())
    /// ```
    pub fn validate(&self, config: &EngineConfig) -> Result<()> {
        let config_value = serde_json::to_value(config).map_err(|e| {
            ConfigError::Encode(e.to_string())
        })?;

        if let Err(errors) = self.engine_schema.validate(&config_value) {
            let violations: Vec<String> = errors
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

            return Err(ConfigError::Invalid { violations });
        }

        Ok(())
    }
}
