use std::path::PathBuf;
use thiserror::Error;

/// Failures while assembling an [`EngineConfig`](crate::config::EngineConfig)
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A layer (defaults, file or `LINEAGE_*` environment) could not be merged
    /// or deserialized into the engine settings.
    #[error("Failed to merge lineage config layers: {0}")]
    Layer(String),

    #[error("Lineage config file does not exist: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Settings could not be encoded as JSON, either as the defaults layer
    /// or for schema validation.
    #[error("Failed to encode engine settings: {0}")]
    Encode(String),

    /// The embedded engine schema itself is unusable.
    #[error("Engine config schema unavailable: {0}")]
    SchemaUnavailable(String),

    /// Settings loaded but violate the engine schema.
    #[error(
        "Engine config rejected ({}):\n  - {}",
        violation_count(.violations),
        .violations.join("\n  - ")
    )]
    Invalid { violations: Vec<String> },
}

fn violation_count(violations: &[String]) -> String {
    match violations.len() {
        1 => "1 violation".to_string(),
        n => format!("{n} violations"),
    }
}

impl ConfigError {
    /// Schema violations, empty for every other kind of failure.
    pub fn violations(&self) -> &[String] {
        match self {
            Self::Invalid { violations } => violations,
            _ => &[],
        }
    }
}

/// Type alias for Results using ConfigError
pub type Result<T> = std::result::Result<T, ConfigError>;

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Layer(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Encode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_lists_every_violation() {
        let err = ConfigError::Invalid {
            violations: vec![
                "4 is less than the minimum of 8 at '/fingerprint/length'".to_string(),
                "0 is less than the minimum of 1 at '/forensics/max_depth'".to_string(),
            ],
        };
        let text = err.to_string();
        assert!(text.starts_with("Engine config rejected (2 violations)"), "{text}");
        assert!(text.contains("/forensics/max_depth"));
        assert_eq!(err.violations().len(), 2);
    }

    #[test]
    fn other_failures_carry_no_violations() {
        let err = ConfigError::FileNotFound(PathBuf::from("/nope/lineage.toml"));
        assert!(err.violations().is_empty());
        assert!(err.to_string().contains("/nope/lineage.toml"));
    }
}
