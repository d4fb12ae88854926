use crate::config::error::{ConfigError, Result};
use crate::fingerprint::DEFAULT_FINGERPRINT_LEN;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Master switch; a disabled engine leaves the context untouched
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub fingerprint: FingerprintConfig,

    #[serde(default)]
    pub boundary: BoundaryConfig,

    #[serde(default)]
    pub forensics: ForensicsConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub validation: ValidationConfig,
}

/// Fingerprint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintConfig {
    /// Digest length in hex characters (8-16)
    #[serde(default = "default_fingerprint_length")]
    pub length: usize,
}

/// Boundary validation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryConfig {
    /// Strings treated as absent (compared case-insensitively, after trimming)
    #[serde(default = "default_sentinels")]
    pub sentinels: Vec<String>,

    /// Treat `[]` and `{}` as absent
    #[serde(default = "default_true")]
    pub empty_collections_absent: bool,

    /// Write declared defaults into the context; when off, absent fields are `Missing`
    #[serde(default = "default_true")]
    pub apply_defaults: bool,
}

/// Forensic analysis settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForensicsConfig {
    /// Maximum recursive hops across derived fields
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

/// Telemetry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Forward events to the attached sink
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Validation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Validate the merged configuration and loaded contracts against their schemas
    #[serde(default = "default_true")]
    pub schema_validation: bool,
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_fingerprint_length() -> usize {
    DEFAULT_FINGERPRINT_LEN
}
fn default_sentinels() -> Vec<String> {
    vec![
        String::new(),
        "unknown".to_string(),
        "none".to_string(),
        "n/a".to_string(),
    ]
}
fn default_max_depth() -> usize {
    16
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            fingerprint: FingerprintConfig::default(),
            boundary: BoundaryConfig::default(),
            forensics: ForensicsConfig::default(),
            telemetry: TelemetryConfig::default(),
            validation: ValidationConfig::default(),
        }
    }
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            length: default_fingerprint_length(),
        }
    }
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            sentinels: default_sentinels(),
            empty_collections_absent: default_true(),
            apply_defaults: default_true(),
        }
    }
}

impl Default for ForensicsConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            schema_validation: default_true(),
        }
    }
}

/// Configuration loader with layered merging support
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load configuration with layered merging:
    /// 1. Defaults (from Default implementations)
    /// 2. Config file if provided
    /// 3. Environment variables (LINEAGE_ prefix)
    pub fn load(&self) -> Result<EngineConfig> {
        let mut builder = Config::builder();

        let defaults_json = serde_json::to_string(&EngineConfig::default())?;
        builder = builder.add_source(File::from_str(&defaults_json, config::FileFormat::Json));

        if let Some(ref path) = self.config_path {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_ref()));
            } else {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
        }

        // LINEAGE_FORENSICS__MAX_DEPTH=8, LINEAGE_BOUNDARY__SENTINELS=unknown,tbd
        builder = builder.add_source(
            Environment::with_prefix("LINEAGE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("boundary.sentinels"),
        );

        let config = builder.build()?;
        let engine_config: EngineConfig = config.try_deserialize()?;

        if engine_config.validation.schema_validation {
            let validator = crate::config::validator::SchemaValidator::new()?;
            validator.validate(&engine_config)?;
        }

        tracing::debug!(
            enabled = engine_config.enabled,
            fingerprint_len = engine_config.fingerprint.length,
            max_depth = engine_config.forensics.max_depth,
            "Engine configuration loaded"
        );
        Ok(engine_config)
    }

    /// Locate the default config file in standard locations:
    /// 1. Current directory: ./lineage.toml
    /// 2. XDG config: ~/.config/lineage/config.toml
    /// 3. Home directory: ~/.lineage.toml
    pub fn find_config_file() -> Option<PathBuf> {
        let cwd_config = PathBuf::from("./lineage.toml");
        if cwd_config.exists() {
            return Some(cwd_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("lineage").join("config.toml");
            if xdg_config.exists() {
                return Some(xdg_config);
            }
        }

        if let Some(home_dir) = dirs::home_dir() {
            let home_config = home_dir.join(".lineage.toml");
            if home_config.exists() {
                return Some(home_config);
            }
        }

        None
    }

    /// Load configuration from default locations
    pub fn load_default() -> Result<EngineConfig> {
        let loader = match Self::find_config_file() {
            Some(config_path) => ConfigLoader::new().with_file(config_path),
            None => ConfigLoader::new(),
        };
        loader.load()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use std::env;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.enabled);
        assert_eq!(config.fingerprint.length, 16);
        assert_eq!(config.forensics.max_depth, 16);
        assert!(config.boundary.apply_defaults);
        assert!(config.boundary.sentinels.contains(&"unknown".to_string()));
        assert!(config.telemetry.enabled);
        assert!(config.validation.schema_validation);
    }

    #[test]
    #[serial]
    fn test_load_with_defaults_only() {
        let config = ConfigLoader::new().load().expect("Failed to load default config");
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    #[serial]
    fn test_load_with_env_override() {
        unsafe {
            env::set_var("LINEAGE_FINGERPRINT__LENGTH", "12");
            env::set_var("LINEAGE_TELEMETRY__ENABLED", "false");
        }

        let config = ConfigLoader::new().load().expect("Failed to load config");

        unsafe {
            env::remove_var("LINEAGE_FINGERPRINT__LENGTH");
            env::remove_var("LINEAGE_TELEMETRY__ENABLED");
        }

        assert_eq!(config.fingerprint.length, 12);
        assert!(!config.telemetry.enabled);
    }

    #[test]
    #[serial]
    fn test_sentinels_from_env_list() {
        unsafe {
            env::set_var("LINEAGE_BOUNDARY__SENTINELS", "unknown,tbd");
        }

        let config = ConfigLoader::new().load().expect("Failed to load config");

        unsafe {
            env::remove_var("LINEAGE_BOUNDARY__SENTINELS");
        }

        assert_eq!(config.boundary.sentinels, vec!["unknown".to_string(), "tbd".to_string()]);
    }

    #[test]
    #[serial]
    fn test_layered_merging() {
        let toml_content = r#"
enabled = true

[forensics]
max_depth = 4

[boundary]
apply_defaults = false
"#;

        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("lineage.toml");
        std::fs::write(&config_path, toml_content).expect("Failed to write temp file");

        unsafe {
            env::set_var("LINEAGE_FORENSICS__MAX_DEPTH", "8");
        }

        let config = ConfigLoader::new()
            .with_file(&config_path)
            .load()
            .expect("Failed to load config");

        unsafe {
            env::remove_var("LINEAGE_FORENSICS__MAX_DEPTH");
        }

        // Env wins over file, file wins over defaults
        assert_eq!(config.forensics.max_depth, 8);
        assert!(!config.boundary.apply_defaults);
        assert_eq!(config.fingerprint.length, 16);
    }

    #[test]
    #[serial]
    fn test_out_of_range_length_fails_schema() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("lineage.toml");
        std::fs::write(&config_path, "[fingerprint]\nlength = 40\n").expect("write");

        let result = ConfigLoader::new().with_file(&config_path).load();
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_missing_file_error() {
        let result = ConfigLoader::new().with_file("/nonexistent/lineage.toml").load();
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }
}
