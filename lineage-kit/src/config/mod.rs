/// Layered engine configuration
///
/// 1. Defaults (from code)
/// 2. Config file (lineage.toml)
/// 3. Environment variables (LINEAGE_* prefix, `__` for nesting)
///
/// # Example
///
/// ```no_run
/// use lineage_kit::config::ConfigLoader;
///
/// let config = ConfigLoader::load_default()?;
///
/// let config = ConfigLoader::new()
///     .with_file("./lineage.toml")
///     .load()?;
/// # Ok::<(), lineage_kit::config::ConfigError>(())
/// ```
pub mod error;
pub mod loader;
pub mod validator;

pub use error::{ConfigError, Result};
pub use loader::{
    BoundaryConfig, ConfigLoader, EngineConfig, FingerprintConfig, ForensicsConfig,
    TelemetryConfig, ValidationConfig,
};
pub use validator::SchemaValidator;
