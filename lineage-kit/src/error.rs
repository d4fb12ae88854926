//! Error types for lineage-kit operations
//!
//! Only contract loading and an explicit blocking-boundary halt surface as
//! errors. Tracking faults are recovered in place and audit findings are
//! ordinary result values.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::Direction;

/// Lineage-kit result type alias
pub type Result<T> = std::result::Result<T, LineageError>;

/// Lineage-kit error taxonomy
#[derive(Debug, Error)]
pub enum LineageError {
    // --- Contract-declaration errors (fatal at pipeline startup) ---
    #[error("Unknown operation kind: {0}")]
    UnknownOperation(String),

    #[error("Invalid field path: {0:?}")]
    InvalidFieldPath(String),

    #[error("Chain {chain_id} declares more than one stage for phase {phase}")]
    DuplicateStage { chain_id: String, phase: String },

    #[error("Chain {chain_id} declares no stages")]
    EmptyChain { chain_id: String },

    #[error("Chain {chain_id} declares an Origin stage at position {position}; only the first stage may be Origin")]
    MisplacedOrigin { chain_id: String, position: usize },

    #[error("Chain id {0} is declared more than once")]
    DuplicateChain(String),

    #[error("Field {0} is declared more than once")]
    DuplicateField(String),

    #[error("Failed to read contract {path}: {source}")]
    ContractRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse contract: {0}")]
    ContractParse(String),

    #[error("Contract schema validation failed: {0}")]
    ContractSchema(String),

    // --- Boundary violations ---
    #[error("Blocking field {field} missing at {direction} of phase {phase}")]
    BlockingFieldMissing {
        phase: String,
        direction: Direction,
        field: String,
    },

    #[error("Unknown chain id: {0}")]
    UnknownChain(String),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

impl LineageError {
    /// Whether the error belongs to the contract-declaration class.
    pub fn is_contract_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownOperation(_)
                | Self::InvalidFieldPath(_)
                | Self::DuplicateStage { .. }
                | Self::EmptyChain { .. }
                | Self::MisplacedOrigin { .. }
                | Self::DuplicateChain(_)
                | Self::DuplicateField(_)
                | Self::ContractRead { .. }
                | Self::ContractParse(_)
                | Self::ContractSchema(_)
        )
    }
}

impl From<toml::de::Error> for LineageError {
    fn from(err: toml::de::Error) -> Self {
        LineageError::ContractParse(err.to_string())
    }
}

impl From<serde_json::Error> for LineageError {
    fn from(err: serde_json::Error) -> Self {
        LineageError::ContractParse(err.to_string())
    }
}
