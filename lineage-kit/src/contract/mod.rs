//! Declared propagation and lineage contracts
//!
//! The contract names the fields that must survive each phase boundary and the
//! ordered stages expected to touch each tracked field. Contract syntax is
//! owned upstream; this module fixes the semantics and enforces the load-time
//! rules (unknown keys and operation kinds rejected, one stage per phase).
//!
//! ```no_run
//! use lineage_kit::contract::ContractLoader;
//!
//! let contract = ContractLoader::new()
//!     .load_path("pipeline.lineage.toml")
//!     .expect("contract should load");
//! println!("{} chains", contract.chains().len());
//! ```

pub mod loader;
pub mod model;

pub use loader::{ContractFormat, ContractLoader};
pub use model::{AuditRequirements, ContractModel, FieldSpec, LineageChainSpec, StageSpec};
