//! Core vocabulary shared by every lineage-kit module
//!
//! Field paths, operation kinds, severities and the two status enums. The
//! status enums are deliberately separate: `ChainStatus` answers "did the value
//! arrive?", `LineageStatus` answers "is its history provably unbroken?".

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LineageError;

// ============================================================================
// Field paths
// ============================================================================

/// Dot-addressed identifier into the shared pipeline context
/// (e.g. `domain.classification`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath(String);

impl FieldPath {
    /// Parse and validate a dot path.
    ///
    /// Segments must be non-empty; leading, trailing and doubled dots are rejected.
    pub fn parse(raw: impl Into<String>) -> Result<Self, LineageError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.split('.').any(str::is_empty) {
            return Err(LineageError::InvalidFieldPath(raw));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Individual path segments in order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for FieldPath {
    type Err = LineageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FieldPath {
    type Error = LineageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.0
    }
}

// ============================================================================
// Operations
// ============================================================================

/// Kind of transformation a phase applied to a tracked value.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// First write of a field; carries no input fingerprint
    Origin,
    /// Value must leave the phase unchanged
    Passthrough,
    /// Value reshaped into something new
    Transform,
    /// New field computed from an existing one
    Derive,
    /// Several inputs folded into one output
    Aggregate,
    /// Subset of the input retained
    Filter,
}

impl Operation {
    /// All operations in declaration order
    pub fn all() -> [Self; 6] {
        [
            Self::Origin,
            Self::Passthrough,
            Self::Transform,
            Self::Derive,
            Self::Aggregate,
            Self::Filter,
        ]
    }

    /// Wire name (lowercase)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Origin => "origin",
            Self::Passthrough => "passthrough",
            Self::Transform => "transform",
            Self::Derive => "derive",
            Self::Aggregate => "aggregate",
            Self::Filter => "filter",
        }
    }

    /// Human-readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Origin => "Origin",
            Self::Passthrough => "Passthrough",
            Self::Transform => "Transform",
            Self::Derive => "Derive",
            Self::Aggregate => "Aggregate",
            Self::Filter => "Filter",
        }
    }

    /// Whether the output fingerprint is expected to equal the input fingerprint.
    pub fn preserves_value(&self) -> bool {
        matches!(self, Self::Passthrough)
    }

    /// Whether a record of this kind carries an input fingerprint.
    pub fn has_input(&self) -> bool {
        !matches!(self, Self::Origin)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Operation {
    type Err = LineageError;

    /// Case-insensitive; accepts both wire and display names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "origin" => Ok(Self::Origin),
            "passthrough" | "pass_through" => Ok(Self::Passthrough),
            "transform" => Ok(Self::Transform),
            "derive" => Ok(Self::Derive),
            "aggregate" => Ok(Self::Aggregate),
            "filter" => Ok(Self::Filter),
            _ => Err(LineageError::UnknownOperation(s.to_string())),
        }
    }
}

// ============================================================================
// Boundary vocabulary
// ============================================================================

/// How hard a missing field hits the pipeline.
///
/// Only `Blocking` may halt the enclosing pipeline.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Blocking,
    #[default]
    Warning,
    Advisory,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blocking => "blocking",
            Self::Warning => "warning",
            Self::Advisory => "advisory",
        }
    }

    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Blocking)
    }
}

/// Which edge of a phase a boundary check runs on.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Entry,
    Exit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Exit => "exit",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of one boundary check.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryStatus {
    /// Present and not a sentinel value
    Propagated,
    /// Absent, default written into the context
    Defaulted,
    /// Absent with no default available
    Missing,
}

impl BoundaryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Propagated => "propagated",
            Self::Defaulted => "defaulted",
            Self::Missing => "missing",
        }
    }
}

// ============================================================================
// Status summaries
// ============================================================================

/// Presence outcome of a propagation chain.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStatus {
    Intact,
    Degraded,
    Broken,
}

impl ChainStatus {
    /// Fold boundary outcomes: any missing breaks the chain, any default degrades it.
    pub fn from_statuses<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = BoundaryStatus>,
    {
        let mut status = Self::Intact;
        for outcome in statuses {
            match outcome {
                BoundaryStatus::Missing => return Self::Broken,
                BoundaryStatus::Defaulted => status = Self::Degraded,
                BoundaryStatus::Propagated => {}
            }
        }
        status
    }
}

/// Hash-chain audit outcome of a lineage chain.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineageStatus {
    Verified,
    MutationDetected,
    ChainBroken,
    Incomplete,
}

impl LineageStatus {
    pub fn all() -> [Self; 4] {
        [
            Self::Verified,
            Self::MutationDetected,
            Self::ChainBroken,
            Self::Incomplete,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Verified => "verified",
            Self::MutationDetected => "mutation_detected",
            Self::ChainBroken => "chain_broken",
            Self::Incomplete => "incomplete",
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified)
    }
}

impl fmt::Display for LineageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Categorical confidence attached to a forensic diagnosis.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,   // >= 0.80
    Medium, // >= 0.65
    Low,    // < 0.65
}

impl ConfidenceLevel {
    /// Compute confidence level from numeric value
    pub fn from_value(value: f32) -> Self {
        if value >= 0.80 {
            Self::High
        } else if value >= 0.65 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_path_rejects_empty_segments() {
        assert!(FieldPath::parse("domain.classification").is_ok());
        assert!(FieldPath::parse("").is_err());
        assert!(FieldPath::parse(".domain").is_err());
        assert!(FieldPath::parse("domain.").is_err());
        assert!(FieldPath::parse("domain..kind").is_err());
    }

    #[test]
    fn field_path_segments() {
        let path = FieldPath::parse("a.b.c").expect("valid path");
        assert_eq!(path.segments().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn operation_parse_is_case_insensitive() {
        assert_eq!("Transform".parse::<Operation>().ok(), Some(Operation::Transform));
        assert_eq!("PASSTHROUGH".parse::<Operation>().ok(), Some(Operation::Passthrough));
        assert!(matches!(
            "teleport".parse::<Operation>(),
            Err(LineageError::UnknownOperation(_))
        ));
    }

    #[test]
    fn only_origin_lacks_input() {
        for op in Operation::all() {
            assert_eq!(op.has_input(), op != Operation::Origin);
        }
    }

    #[test]
    fn chain_status_folds_boundary_results() {
        use BoundaryStatus::*;
        assert_eq!(ChainStatus::from_statuses([Propagated, Propagated]), ChainStatus::Intact);
        assert_eq!(ChainStatus::from_statuses([Propagated, Defaulted]), ChainStatus::Degraded);
        assert_eq!(ChainStatus::from_statuses([Defaulted, Missing]), ChainStatus::Broken);
        assert_eq!(ChainStatus::from_statuses([]), ChainStatus::Intact);
    }

    #[test]
    fn confidence_thresholds() {
        assert_eq!(ConfidenceLevel::from_value(0.95), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_value(0.70), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_value(0.30), ConfidenceLevel::Low);
    }
}
