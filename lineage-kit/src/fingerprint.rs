//! Value fingerprints
//!
//! A fingerprint is a short hex digest of a value's canonical JSON text. It is
//! used for change detection across phase boundaries, not for security:
//! equal values always fingerprint equal, collisions are tolerated.
//!
//! The canonical form sorts object keys and drops insignificant whitespace, so
//! fingerprints do not depend on map iteration order or on serde_json features
//! enabled elsewhere in the build.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fmt::Write as _;
use thiserror::Error;

/// Default digest length in hex characters.
pub const DEFAULT_FINGERPRINT_LEN: usize = 16;
/// Shortest accepted digest length.
pub const MIN_FINGERPRINT_LEN: usize = 8;
/// Longest accepted digest length.
pub const MAX_FINGERPRINT_LEN: usize = 16;

const SENTINEL_DIGEST: &str = "0000000000000000";

/// Failure to produce a canonical representation.
#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("value has no canonical JSON form: {0}")]
    Unrepresentable(String),
}

/// Short deterministic digest of a value.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fixed fingerprint returned for values that cannot be serialized.
    pub fn sentinel(len: usize) -> Self {
        Self(SENTINEL_DIGEST[..clamp_len(len)].to_string())
    }

    pub fn is_sentinel(&self) -> bool {
        self.0.bytes().all(|b| b == b'0')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wrap an existing digest string (e.g. read back from an event log).
    pub fn from_digest(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn clamp_len(len: usize) -> usize {
    len.clamp(MIN_FINGERPRINT_LEN, MAX_FINGERPRINT_LEN)
}

/// Fingerprint any serializable value with the default length.
///
/// Total: unrepresentable values map to [`Fingerprint::sentinel`].
pub fn fingerprint<T: Serialize + ?Sized>(value: &T) -> Fingerprint {
    fingerprint_with_len(value, DEFAULT_FINGERPRINT_LEN)
}

/// Fingerprint with an explicit digest length (clamped to 8..=16).
pub fn fingerprint_with_len<T: Serialize + ?Sized>(value: &T, len: usize) -> Fingerprint {
    match try_fingerprint(value, len) {
        Ok(fp) => fp,
        Err(e) => {
            tracing::debug!(error = %e, "Falling back to sentinel fingerprint");
            Fingerprint::sentinel(len)
        }
    }
}

/// Fallible variant used by the tracker to flag best-effort records.
pub fn try_fingerprint<T: Serialize + ?Sized>(
    value: &T,
    len: usize,
) -> Result<Fingerprint, FingerprintError> {
    let tree =
        serde_json::to_value(value).map_err(|e| FingerprintError::Unrepresentable(e.to_string()))?;
    let text = canonical_json(&tree)?;
    Ok(fingerprint_canonical(&text, len))
}

/// Fingerprint text that is already in canonical form.
pub fn fingerprint_canonical(text: &str, len: usize) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();

    let len = clamp_len(len);
    let mut hex = String::with_capacity(len + 1);
    for byte in digest.iter().take(len.div_ceil(2)) {
        let _ = write!(hex, "{byte:02x}");
    }
    hex.truncate(len);
    Fingerprint(hex)
}

/// Render a JSON tree with sorted object keys and no whitespace.
pub fn canonical_json(value: &Value) -> Result<String, FingerprintError> {
    let mut out = String::new();
    write_canonical(value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut String) -> Result<(), FingerprintError> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(s, out)?,
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out)?;
                out.push(':');
                if let Some(item) = map.get(key) {
                    write_canonical(item, out)?;
                }
            }
            out.push('}');
        }
    }
    Ok(())
}

fn write_string(s: &str, out: &mut String) -> Result<(), FingerprintError> {
    let escaped =
        serde_json::to_string(s).map_err(|e| FingerprintError::Unrepresentable(e.to_string()))?;
    out.push_str(&escaped);
    Ok(())
}
