//! Shared identifiers and name handling.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Schema used to qualify bare basket and transition names.
pub const DEFAULT_SCHEMA: &str = "streams";

/// Stable identifier of a registered transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransitionId(pub u64);

/// Stable identifier of a basket. A basket dropped and re-registered under
/// the same name receives a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BasketId(pub u64);

impl fmt::Display for TransitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

impl fmt::Display for BasketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// Normalize a name: trimmed and lower-cased.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Qualify a name with [`DEFAULT_SCHEMA`] unless it already carries a schema.
#[must_use]
pub fn qualify_name(name: &str) -> String {
    let name = normalize_name(name);
    if name.contains('.') {
        name
    } else {
        format!("{DEFAULT_SCHEMA}.{name}")
    }
}

/// Candidate keys for a lookup: the exact (normalized) name first, then its
/// schema-qualified alias.
#[must_use]
pub fn lookup_keys(name: &str) -> [String; 2] {
    [normalize_name(name), qualify_name(name)]
}
