//! Resource Keys
//!
//! A key canonically identifies one async operation's cached result: the
//! operation name plus its parameters, serialized to a deterministic JSON
//! string. Two subscribes with the same operation and structurally equal
//! parameters land on the same cache entry.
//!
//! Determinism caveat: struct parameters serialize in field declaration
//! order, which is stable. Callers using map parameters should prefer
//! `BTreeMap` so key order is stable too.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Parameter canonicalization failed.
#[derive(Debug, Error)]
#[error("failed to canonicalize parameters for `{op}`: {source}")]
pub struct KeyError {
    op: String,
    #[source]
    source: serde_json::Error,
}

/// Canonical identifier for one async operation's cached result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    op: String,
    params: String,
}

impl ResourceKey {
    /// Build a key from an operation name and serializable parameters.
    pub fn new(op: impl Into<String>, params: &impl Serialize) -> Result<Self, KeyError> {
        let op = op.into();
        let params = serde_json::to_string(params).map_err(|source| KeyError {
            op: op.clone(),
            source,
        })?;
        Ok(Self { op, params })
    }

    /// Build a key for a parameterless operation.
    pub fn bare(op: impl Into<String>) -> Self {
        Self {
            op: op.into(),
            params: "null".to_string(),
        }
    }

    pub fn op(&self) -> &str {
        &self.op
    }

    /// The canonical JSON form of the parameters.
    pub fn params_json(&self) -> &str {
        &self.params
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.op, self.params)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Serialize)]
    struct UserQuery {
        id: u64,
        include_posts: bool,
    }

    #[test]
    fn equal_params_produce_equal_keys() {
        let a = ResourceKey::new(
            "user",
            &UserQuery {
                id: 7,
                include_posts: true,
            },
        )
        .unwrap();
        let b = ResourceKey::new(
            "user",
            &UserQuery {
                id: 7,
                include_posts: true,
            },
        )
        .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_params_produce_different_keys() {
        let a = ResourceKey::new("user", &7u64).unwrap();
        let b = ResourceKey::new("user", &8u64).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn same_params_different_op_differ() {
        let a = ResourceKey::new("user", &7u64).unwrap();
        let b = ResourceKey::new("post", &7u64).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn bare_key_matches_null_params() {
        let a = ResourceKey::bare("health");
        let b = ResourceKey::new("health", &()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn display_is_canonical() {
        let key = ResourceKey::new("user", &7u64).unwrap();
        assert_eq!(key.to_string(), "user(7)");
    }

    #[test]
    fn unserializable_params_error() {
        // serde_json rejects maps with non-string-convertible keys.
        let mut params: HashMap<(u32, u32), u32> = HashMap::new();
        params.insert((1, 2), 3);
        let err = ResourceKey::new("bad", &params).unwrap_err();
        assert!(err.to_string().contains("bad"));
    }
}
