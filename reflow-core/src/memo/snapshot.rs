//! Dependency Snapshots
//!
//! A snapshot is the caller's statement of "these are the inputs my
//! computation depends on". The memoization slot compares the snapshot it
//! stored at compute time against the one supplied on the next call; a
//! mismatch means the cached value is stale.
//!
//! # Comparison Rules
//!
//! 1. Different lengths always compare as changed. A snapshot whose length
//!    varies between calls is caller misuse, so it is also logged.
//!
//! 2. Equal lengths compare element-wise. Each token carries its own
//!    comparison semantics: identity tokens compare by a caller-assigned
//!    id, value tokens compare by a structural hash, text tokens compare
//!    by string content.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use smallvec::SmallVec;
use tracing::warn;

/// One opaque comparison token inside a [`DependencySnapshot`].
///
/// The constructor chosen encodes the comparison semantics: identity is the
/// default, structural comparison is opt-in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DepToken {
    /// Compared by a caller-assigned identity. Use this for values where
    /// "same object" is the interesting question, e.g. a callback or a
    /// shared handle.
    Ident(u64),

    /// Compared by a structural hash of the value, computed at construction
    /// time via [`DepToken::value`].
    Value(u64),

    /// Compared by string content.
    Text(String),
}

impl DepToken {
    /// Identity token with a caller-assigned id.
    pub fn ident(id: u64) -> Self {
        Self::Ident(id)
    }

    /// Structural token: hashes the value now, compares hashes later.
    pub fn value<T: Hash + ?Sized>(value: &T) -> Self {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        Self::Value(hasher.finish())
    }

    /// Text token, compared by content.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Identity token derived from a pointer, for `Arc`-held callables and
    /// other shared objects whose address is their identity.
    pub fn ptr<T: ?Sized>(value: &T) -> Self {
        Self::Ident(value as *const T as *const () as usize as u64)
    }
}

/// An ordered sequence of comparison tokens captured at computation time.
///
/// Snapshots are short in practice, so tokens are stored inline.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DependencySnapshot {
    tokens: SmallVec<[DepToken; 4]>,
}

impl DependencySnapshot {
    /// An empty snapshot. Memoizing against it means "compute exactly once".
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from an ordered collection of tokens.
    pub fn of(tokens: impl IntoIterator<Item = DepToken>) -> Self {
        Self {
            tokens: tokens.into_iter().collect(),
        }
    }

    /// Append a token to the snapshot.
    pub fn push(&mut self, token: DepToken) {
        self.tokens.push(token);
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Compare this (incoming) snapshot against a previously stored one.
    ///
    /// Returns `true` iff the cached value guarded by `stored` is still
    /// valid. A length change is unconditionally a mismatch and is logged
    /// as caller misuse.
    pub fn matches(&self, stored: &DependencySnapshot) -> bool {
        if self.tokens.len() != stored.tokens.len() {
            warn!(
                stored_len = stored.tokens.len(),
                new_len = self.tokens.len(),
                "dependency snapshot length changed between calls; forcing recompute"
            );
            return false;
        }
        self.tokens == stored.tokens
    }
}

impl FromIterator<DepToken> for DependencySnapshot {
    fn from_iter<I: IntoIterator<Item = DepToken>>(iter: I) -> Self {
        Self::of(iter)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
