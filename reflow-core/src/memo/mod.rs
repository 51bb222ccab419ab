//! Memoization Primitives
//!
//! This module implements dependency-snapshot-keyed caching of computed
//! values and stable function identities.
//!
//! # Concepts
//!
//! ## Dependency Snapshots
//!
//! A [`DependencySnapshot`] is an ordered sequence of opaque comparison
//! tokens captured by the caller at computation time. Two snapshots are
//! equal iff they have the same length and every position compares equal.
//! A length change is always treated as "changed" (and logged, since it is
//! caller misuse rather than a legitimate invalidation).
//!
//! Snapshots are explicit by design: instead of reflecting over captured
//! variables, the caller constructs the tokens it wants compared. Identity
//! comparison is the default; structural comparison is opt-in per token.
//!
//! ## Slots
//!
//! A [`MemoSlot`] owns one cached entry. `memoize` computes on first call,
//! then returns the cached value unchanged as long as the snapshot matches.
//! Entries are replaced wholesale on recomputation, never mutated in place.
//!
//! [`StableRef`] is the same primitive specialized to caching function
//! identity: it hands back the same `Arc`'d callable across calls while the
//! snapshot is unchanged.
//!
//! ## Keyed cache
//!
//! [`MemoCache`] manages many named slots behind one object, for callers
//! that would otherwise hold a slot per call site.
//!
//! # Failure Semantics
//!
//! There are none to speak of: this module is pure computation caching.
//! Panics and errors from the compute closure propagate to the caller and
//! leave no stale entry behind, because the entry is only written after the
//! closure returns.

mod cache;
mod slot;
mod snapshot;

pub use cache::MemoCache;
pub use slot::{MemoSlot, StableRef};
pub use snapshot::{DepToken, DependencySnapshot};
