//! Shared-State Store
//!
//! This module implements a shared-state container with selector-scoped
//! subscriptions: updates to one slice of state do not notify subscribers
//! interested only in another slice.
//!
//! # Concepts
//!
//! ## Selectors
//!
//! A selector is a pure projection from the full state to the slice one
//! subscriber cares about. On every commit, each subscriber's selector runs
//! against the new state and its callback fires only when the selected
//! slice actually changed. This is what lets one store serve many consumers
//! without the notify-everyone-on-any-change failure mode.
//!
//! ## Slice equality
//!
//! Slices compare with `PartialEq`, which is structural for plain
//! aggregates. For opaque values where "same object" is the right question,
//! [`ByRef`] wraps an `Arc` with pointer-identity equality.
//!
//! ## Batching
//!
//! Multiple commits inside one [`Store::batch`] call coalesce into a single
//! notification pass against the final state, so each subscriber's callback
//! fires at most once per batch. Reads still see every intermediate commit
//! immediately.

mod equality;
mod pubsub;

pub use equality::ByRef;
pub use pubsub::{Store, SubscriberId, Subscription};
