//! Reflow Core
//!
//! This crate provides the reactive caching and synchronization core for the
//! Reflow framework. It implements:
//!
//! - Dependency-snapshot-keyed memoization of values and function identities
//! - Debounce/throttle primitives that coalesce rapid updates
//! - A keyed async resource store with de-duplication, retry and cancellation
//! - A shared-state container with selector-scoped subscriptions
//!
//! The crate has no opinion about what sits on top of it. A rendering layer
//! calls into these primitives once per pass; a transport layer supplies
//! fetch futures. Both are out of scope here and treated as opaque
//! capabilities.
//!
//! # Architecture
//!
//! The crate is organized into four modules, leaves first:
//!
//! - `memo`: dependency snapshots and the memoization cache
//! - `stabilize`: debounce and throttle over the tokio timer service
//! - `resource`: the keyed async resource store
//! - `store`: the selector-scoped pub-sub state container
//!
//! # Example
//!
//! ```rust,ignore
//! use reflow_core::store::Store;
//!
//! let store = Store::new(AppState { count: 0, label: String::new() });
//!
//! // Only fires when the selected slice actually changes.
//! let _sub = store.subscribe(|s: &AppState| s.count, |count| {
//!     println!("count is now {count}");
//! });
//!
//! store.update(|s| AppState { count: s.count + 1, ..s.clone() });
//! ```

pub mod memo;
pub mod resource;
pub mod stabilize;
pub mod store;
