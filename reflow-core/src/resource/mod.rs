//! Async Resource Store
//!
//! This module implements a keyed cache of async operation results with
//! in-flight de-duplication, retry with exponential backoff, cooperative
//! cancellation, and optional auto-refresh.
//!
//! # How a Fetch Flows
//!
//! 1. `subscribe` with a fresh cache entry (per the caller's staleness
//!    policy) returns the cached state immediately; no fetch is issued.
//!
//! 2. With a stale or absent entry, an already in-flight fetch for the same
//!    key is attached to rather than duplicated.
//!
//! 3. Otherwise a fetch driver starts: status becomes `Loading`, the
//!    fetcher runs with an advisory abort signal, and the attempt is tagged
//!    with the entry's current sequence number.
//!
//! 4. A resolving fetch commits only if its sequence still matches the
//!    entry's; superseded results are discarded silently. This sequence
//!    guard, not the abort signal, is what makes cancellation reliable.
//!
//! 5. Failures are classified by a caller-supplied predicate. Retryable
//!    failures back off exponentially and keep the last known data visible
//!    alongside a soft error (stale-while-error). Terminal failures or
//!    exhausted retries surface as `Error`, again with prior data retained.
//!
//! # Ownership
//!
//! One entry exists per distinct key, shared by every subscriber of that
//! key. When the last subscriber detaches, the entry's abort handle fires,
//! its timers are cancelled, and the entry is destroyed. Callers that want
//! a grace period keep a subscription alive for it.
//!
//! # Concurrency Model
//!
//! Single-threaded cooperative in spirit: all entry mutation happens in
//! short critical sections, suspension occurs only at the fetcher boundary,
//! and entry state is replaced rather than mutated so observers never see a
//! half-updated record.

mod abort;
mod error;
mod key;
mod retry;
mod store;

pub use abort::{abort_pair, AbortHandle, AbortSignal};
pub use error::{ErrorClassifier, ResourceError, RetryClass};
pub use key::{KeyError, ResourceKey};
pub use retry::{RetryPolicy, StalePolicy};
pub use store::{
    FetchStatus, Fetcher, ResourceOptions, ResourceState, ResourceStore, Subscription,
};
