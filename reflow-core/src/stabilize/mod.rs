//! Value Stabilization
//!
//! This module implements debounce and throttle: primitives that coalesce
//! rapid value or callback updates into controlled emissions.
//!
//! # Concepts
//!
//! ## Debounce
//!
//! A [`Debouncer`] holds the latest pushed value and emits it only after a
//! quiet period of the configured delay. Every push rearms the timer, so a
//! burst of updates produces exactly one emission carrying the final value.
//!
//! ## Throttle
//!
//! A [`Throttler`] emits the first update of a window immediately, then
//! suppresses further emissions until the interval has elapsed, at which
//! point the most recent held value (if any) is flushed. At most one
//! emission per interval, and the final value of a burst is never dropped.
//!
//! ## Debounced callbacks
//!
//! [`debounce_callback`] composes a debouncer with the memo module's
//! [`StableRef`](crate::memo::StableRef) so the returned wrapper keeps the
//! same identity (and the same pending timer state) across repeated
//! construction calls, as long as the wrapped callback's identity and the
//! delay are unchanged.
//!
//! # Timers
//!
//! Timers run on the tokio timer service; constructing or pushing into a
//! stabilizer therefore requires a tokio runtime context. Every pending
//! timer is owned by the stabilizer that armed it and is cancelled on
//! explicit `cancel` and on drop, so no scheduled work outlives the caller's
//! interest.

mod debounce;
mod throttle;

pub use debounce::{debounce_callback, Debouncer};
pub use throttle::Throttler;
