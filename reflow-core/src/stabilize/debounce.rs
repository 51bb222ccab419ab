//! Debounce Implementation
//!
//! # State Machine
//!
//! - Idle -> Pending: on push (timer armed)
//! - Pending -> Pending: on push (timer rearmed)
//! - Pending -> Idle: on timer fire (emits the latest value)
//! - Pending -> Idle: on cancel (no emission)
//!
//! A generation counter guards every timer: rearming or cancelling bumps
//! the generation, so a timer that was already racing toward its deadline
//! finds a stale generation and exits without emitting. The task handle is
//! additionally aborted eagerly, so superseded timers do not linger.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::memo::{DependencySnapshot, StableRef};

struct DebounceInner<T> {
    latest: Option<T>,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

/// Coalesces rapid pushes into a single emission after a quiet period.
///
/// The sink callback receives the most recently pushed value once no push
/// has occurred for the configured delay.
pub struct Debouncer<T>
where
    T: Send + 'static,
{
    delay: Duration,
    sink: Arc<dyn Fn(T) + Send + Sync>,
    inner: Arc<Mutex<DebounceInner<T>>>,
}

impl<T> Debouncer<T>
where
    T: Send + 'static,
{
    /// Create a debouncer that emits into `sink` after `delay` of quiet.
    pub fn new<F>(delay: Duration, sink: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self {
            delay,
            sink: Arc::new(sink),
            inner: Arc::new(Mutex::new(DebounceInner {
                latest: None,
                generation: 0,
                timer: None,
            })),
        }
    }

    /// Record a new value and (re)arm the quiet-period timer.
    ///
    /// Must be called within a tokio runtime context.
    pub fn push(&self, value: T) {
        let mut inner = self.inner.lock();
        inner.latest = Some(value);
        inner.generation += 1;
        let generation = inner.generation;

        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }

        let inner_handle = Arc::clone(&self.inner);
        let sink = Arc::clone(&self.sink);
        let delay = self.delay;

        inner.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            // Take the value under the lock, emit outside it: the sink may
            // push again.
            let value = {
                let mut inner = inner_handle.lock();
                if inner.generation != generation {
                    return;
                }
                inner.timer = None;
                inner.latest.take()
            };

            if let Some(value) = value {
                trace!("debounce quiet period elapsed; emitting");
                sink(value);
            }
        }));
    }

    /// Cancel any pending emission without firing.
    pub fn cancel(&self) {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.latest = None;
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
    }

    /// Whether a timer is armed and an emission is pending.
    pub fn is_pending(&self) -> bool {
        self.inner.lock().timer.is_some()
    }
}

impl<T> Drop for Debouncer<T>
where
    T: Send + 'static,
{
    fn drop(&mut self) {
        self.cancel();
    }
}

impl<T> Debug for Debouncer<T>
where
    T: Send + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("delay", &self.delay)
            .field("pending", &self.is_pending())
            .finish()
    }
}

/// Wrap `callback` so that invocations within `delay` of each other
/// collapse into a single call with the most recently supplied arguments.
///
/// The wrapper is resolved through `slot`, so its identity (and the pending
/// timer state behind it) is stable across repeated construction calls as
/// long as `snapshot` is unchanged. Callers should build the snapshot from
/// the callback's identity and the delay, e.g.
/// `[DepToken::ptr(&*callback), DepToken::value(&delay)]`.
pub fn debounce_callback<A>(
    slot: &StableRef<A, ()>,
    snapshot: &DependencySnapshot,
    callback: Arc<dyn Fn(A) + Send + Sync>,
    delay: Duration,
) -> Arc<dyn Fn(A) + Send + Sync>
where
    A: Send + 'static,
{
    slot.resolve(snapshot, move || {
        let debouncer = Debouncer::new(delay, move |args: A| callback(args));
        move |args: A| debouncer.push(args)
    })
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
