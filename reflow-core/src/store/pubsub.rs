//! Store Implementation
//!
//! # How Commits Work
//!
//! 1. `set`/`update` produce the new state *before* the write lock is
//!    taken. A panicking updater therefore leaves the store untouched; no
//!    partial commit is possible.
//!
//! 2. The state `Arc` is replaced (never mutated in place) and the version
//!    counter is bumped. A `get` immediately after `set` returns the new
//!    state; there is no deferred commit.
//!
//! 3. Outside a batch, the commit runs a synchronous notification pass:
//!    each subscriber's selector is evaluated against the new state and
//!    compared with the slice it saw last. `last_slice` is updated whether
//!    or not the callback fires, so repeated identical updates never drift.
//!
//! 4. Inside a batch, the pass is deferred to the outermost batch exit and
//!    runs once against the final state.
//!
//! # Thread Safety
//!
//! The store is `Send + Sync`, but notification is synchronous on the
//! committing thread, matching the single-threaded cooperative model the
//! rest of the crate assumes.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use indexmap::IndexMap;
use tracing::trace;

/// Unique identifier for a store subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Type-erased notification closure. Owns the subscriber's selector, its
/// last seen slice, and its callback.
type NotifyFn<S> = Arc<dyn Fn(&S) + Send + Sync>;

struct BatchState {
    depth: u32,
    dirty: bool,
}

struct StoreInner<S> {
    state: RwLock<Arc<S>>,
    version: AtomicU64,
    subscribers: RwLock<IndexMap<SubscriberId, NotifyFn<S>>>,
    batch: Mutex<BatchState>,
}

impl<S> StoreInner<S> {
    /// Run one notification pass against `state`.
    ///
    /// The subscriber list is snapshotted first so a callback may
    /// subscribe or unsubscribe without deadlocking; additions during a
    /// pass are picked up from the next commit on.
    fn notify_pass(&self, state: &S) {
        let pass: Vec<NotifyFn<S>> = self
            .subscribers
            .read()
            .expect("subscribers lock poisoned")
            .values()
            .cloned()
            .collect();

        trace!(subscribers = pass.len(), "store notification pass");
        for notify in pass {
            notify(state);
        }
    }
}

/// A shared-state container with selector-scoped subscriptions.
///
/// # Example
///
/// ```rust,ignore
/// let store = Store::new(Counters { a: 0, b: 0 });
///
/// // Fires only when `b` changes.
/// let _sub = store.subscribe(|s: &Counters| s.b, |b| println!("b = {b}"));
///
/// store.update(|s| Counters { b: s.b + 1, ..*s });
/// ```
pub struct Store<S>
where
    S: Send + Sync + 'static,
{
    inner: Arc<StoreInner<S>>,
}

impl<S> Store<S>
where
    S: Send + Sync + 'static,
{
    /// Create a store owning `initial`.
    pub fn new(initial: S) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                state: RwLock::new(Arc::new(initial)),
                version: AtomicU64::new(0),
                subscribers: RwLock::new(IndexMap::new()),
                batch: Mutex::new(BatchState {
                    depth: 0,
                    dirty: false,
                }),
            }),
        }
    }

    /// The current state.
    pub fn get(&self) -> Arc<S> {
        self.inner
            .state
            .read()
            .expect("state lock poisoned")
            .clone()
    }

    /// Number of commits so far.
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::SeqCst)
    }

    /// Replace the state wholesale.
    pub fn set(&self, next: S) {
        self.commit(Arc::new(next));
    }

    /// Replace the state with a pure function of the current state.
    ///
    /// The updater runs before anything is written, so a panic inside it
    /// leaves the store unchanged.
    pub fn update<F>(&self, updater: F)
    where
        F: FnOnce(&S) -> S,
    {
        let current = self.get();
        let next = updater(&current);
        self.commit(Arc::new(next));
    }

    fn commit(&self, next: Arc<S>) {
        {
            let mut state = self.inner.state.write().expect("state lock poisoned");
            *state = Arc::clone(&next);
        }
        self.inner.version.fetch_add(1, Ordering::SeqCst);

        // Inside a batch, defer the pass to the outermost exit.
        {
            let mut batch = self.inner.batch.lock().expect("batch lock poisoned");
            if batch.depth > 0 {
                batch.dirty = true;
                return;
            }
        }

        self.inner.notify_pass(&next);
    }

    /// Register a selector-scoped subscriber.
    ///
    /// `selector` projects the slice this subscriber cares about;
    /// `callback` fires on commits where the slice changed. The slice seen
    /// at subscribe time is the comparison baseline, so subscribing does
    /// not fire the callback.
    pub fn subscribe<Slice, Sel, Cb>(&self, selector: Sel, callback: Cb) -> Subscription<S>
    where
        Slice: Clone + PartialEq + Send + 'static,
        Sel: Fn(&S) -> Slice + Send + Sync + 'static,
        Cb: Fn(&Slice) + Send + Sync + 'static,
    {
        let id = SubscriberId::new();
        let last_slice = Mutex::new(selector(&self.get()));

        let notify: NotifyFn<S> = Arc::new(move |state: &S| {
            let slice = selector(state);
            let mut last = last_slice.lock().expect("slice lock poisoned");
            if *last != slice {
                *last = slice.clone();
                drop(last);
                callback(&slice);
            } else {
                // Updated even without a change, so later comparisons are
                // anchored to the latest slice.
                *last = slice;
            }
        });

        self.inner
            .subscribers
            .write()
            .expect("subscribers lock poisoned")
            .insert(id, notify);

        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Run `f` with notifications coalesced.
    ///
    /// Commits inside the batch are visible to reads immediately, but the
    /// notification pass runs once, at the outermost batch exit, against
    /// the final state. Nested batches extend the outer one.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        {
            let mut batch = self.inner.batch.lock().expect("batch lock poisoned");
            batch.depth += 1;
        }
        // The guard closes the batch even if `f` panics.
        let _guard = BatchGuard {
            inner: &self.inner,
        };
        f()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .expect("subscribers lock poisoned")
            .len()
    }
}

impl<S> Clone for Store<S>
where
    S: Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> Debug for Store<S>
where
    S: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("version", &self.version())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

struct BatchGuard<'a, S> {
    inner: &'a StoreInner<S>,
}

impl<S> Drop for BatchGuard<'_, S> {
    fn drop(&mut self) {
        let run_pass = {
            let mut batch = self.inner.batch.lock().expect("batch lock poisoned");
            batch.depth -= 1;
            if batch.depth == 0 && batch.dirty {
                batch.dirty = false;
                true
            } else {
                false
            }
        };

        if run_pass {
            let state = self
                .inner
                .state
                .read()
                .expect("state lock poisoned")
                .clone();
            self.inner.notify_pass(&state);
        }
    }
}

/// Subscription guard. Unsubscribes on drop or via
/// [`unsubscribe`](Subscription::unsubscribe).
pub struct Subscription<S> {
    id: SubscriberId,
    inner: Weak<StoreInner<S>>,
}

impl<S> Subscription<S> {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Explicitly remove this subscriber.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl<S> Drop for Subscription<S> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner
                .subscribers
                .write()
                .expect("subscribers lock poisoned")
                .shift_remove(&self.id);
        }
    }
}

impl<S> Debug for Subscription<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
