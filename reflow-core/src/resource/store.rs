//! Resource Store Implementation
//!
//! One [`EntryCell`] exists per distinct [`ResourceKey`]. The cell carries
//! a watch channel broadcasting the externally visible [`ResourceState`]
//! and a small locked record of fetch bookkeeping: the sequence number,
//! retry attempt, in-flight flag, subscriber count, and the timer/abort
//! handles the entry owns.
//!
//! # Sequence Guard
//!
//! Every fetch cycle is tagged with the entry's sequence number at start.
//! Commits (success, failure, retry arming, retry firing) require the tag
//! to still equal the entry's current sequence; anything that forces a new
//! cycle (a forced refetch, a fresh subscriber restarting a stale entry,
//! teardown) bumps the sequence, so a superseded fetch that resolves later
//! finds a stale tag and is discarded silently. This is the sole mechanism
//! preventing out-of-order writes; the abort signal is advisory on top.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace};

use super::abort::{abort_pair, AbortHandle, AbortSignal};
use super::error::{default_classifier, ErrorClassifier, ResourceError, RetryClass};
use super::key::ResourceKey;
use super::retry::{RetryPolicy, StalePolicy};

/// Lifecycle phase of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// No fetch has committed or is running.
    Idle,
    /// A fetch (or a fired retry) is running.
    Loading,
    /// The last fetch cycle committed data.
    Success,
    /// The last fetch cycle failed terminally or exhausted its retries.
    Error,
}

/// The externally visible state of one cache entry.
///
/// `data` survives later failures: a subscriber always keeps the last known
/// good value alongside any surfaced error (stale-while-error).
#[derive(Debug)]
pub struct ResourceState<T> {
    pub data: Option<Arc<T>>,
    pub error: Option<ResourceError>,
    pub status: FetchStatus,
    /// Retry attempts consumed in the current fetch cycle.
    pub attempt: u32,
}

impl<T> Clone for ResourceState<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            error: self.error.clone(),
            status: self.status,
            attempt: self.attempt,
        }
    }
}

impl<T> Default for ResourceState<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            status: FetchStatus::Idle,
            attempt: 0,
        }
    }
}

/// The fetch capability supplied by the transport layer. Opaque to the
/// store beyond its future's output.
pub type Fetcher<T> =
    Arc<dyn Fn(ResourceKey, AbortSignal) -> BoxFuture<'static, Result<T, ResourceError>> + Send + Sync>;

/// Per-subscription configuration.
#[derive(Clone)]
pub struct ResourceOptions {
    /// When cached data counts as stale. Defaults to always revalidating.
    pub stale: StalePolicy,
    pub retry: RetryPolicy,
    /// Maps a fetch error to retryable/terminal.
    pub classify: ErrorClassifier,
    /// Recurring refetch interval. A tick that finds a fetch already in
    /// flight coalesces with it instead of issuing a parallel one.
    pub refresh_interval: Option<Duration>,
}

impl Default for ResourceOptions {
    fn default() -> Self {
        Self {
            stale: StalePolicy::Always,
            retry: RetryPolicy::default(),
            classify: default_classifier(),
            refresh_interval: None,
        }
    }
}

impl fmt::Debug for ResourceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceOptions")
            .field("stale", &self.stale)
            .field("retry", &self.retry)
            .field("refresh_interval", &self.refresh_interval)
            .finish()
    }
}

/// Fetch bookkeeping, mutated only in short critical sections.
struct EntryInner {
    sequence: u64,
    attempt: u32,
    in_flight: bool,
    subscribers: u32,
    updated_at: Option<Instant>,
    abort: Option<AbortHandle>,
    retry_timer: Option<JoinHandle<()>>,
    refresh_timer: Option<JoinHandle<()>>,
}

struct EntryCell<T> {
    key: ResourceKey,
    state_tx: watch::Sender<ResourceState<T>>,
    inner: Mutex<EntryInner>,
}

impl<T> EntryCell<T> {
    fn new(key: ResourceKey) -> Self {
        let (state_tx, _) = watch::channel(ResourceState::default());
        Self {
            key,
            state_tx,
            inner: Mutex::new(EntryInner {
                sequence: 0,
                attempt: 0,
                in_flight: false,
                subscribers: 0,
                updated_at: None,
                abort: None,
                retry_timer: None,
                refresh_timer: None,
            }),
        }
    }
}

/// Keyed cache of async operation results.
///
/// All subscribers of one key share one entry; the entry is destroyed when
/// its last subscriber detaches.
pub struct ResourceStore<T>
where
    T: Send + Sync + 'static,
{
    entries: Arc<DashMap<ResourceKey, Arc<EntryCell<T>>>>,
}

impl<T> ResourceStore<T>
where
    T: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Attach to the entry for `key`, creating it if absent.
    ///
    /// This never returns an error: every failure is delivered through the
    /// `error` field of the subscription's state. A fresh entry (per the
    /// staleness policy) is returned as-is with no fetch; a stale or absent
    /// one either attaches to the in-flight fetch or starts one.
    ///
    /// Must be called within a tokio runtime context.
    pub fn subscribe(
        &self,
        key: ResourceKey,
        fetcher: Fetcher<T>,
        options: ResourceOptions,
    ) -> Subscription<T> {
        let cell = {
            let entry = self
                .entries
                .entry(key.clone())
                .or_insert_with(|| Arc::new(EntryCell::new(key)));
            Arc::clone(&entry)
        };

        let rx = cell.state_tx.subscribe();

        let needs_fetch = {
            let mut inner = cell.inner.lock();
            inner.subscribers += 1;
            if inner.in_flight {
                // De-duplication: ride the fetch already in progress.
                false
            } else {
                options.stale.is_stale(inner.updated_at)
            }
        };

        if needs_fetch {
            Self::start_fetch(&cell, &fetcher, &options, false);
        }
        if let Some(every) = options.refresh_interval {
            Self::arm_refresh(&cell, &fetcher, &options, every);
        }

        Subscription {
            cell,
            entries: Arc::clone(&self.entries),
            rx,
            fetcher,
            options,
        }
    }

    /// The current state for `key`, if an entry exists. Does not subscribe
    /// and never triggers a fetch.
    pub fn peek(&self, key: &ResourceKey) -> Option<ResourceState<T>> {
        self.entries
            .get(key)
            .map(|cell| cell.state_tx.borrow().clone())
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Begin a new fetch cycle, or coalesce/supersede an in-flight one.
    fn start_fetch(
        cell: &Arc<EntryCell<T>>,
        fetcher: &Fetcher<T>,
        options: &ResourceOptions,
        supersede: bool,
    ) {
        let seq = {
            let mut inner = cell.inner.lock();
            if inner.in_flight {
                if !supersede {
                    return;
                }
                // Advisory abort of the superseded fetch; the sequence bump
                // below is what guarantees its result never commits.
                if let Some(abort) = inner.abort.take() {
                    abort.abort();
                }
            }
            if let Some(timer) = inner.retry_timer.take() {
                // A new cycle preempts a backoff that was still waiting.
                timer.abort();
            }
            inner.sequence += 1;
            inner.in_flight = true;
            inner.attempt = 0;
            inner.sequence
        };

        debug!(key = %cell.key, seq, "fetch cycle started");
        cell.state_tx.send_modify(|state| {
            state.status = FetchStatus::Loading;
            state.attempt = 0;
        });

        Self::spawn_attempt(Arc::clone(cell), fetcher.clone(), options.clone(), seq);
    }

    /// Run one fetch attempt tagged with `seq`.
    fn spawn_attempt(
        cell: Arc<EntryCell<T>>,
        fetcher: Fetcher<T>,
        options: ResourceOptions,
        seq: u64,
    ) {
        let (abort_handle, abort_signal) = abort_pair();
        {
            let mut inner = cell.inner.lock();
            if inner.sequence != seq {
                return;
            }
            inner.abort = Some(abort_handle);
        }

        tokio::spawn(async move {
            let result = (fetcher)(cell.key.clone(), abort_signal).await;
            match result {
                Ok(data) => Self::commit_success(&cell, seq, data),
                Err(err) => Self::commit_failure(&cell, &fetcher, &options, seq, err),
            }
        });
    }

    fn commit_success(cell: &Arc<EntryCell<T>>, seq: u64, data: T) {
        {
            let mut inner = cell.inner.lock();
            if inner.sequence != seq {
                trace!(key = %cell.key, seq, "discarding superseded fetch result");
                return;
            }
            inner.in_flight = false;
            inner.abort = None;
            inner.attempt = 0;
            inner.updated_at = Some(Instant::now());
        }

        debug!(key = %cell.key, seq, "fetch committed");
        cell.state_tx.send_modify(|state| {
            state.data = Some(Arc::new(data));
            state.error = None;
            state.status = FetchStatus::Success;
            state.attempt = 0;
        });
    }

    fn commit_failure(
        cell: &Arc<EntryCell<T>>,
        fetcher: &Fetcher<T>,
        options: &ResourceOptions,
        seq: u64,
        err: ResourceError,
    ) {
        if err == ResourceError::Aborted {
            // Always discarded silently, never surfaced.
            let mut inner = cell.inner.lock();
            if inner.sequence == seq {
                inner.in_flight = false;
                inner.abort = None;
                drop(inner);
                cell.state_tx.send_modify(|state| {
                    state.status = if state.data.is_some() {
                        FetchStatus::Success
                    } else {
                        FetchStatus::Idle
                    };
                });
            }
            trace!(key = %cell.key, seq, "aborted fetch discarded");
            return;
        }

        let class = (options.classify)(&err);
        let mut inner = cell.inner.lock();
        if inner.sequence != seq {
            trace!(key = %cell.key, seq, "discarding superseded fetch failure");
            return;
        }
        inner.in_flight = false;
        inner.abort = None;

        if class == RetryClass::Retryable && inner.attempt < options.retry.max_retries {
            let delay = options.retry.backoff(inner.attempt);
            inner.attempt += 1;
            let attempt = inner.attempt;
            debug!(key = %cell.key, seq, attempt, ?delay, "retryable failure; backing off");

            let retry_cell = Arc::clone(cell);
            let retry_fetcher = fetcher.clone();
            let retry_options = options.clone();
            inner.retry_timer = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;

                let still_current = {
                    let mut inner = retry_cell.inner.lock();
                    if inner.sequence != seq {
                        return;
                    }
                    inner.retry_timer = None;
                    inner.in_flight = true;
                    true
                };

                if still_current {
                    // Loading only once the retry actually fires.
                    retry_cell.state_tx.send_modify(|state| {
                        state.status = FetchStatus::Loading;
                    });
                    Self::spawn_attempt(retry_cell, retry_fetcher, retry_options, seq);
                }
            }));
            drop(inner);

            // Stale-while-error: last known data stays visible with a soft
            // error until the retry fires.
            cell.state_tx.send_modify(|state| {
                state.error = Some(err);
                state.attempt = attempt;
                state.status = if state.data.is_some() {
                    FetchStatus::Success
                } else {
                    FetchStatus::Idle
                };
            });
        } else {
            debug!(key = %cell.key, seq, %err, "fetch failed terminally");
            drop(inner);
            cell.state_tx.send_modify(|state| {
                state.error = Some(err);
                state.status = FetchStatus::Error;
            });
        }
    }

    /// Arm the recurring refresh timer for this entry, once.
    fn arm_refresh(
        cell: &Arc<EntryCell<T>>,
        fetcher: &Fetcher<T>,
        options: &ResourceOptions,
        every: Duration,
    ) {
        let mut inner = cell.inner.lock();
        if inner.refresh_timer.is_some() {
            // First subscriber's interval wins for the entry's lifetime.
            return;
        }

        let cell_handle = Arc::clone(cell);
        let fetcher = fetcher.clone();
        let options = options.clone();
        inner.refresh_timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; the subscribe path
            // already decided whether to fetch now.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                trace!(key = %cell_handle.key, "auto-refresh tick");
                Self::start_fetch(&cell_handle, &fetcher, &options, false);
            }
        }));
    }
}

impl<T> Default for ResourceStore<T>
where
    T: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ResourceStore<T>
where
    T: Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<T> fmt::Debug for ResourceStore<T>
where
    T: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceStore")
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// A live attachment to one cache entry.
///
/// Dropping the subscription detaches; the last detach for a key aborts
/// any in-flight fetch, cancels the entry's timers, and destroys the entry.
pub struct Subscription<T>
where
    T: Send + Sync + 'static,
{
    cell: Arc<EntryCell<T>>,
    entries: Arc<DashMap<ResourceKey, Arc<EntryCell<T>>>>,
    rx: watch::Receiver<ResourceState<T>>,
    fetcher: Fetcher<T>,
    options: ResourceOptions,
}

impl<T> Subscription<T>
where
    T: Send + Sync + 'static,
{
    pub fn key(&self) -> &ResourceKey {
        &self.cell.key
    }

    /// The entry's current state.
    pub fn state(&self) -> ResourceState<T> {
        self.rx.borrow().clone()
    }

    /// Wait for the next state transition and return it.
    pub async fn changed(&mut self) -> ResourceState<T> {
        // The sender lives inside the cell we hold, so this cannot fail.
        let _ = self.rx.changed().await;
        self.rx.borrow_and_update().clone()
    }

    /// Force a new fetch cycle regardless of freshness.
    ///
    /// A fetch already in flight is superseded: its advisory abort fires
    /// and the sequence guard guarantees only the new fetch can commit.
    pub fn refetch(&self) {
        ResourceStore::start_fetch(&self.cell, &self.fetcher, &self.options, true);
    }
}

impl<T> Drop for Subscription<T>
where
    T: Send + Sync + 'static,
{
    fn drop(&mut self) {
        let last = {
            let mut inner = self.cell.inner.lock();
            inner.subscribers -= 1;
            if inner.subscribers > 0 {
                false
            } else {
                // Invalidate any outstanding fetch before releasing the
                // entry, then best-effort abort it.
                inner.sequence += 1;
                inner.in_flight = false;
                if let Some(abort) = inner.abort.take() {
                    abort.abort();
                }
                if let Some(timer) = inner.retry_timer.take() {
                    timer.abort();
                }
                if let Some(timer) = inner.refresh_timer.take() {
                    timer.abort();
                }
                true
            }
        };

        if last {
            debug!(key = %self.cell.key, "last subscriber detached; destroying entry");
            // A racing subscribe may have installed interest again; only
            // remove the cell we tore down while it is still unused.
            self.entries.remove_if(&self.cell.key, |_, cell| {
                Arc::ptr_eq(cell, &self.cell) && cell.inner.lock().subscribers == 0
            });
        }
    }
}

impl<T> fmt::Debug for Subscription<T>
where
    T: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.cell.key)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
