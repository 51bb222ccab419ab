//! Throttle Implementation
//!
//! # Window Semantics
//!
//! The first push of a window emits immediately (leading edge). Pushes that
//! arrive within the interval of the last emission are held, latest value
//! wins, and flushed when the interval elapses (trailing edge). So a burst
//! produces at most one emission per interval, and the final value of the
//! burst is always delivered.
//!
//! Timestamps use the tokio clock so that tests against a paused runtime
//! observe exact window boundaries.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::trace;

struct ThrottleInner<T> {
    last_emit: Option<Instant>,
    trailing: Option<T>,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

/// Emits at most once per interval, never dropping the final value of a
/// burst.
pub struct Throttler<T>
where
    T: Send + 'static,
{
    interval: Duration,
    sink: Arc<dyn Fn(T) + Send + Sync>,
    inner: Arc<Mutex<ThrottleInner<T>>>,
}

impl<T> Throttler<T>
where
    T: Send + 'static,
{
    /// Create a throttler that emits into `sink` at most once per
    /// `interval`.
    pub fn new<F>(interval: Duration, sink: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self {
            interval,
            sink: Arc::new(sink),
            inner: Arc::new(Mutex::new(ThrottleInner {
                last_emit: None,
                trailing: None,
                generation: 0,
                timer: None,
            })),
        }
    }

    /// Push a new value through the throttle window.
    ///
    /// Must be called within a tokio runtime context.
    pub fn push(&self, value: T) {
        let now = Instant::now();

        // Decide under the lock, emit outside it.
        let leading = {
            let mut inner = self.inner.lock();
            let window_open = match inner.last_emit {
                None => true,
                Some(at) => now.duration_since(at) >= self.interval,
            };

            if window_open && inner.timer.is_none() {
                inner.last_emit = Some(now);
                Some(value)
            } else {
                inner.trailing = Some(value);
                if inner.timer.is_none() {
                    let elapsed = inner
                        .last_emit
                        .map(|at| now.duration_since(at))
                        .unwrap_or_default();
                    let remaining = self.interval.saturating_sub(elapsed);
                    self.arm_trailing(&mut inner, remaining);
                }
                None
            }
        };

        if let Some(value) = leading {
            (self.sink)(value);
        }
    }

    fn arm_trailing(&self, inner: &mut ThrottleInner<T>, remaining: Duration) {
        let generation = inner.generation;
        let inner_handle = Arc::clone(&self.inner);
        let sink = Arc::clone(&self.sink);

        inner.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(remaining).await;

            let value = {
                let mut inner = inner_handle.lock();
                if inner.generation != generation {
                    return;
                }
                inner.timer = None;
                match inner.trailing.take() {
                    Some(value) => {
                        inner.last_emit = Some(Instant::now());
                        Some(value)
                    }
                    None => None,
                }
            };

            if let Some(value) = value {
                trace!("throttle trailing edge; emitting held value");
                sink(value);
            }
        }));
    }

    /// Cancel any held trailing value without emitting it.
    pub fn cancel(&self) {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.trailing = None;
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
    }

    /// Whether a trailing-edge flush is pending.
    pub fn is_pending(&self) -> bool {
        self.inner.lock().timer.is_some()
    }
}

impl<T> Drop for Throttler<T>
where
    T: Send + 'static,
{
    fn drop(&mut self) {
        self.cancel();
    }
}

impl<T> Debug for Throttler<T>
where
    T: Send + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttler")
            .field("interval", &self.interval)
            .field("pending", &self.is_pending())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
