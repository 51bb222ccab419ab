//! Cooperative Cancellation
//!
//! The abort signal is advisory: a well-behaved fetcher selects on
//! [`AbortSignal::aborted`] (or polls [`AbortSignal::is_aborted`]) and bails
//! out early, but nothing forces it to. Correctness does not depend on it:
//! the store's sequence guard discards any result from a superseded fetch
//! whether or not the fetcher honored the signal.

use tokio::sync::watch;

/// The store-side handle that triggers an abort.
#[derive(Debug)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Signal the fetcher to stop. Idempotent.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// The fetcher-side view of an abort request.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    /// Whether an abort has been requested.
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once an abort is requested. If the handle is dropped
    /// without aborting, this never resolves.
    pub async fn aborted(mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // Handle dropped without aborting; no abort can arrive.
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Create a connected handle/signal pair.
pub fn abort_pair() -> (AbortHandle, AbortSignal) {
    let (tx, rx) = watch::channel(false);
    (AbortHandle { tx }, AbortSignal { rx })
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
