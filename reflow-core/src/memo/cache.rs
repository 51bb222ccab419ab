//! Keyed Memo Cache
//!
//! [`MemoCache`] manages many named slots behind one object. Callers that
//! re-enter the same code path every pass can address slots by name instead
//! of holding a [`MemoSlot`] per call site.
//!
//! Cache instances are constructed and passed explicitly. There is no
//! module-level singleton; ownership and teardown belong to the caller, so
//! state cannot leak across tests or requests.

use std::any::Any;
use std::fmt::Debug;

use dashmap::DashMap;
use tracing::warn;

use super::slot::MemoSlot;
use super::snapshot::DependencySnapshot;

/// A registry of named memoization slots.
pub struct MemoCache {
    slots: DashMap<String, Box<dyn Any + Send + Sync>>,
}

impl MemoCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Memoize against the named slot.
    ///
    /// Behaves exactly like [`MemoSlot::memoize`] on a per-name basis.
    /// Reusing a name with a different value type is caller misuse: the
    /// slot is logged and reset, which degrades to an unconditional miss
    /// rather than a crash.
    pub fn memoize<T, F>(&self, name: &str, snapshot: &DependencySnapshot, compute: F) -> T
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        // Clone the slot handle out so the shard lock is released before
        // the compute closure runs; a re-entrant memoize must not deadlock.
        let existing = self
            .slots
            .get(name)
            .map(|entry| entry.downcast_ref::<MemoSlot<T>>().cloned());

        match existing {
            Some(Some(slot)) => slot.memoize(snapshot, compute),
            mismatch_or_absent => {
                if mismatch_or_absent.is_some() {
                    warn!(
                        slot = name,
                        "memo slot reused with a different value type; resetting slot"
                    );
                }
                let slot = MemoSlot::<T>::new();
                let value = slot.memoize(snapshot, compute);
                self.slots.insert(name.to_string(), Box::new(slot));
                value
            }
        }
    }

    /// Number of live slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drop the named slot.
    pub fn remove(&self, name: &str) {
        self.slots.remove(name);
    }

    /// Drop every slot.
    pub fn clear(&self) {
        self.slots.clear();
    }
}

impl Default for MemoCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for MemoCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoCache")
            .field("slots", &self.slots.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
