//! Memo Slots
//!
//! A slot is one unit of memoization: a single cached value guarded by the
//! dependency snapshot that produced it.
//!
//! # How Slots Work
//!
//! 1. On first call, `memoize` runs the compute closure and stores the
//!    result together with the supplied snapshot.
//!
//! 2. On later calls, the new snapshot is compared against the stored one.
//!    A match returns the cached value without running the closure.
//!
//! 3. A mismatch recomputes and replaces the entry wholesale, bumping the
//!    slot's version. Entries are never mutated in place, so a reader that
//!    obtained a value never observes a half-updated entry.
//!
//! # Failure Semantics
//!
//! The entry is written only after the compute closure returns. A panic or
//! an `Err` from the closure therefore propagates to the caller and leaves
//! the slot exactly as it was.

use std::fmt::Debug;
use std::sync::{Arc, RwLock};

use super::snapshot::DependencySnapshot;

/// One cached entry: the snapshot that produced the value, the value, and
/// a version that counts recomputations.
struct MemoEntry<T> {
    snapshot: DependencySnapshot,
    value: T,
    version: u64,
}

/// A single memoization slot holding at most one cached value.
///
/// # Type Parameters
///
/// - `T`: the cached value type. Must be `Clone` so the cached value can be
///   handed out without giving up ownership of the entry.
pub struct MemoSlot<T>
where
    T: Clone + Send + Sync + 'static,
{
    entry: Arc<RwLock<Option<MemoEntry<T>>>>,
}

impl<T> MemoSlot<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an empty slot.
    pub fn new() -> Self {
        Self {
            entry: Arc::new(RwLock::new(None)),
        }
    }

    /// Return the cached value if `snapshot` matches the stored one,
    /// otherwise run `compute` and replace the entry.
    ///
    /// An empty snapshot never changes, so the closure runs exactly once
    /// for the lifetime of the slot.
    pub fn memoize<F>(&self, snapshot: &DependencySnapshot, compute: F) -> T
    where
        F: FnOnce() -> T,
    {
        {
            let entry = self.entry.read().expect("entry lock poisoned");
            if let Some(entry) = entry.as_ref() {
                if snapshot.matches(&entry.snapshot) {
                    return entry.value.clone();
                }
            }
        }

        // Compute outside the lock; a panicking closure leaves the slot
        // untouched.
        let value = compute();
        self.store(snapshot.clone(), value.clone());
        value
    }

    /// Fallible flavor of [`memoize`](Self::memoize). An `Err` from the
    /// closure propagates and caches nothing.
    pub fn try_memoize<F, E>(&self, snapshot: &DependencySnapshot, compute: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        {
            let entry = self.entry.read().expect("entry lock poisoned");
            if let Some(entry) = entry.as_ref() {
                if snapshot.matches(&entry.snapshot) {
                    return Ok(entry.value.clone());
                }
            }
        }

        let value = compute()?;
        self.store(snapshot.clone(), value.clone());
        Ok(value)
    }

    fn store(&self, snapshot: DependencySnapshot, value: T) {
        let mut entry = self.entry.write().expect("entry lock poisoned");
        let version = entry.as_ref().map(|e| e.version + 1).unwrap_or(1);
        *entry = Some(MemoEntry {
            snapshot,
            value,
            version,
        });
    }

    /// Number of times the slot has computed. Zero means never.
    pub fn version(&self) -> u64 {
        self.entry
            .read()
            .expect("entry lock poisoned")
            .as_ref()
            .map(|e| e.version)
            .unwrap_or(0)
    }

    /// Check if the slot holds a cached value.
    pub fn has_value(&self) -> bool {
        self.entry
            .read()
            .expect("entry lock poisoned")
            .is_some()
    }

    /// Drop the cached entry, returning the slot to its initial state.
    pub fn invalidate(&self) {
        *self.entry.write().expect("entry lock poisoned") = None;
    }
}

impl<T> Default for MemoSlot<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for MemoSlot<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            entry: Arc::clone(&self.entry),
        }
    }
}

impl<T> Debug for MemoSlot<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoSlot")
            .field("has_value", &self.has_value())
            .field("version", &self.version())
            .finish()
    }
}

/// The function-identity flavor of a memo slot.
///
/// `resolve` hands back the *same* `Arc`'d callable (pointer identity) for
/// as long as the snapshot is unchanged. This exists so callers get a
/// distinct stable callable reference rather than a value; composing with
/// a debouncer, for instance, keeps the debouncer's internal timer state
/// alive across repeated construction calls.
pub struct StableRef<A, R>
where
    A: 'static,
    R: 'static,
{
    slot: MemoSlot<Arc<dyn Fn(A) -> R + Send + Sync>>,
}

impl<A, R> StableRef<A, R>
where
    A: 'static,
    R: 'static,
{
    pub fn new() -> Self {
        Self {
            slot: MemoSlot::new(),
        }
    }

    /// Return the cached callable while `snapshot` is unchanged, otherwise
    /// build a fresh one from `factory` and cache it.
    pub fn resolve<F>(
        &self,
        snapshot: &DependencySnapshot,
        factory: impl FnOnce() -> F,
    ) -> Arc<dyn Fn(A) -> R + Send + Sync>
    where
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        self.slot.memoize(snapshot, || {
            Arc::new(factory()) as Arc<dyn Fn(A) -> R + Send + Sync>
        })
    }

    /// Number of times a callable has been built. Zero means never.
    pub fn version(&self) -> u64 {
        self.slot.version()
    }
}

impl<A, R> Default for StableRef<A, R>
where
    A: 'static,
    R: 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<A, R> Clone for StableRef<A, R>
where
    A: 'static,
    R: 'static,
{
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

impl<A, R> Debug for StableRef<A, R>
where
    A: 'static,
    R: 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StableRef")
            .field("version", &self.version())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memo::DepToken;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn computes_on_first_call() {
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();

        let slot = MemoSlot::new();
        let snapshot = DependencySnapshot::of([DepToken::ident(1)]);

        assert!(!slot.has_value());
        let value = slot.memoize(&snapshot, move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            42
        });

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(slot.has_value());
    }

    #[test]
    fn unchanged_snapshot_skips_compute() {
        let calls = Arc::new(AtomicI32::new(0));
        let slot = MemoSlot::new();
        let snapshot = DependencySnapshot::of([DepToken::value(&7)]);

        for _ in 0..3 {
            let calls = calls.clone();
            let value = slot.memoize(&snapshot, move || {
                calls.fetch_add(1, Ordering::SeqCst);
                "computed"
            });
            assert_eq!(value, "computed");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(slot.version(), 1);
    }

    #[test]
    fn changed_snapshot_recomputes() {
        let calls = Arc::new(AtomicI32::new(0));
        let slot = MemoSlot::new();

        for dep in [1u64, 1, 2, 2, 3] {
            let calls = calls.clone();
            let snapshot = DependencySnapshot::of([DepToken::ident(dep)]);
            let value = slot.memoize(&snapshot, move || {
                calls.fetch_add(1, Ordering::SeqCst);
                dep * 10
            });
            assert_eq!(value, dep * 10);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(slot.version(), 3);
    }

    #[test]
    fn empty_snapshot_runs_once_forever() {
        let calls = Arc::new(AtomicI32::new(0));
        let slot = MemoSlot::new();
        let snapshot = DependencySnapshot::new();

        for _ in 0..10 {
            let calls = calls.clone();
            slot.memoize(&snapshot, move || {
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn try_memoize_error_caches_nothing() {
        let slot: MemoSlot<i32> = MemoSlot::new();
        let snapshot = DependencySnapshot::of([DepToken::ident(1)]);

        let result: Result<i32, &str> = slot.try_memoize(&snapshot, || Err("boom"));
        assert_eq!(result, Err("boom"));
        assert!(!slot.has_value());

        // The next call computes again and succeeds.
        let result: Result<i32, &str> = slot.try_memoize(&snapshot, || Ok(5));
        assert_eq!(result, Ok(5));
        assert_eq!(slot.version(), 1);
    }

    #[test]
    fn invalidate_forces_recompute() {
        let calls = Arc::new(AtomicI32::new(0));
        let slot = MemoSlot::new();
        let snapshot = DependencySnapshot::new();

        let c = calls.clone();
        slot.memoize(&snapshot, move || c.fetch_add(1, Ordering::SeqCst));
        slot.invalidate();
        assert!(!slot.has_value());

        let c = calls.clone();
        slot.memoize(&snapshot, move || c.fetch_add(1, Ordering::SeqCst));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn clone_shares_the_entry() {
        let slot1 = MemoSlot::new();
        let slot2 = slot1.clone();
        let snapshot = DependencySnapshot::new();

        slot1.memoize(&snapshot, || 42);
        assert!(slot2.has_value());
        assert_eq!(slot2.version(), 1);
    }

    #[test]
    fn stable_ref_keeps_identity_while_unchanged() {
        let stable: StableRef<i32, i32> = StableRef::new();
        let snapshot = DependencySnapshot::of([DepToken::ident(1)]);

        let f1 = stable.resolve(&snapshot, || |x: i32| x + 1);
        let f2 = stable.resolve(&snapshot, || |x: i32| x + 100);

        // Same identity, so the second factory never ran.
        assert!(Arc::ptr_eq(&f1, &f2));
        assert_eq!(f2(1), 2);
    }

    #[test]
    fn stable_ref_rebuilds_on_snapshot_change() {
        let stable: StableRef<i32, i32> = StableRef::new();

        let snap_a = DependencySnapshot::of([DepToken::ident(1)]);
        let snap_b = DependencySnapshot::of([DepToken::ident(2)]);

        let f1 = stable.resolve(&snap_a, || |x: i32| x + 1);
        let f2 = stable.resolve(&snap_b, || |x: i32| x * 2);

        assert!(!Arc::ptr_eq(&f1, &f2));
        assert_eq!(f1(10), 11);
        assert_eq!(f2(10), 20);
    }
}
