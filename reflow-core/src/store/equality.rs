//! Slice Equality Helpers
//!
//! `PartialEq` on a selected slice is structural, which is what plain
//! aggregates want. Opaque values (connections, large documents, anything
//! where content comparison is wrong or expensive) want identity instead:
//! wrap them in [`ByRef`] and the slice compares by pointer.

use std::fmt::Debug;
use std::ops::Deref;
use std::sync::Arc;

/// An `Arc` compared by pointer identity rather than content.
pub struct ByRef<T: ?Sized>(pub Arc<T>);

impl<T: ?Sized> ByRef<T> {
    pub fn new(value: Arc<T>) -> Self {
        Self(value)
    }
}

impl<T: ?Sized> Clone for ByRef<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: ?Sized> PartialEq for ByRef<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: ?Sized> Eq for ByRef<T> {}

impl<T: ?Sized> Deref for ByRef<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: ?Sized + Debug> Debug for ByRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ByRef").field(&self.0).finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
