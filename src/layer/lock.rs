//! In-process single-writer lock guarding the top layer's write path (spec.md §5).
//!
//! Unlike the teacher's cross-process, file-based `LockManager`, the layered store's
//! concurrency model is purely in-process: callers are expected to serialize concurrent
//! writers externally, and this lock only needs to make that serialization cheap to get
//! right inside a single `LayeredStorage` instance. Readers never take it.

use std::sync::{Mutex, MutexGuard};

/// Serializes mutating operations against the top layer. Holding the guard for the duration
/// of a facade write/move/delete operation is what gives each such operation the "observed
/// atomically from the caller's perspective" property spec.md §5 asks for.
#[derive(Default)]
pub struct WriteLock {
    inner: Mutex<()>,
}

impl WriteLock {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(()),
        }
    }

    /// Blocks until the lock is free, then returns a guard held for the caller's scope. A
    /// poisoned lock (a prior writer panicked mid-mutation) is recovered rather than
    /// propagated, since the facade leaves no partial in-memory state for a panicking
    /// operation to corrupt beyond the disk/index window §7 already documents.
    pub fn acquire(&self) -> WriteGuard<'_> {
        let guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        WriteGuard { _guard: guard }
    }
}

/// Held for the duration of a single mutating facade operation.
pub struct WriteGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}
