//! Mutex-guarded reference cell with the same surface as [`AtomicCell`].
//!
//! Exists for baselining: benchmarks and tests run the same workload
//! against both cells to compare throughput and to cross-check results.
//! Not lock-free — every operation takes the one mutex.
//!
//! [`AtomicCell`]: crate::AtomicCell

use core::fmt;
use std::sync::{Mutex, PoisonError};

/// The mutex baseline. One lock around one heap-allocated value.
pub struct MutexCell<T> {
    data: Mutex<Box<T>>,
}

impl<T> MutexCell<T> {
    /// Creates a cell holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            data: Mutex::new(Box::new(value)),
        }
    }

    /// Runs `f` against the value under the lock.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Runs the mutator under the lock and passes its verdict through.
    ///
    /// Unlike the lock-free cell there is no copy to discard: a mutator
    /// that edits and *then* vetoes has still edited the value in place.
    /// Baseline workloads veto before touching anything.
    pub fn update_weak(&self, f: impl FnOnce(&mut T) -> bool) -> bool {
        let mut guard = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Loops [`update_weak`](Self::update_weak) until the mutator accepts.
    pub fn update(&self, mut f: impl FnMut(&mut T) -> bool) {
        while !self.update_weak(&mut f) {}
    }

    /// Consumes the cell and returns the contained value.
    pub fn into_inner(self) -> T {
        *self
            .data
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Direct access; `&mut self` makes the lock unnecessary.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Default> Default for MutexCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for MutexCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.read(|v| f.debug_struct("MutexCell").field("value", v).finish())
    }
}
