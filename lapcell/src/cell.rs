//! `AtomicCell<T, N>` — a lock-free container for values wider than a
//! machine word.
//!
//! The cell publishes a pointer to the live value. Readers snapshot that
//! pointer under a usage ticket and run a closure against it — wait-free,
//! a handful of atomic operations and no loop. Writers check a spare slot
//! out of the [`SlotPool`], copy the live value into it, run the caller's
//! mutator, and publish the slot with a single CAS; the displaced value
//! goes back into the pool for the next writer. Slot reuse is gated by the
//! pool's lap barrier, which is what makes the read side safe without
//! hazard pointers or epoch tracking.
//!
//! # Example
//!
//! ```rust
//! use lapcell::AtomicCell;
//!
//! let cell: AtomicCell<u32, 8> = AtomicCell::new(0);
//!
//! // Writers supply a mutator that may veto by returning false.
//! cell.update(|v| {
//!     *v += 1;
//!     true
//! });
//!
//! // Readers get a consistent snapshot for the whole closure.
//! assert_eq!(cell.read(|v| *v), 1);
//! ```
//!
//! # Progress guarantees
//!
//! - [`read`](AtomicCell::read) is wait-free.
//! - [`update_weak`](AtomicCell::update_weak) is lock-free: it always
//!   returns in bounded steps, possibly with `false`.
//! - [`update`](AtomicCell::update) retries `update_weak` and can live-lock
//!   under pathological contention (or loop forever if the mutator always
//!   vetoes). It is **not** reentrant: calling `update` on the same cell
//!   from inside its own mutator can pin a slot forever. `update_weak`
//!   *is* reentrant.

use crate::pool::{SlotGuard, SlotPool};
use core::fmt;
use core::mem::ManuallyDrop;
use core::sync::atomic::{AtomicPtr, Ordering, fence};
use crossbeam_utils::Backoff;
use std::sync::Arc;

/// Lock-free multi-word atomic container.
///
/// `N` is the capacity of the backing [`SlotPool`]; it must be a nonzero
/// power of two. Cells built with [`new`](AtomicCell::new) share one
/// process-wide pool per `(T, N)`; [`with_pool`](AtomicCell::with_pool)
/// injects a private one.
///
/// `T` needs `Clone` because every update copies the live value into a
/// fresh slot before mutating it, and `Default` (on the shared-pool
/// constructors) because the pool pre-fills its slots.
pub struct AtomicCell<T, const N: usize = 8> {
    /// The live value. Non-null from construction to drop; always either
    /// the cell's own initial allocation or a pool slot.
    current: AtomicPtr<T>,
    pool: Arc<SlotPool<T, N>>,
}

impl<T, const N: usize> AtomicCell<T, N>
where
    T: Clone + Send + Sync + 'static,
{
    // ---- Construction ----

    /// Creates a cell holding `value`, backed by the shared pool for
    /// `(T, N)`.
    pub fn new(value: T) -> Self
    where
        T: Default,
    {
        Self::with_pool(value, SlotPool::shared())
    }

    /// Creates a cell holding `value`, backed by `pool`.
    ///
    /// Cells may freely mix pools across instances; a cell always recycles
    /// through the pool it was built with. The pool drains itself when the
    /// last cell holding it drops.
    pub fn with_pool(value: T, pool: Arc<SlotPool<T, N>>) -> Self {
        Self {
            current: AtomicPtr::new(Box::into_raw(Box::new(value))),
            pool,
        }
    }

    /// Consumes the cell and returns the contained value.
    pub fn into_inner(self) -> T {
        let this = ManuallyDrop::new(self);
        // SAFETY: `self` is consumed and its Drop never runs; each field
        // is taken exactly once.
        let pool = unsafe { core::ptr::read(&this.pool) };
        let ptr = this.current.load(Ordering::Acquire);
        drop(pool);
        // SAFETY: `ptr` is the cell's live allocation, exclusively ours now.
        unsafe { *Box::from_raw(ptr) }
    }

    /// Direct access to the value. `&mut self` proves there is no
    /// concurrent reader or writer, so no ticket is needed.
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        // SAFETY: exclusive borrow; `current` is non-null and valid.
        unsafe { &mut **self.current.get_mut() }
    }

    // ---- Reading ----

    /// Runs `f` against a snapshot of the value and returns its result.
    ///
    /// Wait-free. The snapshot is whatever value was published at the
    /// moment of the load; it stays valid and unmodified for the whole
    /// call, even if writers publish newer values meanwhile. The usage
    /// ticket is released on every exit path, including a panic in `f`.
    #[inline]
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let _ticket = self.pool.register();
        let ptr = self.current.load(Ordering::Acquire);
        // SAFETY: `ptr` was `current` at the load. The ticket keeps the
        // lap barrier from recycling it underneath us, and the acquire
        // load pairs with the publishing writer's release.
        f(unsafe { &*ptr })
    }

    // ---- Writing ----

    /// One attempt to replace the value with `f`'s edit of it.
    ///
    /// The mutator receives a copy of the current value and may veto by
    /// returning `false`. Returns `true` only when the edit was published.
    /// A `false` return — pool exhausted, lap barrier not yet drained,
    /// another writer won the publish race, or the mutator vetoed — leaves
    /// the cell untouched; the caller cannot tell the reasons apart and
    /// retries instead.
    ///
    /// Lock-free and reentrant. If `f` panics, the checked-out slot and
    /// the usage ticket are both restored before the panic propagates.
    pub fn update_weak<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut T) -> bool,
    {
        let Ok(slot) = self.pool.try_allocate() else {
            return false;
        };
        // Registered for the whole writeback: the barrier must not pass
        // while our release of the displaced pointer is still in flight.
        let _ticket = self.pool.register();
        let reclaim = SlotGuard::new(&self.pool, slot);

        let old = self.current.load(Ordering::Acquire);
        // SAFETY: `slot` is checked out exclusively to this writer; `old`
        // is the live value, valid under our ticket. The two never alias:
        // a slot is never simultaneously free and current.
        unsafe { (*slot).clone_from(&*old) };

        // SAFETY: still exclusively our slot.
        if !f(unsafe { &mut *slot }) {
            return false;
        }

        // Publish: everything written into the slot above becomes visible
        // to any reader that observes the new pointer.
        fence(Ordering::Release);
        if self
            .current
            .compare_exchange_weak(old, slot, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }

        // The slot is now current; recycle the displaced value instead.
        reclaim.redirect(old);
        true
    }

    /// Replaces the value with `f`'s edit, retrying until it takes.
    ///
    /// Loops [`update_weak`](AtomicCell::update_weak) with exponential
    /// backoff; `f` runs once per attempt, against a fresh copy each time.
    /// Does not return until an attempt succeeds — a mutator that always
    /// vetoes spins forever. Not reentrant (see the module docs).
    pub fn update<F>(&self, mut f: F)
    where
        F: FnMut(&mut T) -> bool,
    {
        let backoff = Backoff::new();
        while !self.update_weak(&mut f) {
            backoff.snooze();
        }
    }
}

impl<T, const N: usize> Drop for AtomicCell<T, N> {
    fn drop(&mut self) {
        // &mut self: no access in flight. The current pointer is the one
        // allocation the cell owns; pool slots belong to the pool.
        let ptr = *self.current.get_mut();
        // SAFETY: non-null since construction, owned solely by this cell.
        unsafe { drop(Box::from_raw(ptr)) };
    }
}

impl<T, const N: usize> Default for AtomicCell<T, N>
where
    T: Clone + Default + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Snapshot-copies the source cell. The copy starts life unshared, so
/// this is an initialization-time operation; it does not transplant any
/// in-flight updates.
impl<T, const N: usize> Clone for AtomicCell<T, N>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        let snapshot = self.read(T::clone);
        Self {
            current: AtomicPtr::new(Box::into_raw(Box::new(snapshot))),
            pool: self.pool.clone(),
        }
    }
}

impl<T, const N: usize> From<T> for AtomicCell<T, N>
where
    T: Clone + Default + Send + Sync + 'static,
{
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T, const N: usize> fmt::Debug for AtomicCell<T, N>
where
    T: Clone + Send + Sync + 'static + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.read(|v| f.debug_struct("AtomicCell").field("value", v).finish())
    }
}

// Comparisons go through snapshot reads so cells can live in sorted and
// ordered containers. Two cells compare by value, not identity, and each
// side is its own snapshot: under concurrent writes the outcome is
// whichever pair of values the two reads observed.

impl<T, const N: usize> PartialEq for AtomicCell<T, N>
where
    T: Clone + Send + Sync + 'static + PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.read(|a| other.read(|b| a == b))
    }
}

impl<T, const N: usize> Eq for AtomicCell<T, N> where T: Clone + Send + Sync + 'static + Eq {}

impl<T, const N: usize> PartialOrd for AtomicCell<T, N>
where
    T: Clone + Send + Sync + 'static + PartialOrd,
{
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        self.read(|a| other.read(|b| a.partial_cmp(b)))
    }
}

impl<T, const N: usize> Ord for AtomicCell<T, N>
where
    T: Clone + Send + Sync + 'static + Ord,
{
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.read(|a| other.read(|b| a.cmp(b)))
    }
}
