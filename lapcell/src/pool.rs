//! Slot pool: a fixed-capacity recycle queue with a lap barrier.
//!
//! The pool owns `N` pre-allocated `T` slots threaded through a ring of
//! `2 * N` pointer positions. Writers take a slot from the `left` end,
//! publish it as a cell's live value, and hand the displaced value back at
//! the `right` end. Because slots are recycled rather than freed, a reader
//! can hold a pointer to a retired slot for a bounded window — at most one
//! lap of the ring — and the barrier at each lap boundary waits for that
//! window to close before any slot from the previous lap is reused.
//!
//! The ring is doubled (`2 * N` positions for `N` slots) so `left == right`
//! unambiguously means "empty" and so the dual-phase usage counter can
//! attribute each access to one half.
//!
//! A pool is shared: every cell constructed with [`SlotPool::shared`] for
//! the same `(T, N)` draws from one process-wide pool, amortizing the
//! pre-allocation across all cells of that type. A private pool can be
//! injected instead via `AtomicCell::with_pool`.

use crate::counter::UsageCounter;
use crate::relaxed::Relaxed;
use core::cell::Cell;
use core::marker::PhantomData as marker;
use core::sync::atomic::{AtomicPtr, Ordering, fence};
use once_cell::sync::Lazy;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

// ---------------------------------------------------------------------------
// Allocation failure
// ---------------------------------------------------------------------------

/// Why a slot could not be handed out. All variants surface as a `false`
/// return from `update_weak`; callers retry rather than branch on the
/// reason, so this type stays crate-private.
#[derive(Debug, Clone, Copy)]
pub(crate) enum AllocError {
    /// Every slot is checked out by in-flight writers.
    QueueEmpty,
    /// A lap boundary was reached and the previous lap has not drained.
    AtBarrier,
    /// Another writer won the race for the head slot.
    CasLost,
}

// ---------------------------------------------------------------------------
// SlotPool
// ---------------------------------------------------------------------------

/// Fixed pool of `N` recycled `T` slots, shared by every cell built on it.
///
/// `N` must be a nonzero power of two (checked at compile time). Twice
/// the expected number of concurrent writer threads is usually enough;
/// synchronization happens once per `N` allocations.
pub struct SlotPool<T, const N: usize> {
    /// `2 * N` pointer positions. Only `[left, right)` hold live free
    /// slots; the rest are stale leftovers from earlier laps, never read.
    ring: Box<[AtomicPtr<T>]>,
    /// Next position to allocate from. Monotone, wrapping.
    left: Relaxed,
    /// Next position to return into. Monotone, wrapping; `right - left`
    /// is the number of free slots, in `[0, N]`.
    right: Relaxed,
    users: UsageCounter<N>,
    marker: marker<T>,
}

impl<T, const N: usize> SlotPool<T, N> {
    const MASK: u32 = (2 * N - 1) as u32;
    const LAP_MASK: u32 = (N - 1) as u32;
}

impl<T: Default, const N: usize> SlotPool<T, N> {
    /// Creates a pool with `N` freshly default-constructed slots.
    pub fn new() -> Self {
        const {
            assert!(
                N >= 1 && N.is_power_of_two() && N <= u32::MAX as usize / 4,
                "slot pool capacity must be a nonzero power of two"
            )
        };
        let mut ring = Vec::with_capacity(2 * N);
        for _ in 0..N {
            ring.push(AtomicPtr::new(Box::into_raw(Box::new(T::default()))));
        }
        for _ in N..2 * N {
            ring.push(AtomicPtr::new(core::ptr::null_mut()));
        }
        Self {
            ring: ring.into_boxed_slice(),
            left: Relaxed::new(0),
            right: Relaxed::new(N as u32),
            users: UsageCounter::new(),
            marker,
        }
    }
}

impl<T: Default + Send + Sync + 'static, const N: usize> SlotPool<T, N> {
    /// The process-wide pool for this `(T, N)` combination, created on
    /// first use. Pools obtained here live for the life of the process.
    pub fn shared() -> Arc<Self> {
        let mut pools = REGISTRY.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = pools
            .entry((TypeId::of::<T>(), N))
            .or_insert_with(|| Arc::new(Self::new()) as Arc<dyn Any + Send + Sync>)
            .clone();
        drop(pools);
        match entry.downcast::<Self>() {
            Ok(pool) => pool,
            Err(_) => unreachable!("registry entries are keyed by (TypeId, N)"),
        }
    }
}

impl<T, const N: usize> SlotPool<T, N> {
    /// Takes a free slot off the `left` end, or says why it could not.
    ///
    /// Single attempt, bounded steps. The barrier check runs before the
    /// index CAS so a writer can never move `left` past an undrained lap
    /// boundary.
    pub(crate) fn try_allocate(&self) -> Result<*mut T, AllocError> {
        let left = self.left.load();
        let right = self.right.load();

        if left == right {
            std::thread::yield_now();
            return Err(AllocError::QueueEmpty);
        }

        self.check_barrier(left, right)?;

        // The CAS (not a plain fetch_add) is what makes the barrier
        // airtight: losers re-read `left` and re-run the boundary check.
        if !self.left.compare_exchange_weak_acq_rel(left, left.wrapping_add(1)) {
            return Err(AllocError::CasLost);
        }

        Ok(self.ring[(left & Self::MASK) as usize].load(Ordering::Relaxed))
    }

    /// The lap barrier. Runs on every allocation at a lap boundary
    /// (`left % N == 0`) and fails — it never blocks — until both
    /// conditions hold:
    ///
    /// - all `N` slots of the previous lap are back in the ring, and
    /// - no access ticketed in the previous half is still live.
    fn check_barrier(&self, left: u32, right: u32) -> Result<(), AllocError> {
        if left & Self::LAP_MASK != 0 {
            return Ok(());
        }

        // A writer from the previous lap still holds a slot.
        if right.wrapping_sub(left) < N as u32 {
            std::thread::yield_now();
            return Err(AllocError::AtBarrier);
        }

        // A reader (or a writer mid-return) from the previous half is
        // still live.
        if !self.users.other_phase_empty(right) {
            std::thread::yield_now();
            return Err(AllocError::AtBarrier);
        }

        // Pairs with the release fence of the store that filled the lap:
        // from here on, the previous lap's slot-pointer stores (and the
        // values behind them) are visible.
        fence(Ordering::Acquire);
        Ok(())
    }

    /// Returns a slot at the `right` end.
    ///
    /// The caller must still be registered with the usage counter while
    /// calling this: the barrier relies on the counter to know when the
    /// position store has landed.
    pub(crate) fn release(&self, slot: *mut T) {
        let pos = self.right.fetch_add(1);
        self.ring[(pos & Self::MASK) as usize].store(slot, Ordering::Relaxed);
        // The store that fills a lap publishes the whole lap's returns to
        // the next barrier crossing.
        if pos & Self::LAP_MASK == 0 {
            fence(Ordering::Release);
        }
    }

    /// Registers an access for the current phase; the returned guard
    /// deregisters on drop, on every exit path.
    pub(crate) fn register(&self) -> UsageGuard<'_, T, N> {
        let ticket = self.right.load();
        self.users.enter(ticket);
        UsageGuard { pool: self, ticket }
    }
}

impl<T: Default, const N: usize> Default for SlotPool<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Drop for SlotPool<T, N> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        {
            debug_assert_eq!(
                self.users.residual(),
                (0, 0),
                "slot pool dropped with live accesses"
            );
        }
        // &mut self: no concurrent writers. Free the `[left, right)` free
        // range; everything outside it is a stale duplicate or a position
        // never written.
        let right = self.right.load();
        let mut i = self.left.load();
        while i != right {
            let ptr = self.ring[(i & Self::MASK) as usize].load(Ordering::Relaxed);
            // SAFETY: positions in [left, right) hold distinct live slots
            // allocated via Box::into_raw, each owned solely by the pool.
            unsafe { drop(Box::from_raw(ptr)) };
            i = i.wrapping_add(1);
        }
    }
}

// ---------------------------------------------------------------------------
// RAII guards
// ---------------------------------------------------------------------------

/// Keeps the usage counter raised for one access.
pub(crate) struct UsageGuard<'a, T, const N: usize> {
    pool: &'a SlotPool<T, N>,
    ticket: u32,
}

impl<T, const N: usize> Drop for UsageGuard<'_, T, N> {
    #[inline]
    fn drop(&mut self) {
        self.pool.users.leave(self.ticket);
    }
}

/// Owns one checked-out slot and returns it to the pool on drop.
///
/// On a successful publish the guard is redirected to the displaced
/// pointer, so the *old* value goes back instead; on veto, CAS loss, or a
/// panic in the user closure, the checked-out slot itself goes back.
/// Either way exactly one pointer returns per allocation.
pub(crate) struct SlotGuard<'a, T, const N: usize> {
    pool: &'a SlotPool<T, N>,
    slot: Cell<*mut T>,
}

impl<'a, T, const N: usize> SlotGuard<'a, T, N> {
    #[inline]
    pub(crate) fn new(pool: &'a SlotPool<T, N>, slot: *mut T) -> Self {
        Self {
            pool,
            slot: Cell::new(slot),
        }
    }

    /// Swap which pointer will be returned to the pool.
    #[inline]
    pub(crate) fn redirect(&self, displaced: *mut T) {
        self.slot.set(displaced);
    }
}

impl<T, const N: usize> Drop for SlotGuard<'_, T, N> {
    #[inline]
    fn drop(&mut self) {
        self.pool.release(self.slot.get());
    }
}

// ---------------------------------------------------------------------------
// Shared-pool registry
// ---------------------------------------------------------------------------

type Registry = Mutex<HashMap<(TypeId, usize), Arc<dyn Any + Send + Sync>>>;

/// One pool per `(T, N)`, created lazily, never torn down: the registry
/// keeps an `Arc` forever, so shared pools are deliberately leaked at
/// process exit rather than raced against late readers.
static REGISTRY: Lazy<Registry> = Lazy::new(|| Mutex::new(HashMap::new()));
