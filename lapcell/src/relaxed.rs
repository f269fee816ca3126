//! Relaxed-by-default atomic counter.
//!
//! The pool indices and usage counters carry no ordering obligations of
//! their own: the happens-before edges the algorithm needs are supplied by
//! explicit fences at the publish CAS and the lap barrier, and by the
//! handful of explicitly-ordered variants below. Everything else is
//! relaxed so that the common path pays for a plain atomic RMW and
//! nothing more.

use core::sync::atomic::{AtomicU32, Ordering};

/// A `u32` counter whose unadorned operations are all `Relaxed`.
///
/// The `_acquire` / `_release` / `_acq_rel` variants exist only for the
/// contract points that need them; their names make every non-relaxed
/// access greppable.
///
/// Every instance owns a full cache line. The five counters in a pool
/// (`left`, `right`, two phase counters) are each write-hot from a
/// different set of threads; two of them on one line would put the
/// line in permanent ping-pong. 128B on aarch64 (Apple M-series and
/// Neoverse prefetch in pairs), 256B on s390x, 64B elsewhere.
#[cfg_attr(target_arch = "aarch64", repr(align(128)))]
#[cfg_attr(target_arch = "s390x", repr(align(256)))]
#[cfg_attr(
    not(any(target_arch = "aarch64", target_arch = "s390x")),
    repr(align(64))
)]
pub(crate) struct Relaxed(AtomicU32);

impl Relaxed {
    pub(crate) const fn new(value: u32) -> Self {
        Self(AtomicU32::new(value))
    }

    #[inline]
    pub(crate) fn load(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn load_acquire(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }

    /// Returns the previous value.
    #[inline]
    pub(crate) fn fetch_add(&self, n: u32) -> u32 {
        self.0.fetch_add(n, Ordering::Relaxed)
    }

    /// Returns the previous value. The release ordering publishes every
    /// write sequenced before this decrement to whoever later observes the
    /// counter with [`load_acquire`](Self::load_acquire).
    #[inline]
    pub(crate) fn fetch_sub_release(&self, n: u32) -> u32 {
        self.0.fetch_sub(n, Ordering::Release)
    }

    /// CAS whose success is `AcqRel`: winners of a contended slot index
    /// inherit the visibility established by earlier winners (the RMW
    /// chain on the index forms a release sequence).
    #[inline]
    pub(crate) fn compare_exchange_weak_acq_rel(&self, current: u32, new: u32) -> bool {
        self.0
            .compare_exchange_weak(current, new, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }
}

impl Default for Relaxed {
    fn default() -> Self {
        Self::new(0)
    }
}

impl core::fmt::Debug for Relaxed {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("Relaxed").field(&self.load()).finish()
    }
}
