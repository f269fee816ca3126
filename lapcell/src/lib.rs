//! Lapcell: lock-free atomic containers for values wider than a word.
//!
//! An [`AtomicCell<T, N>`] wraps an arbitrary `Clone` value and lets any
//! number of threads read and update it atomically, even when `T` is far
//! larger than anything the hardware can CAS. Writers edit a private copy
//! drawn from a bounded recycling pool and publish it with one pointer
//! CAS; readers snapshot the published pointer and are guaranteed the
//! value behind it stays put for the duration of their access. Slot reuse
//! is bounded by a lap barrier over the pool, so no hazard pointers,
//! epochs, or reference counts are needed on the read path.
//!
//! # Key Properties
//!
//! - **Wait-free reads**: a usage-counter tick, one atomic load, done
//! - **Lock-free writes**: `update_weak` finishes in bounded steps
//! - **Bounded memory**: `N` pre-allocated slots per value type, recycled
//!   forever — no allocation on the update path
//! - **Panic-safe**: a mutator that unwinds leaves the pool and counters
//!   exactly as it found them
//!
//! # Example
//!
//! ```rust
//! use lapcell::AtomicCell;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let cell: Arc<AtomicCell<Vec<u32>, 8>> = Arc::new(AtomicCell::new(Vec::new()));
//!
//! let handles: Vec<_> = (0u32..4)
//!     .map(|tid| {
//!         let cell = cell.clone();
//!         thread::spawn(move || {
//!             cell.update(|v| {
//!                 v.push(tid);
//!                 true
//!             });
//!         })
//!     })
//!     .collect();
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//!
//! assert_eq!(cell.read(|v| v.len()), 4);
//! ```
//!
//! The pool capacity `N` must be a nonzero power of two; twice the number
//! of expected writer threads is a good default. All cells of the same
//! `(T, N)` share one process-wide pool unless one is injected explicitly
//! with [`AtomicCell::with_pool`].

#![warn(missing_docs)]

mod cell;
mod counter;
mod mutex_cell;
mod pool;
mod relaxed;

pub use cell::AtomicCell;
pub use mutex_cell::MutexCell;
pub use pool::SlotPool;
