//! Cursors: shared-ownership positions into the list.
//!
//! A cursor keeps its node's cell alive through the `Arc` it holds, so it
//! stays usable even after the node is unlinked by another thread — it
//! then reports [`is_deleted`](Cursor::is_deleted) and refuses updates.
//! This is what lets threads hold positions across concurrent mutation
//! without any coordination beyond the node flags.

use crate::node::NodeRef;
use crossbeam_utils::Backoff;
use std::sync::Arc;

/// A position in an [`AtomicList`]: either a node (the head sentinel or a
/// data node) or the end.
///
/// Cursors are cheap to clone and free to hold; an outstanding cursor
/// keeps its node allocated but never blocks writers.
///
/// [`AtomicList`]: crate::AtomicList
pub struct Cursor<T, const N: usize> {
    pub(crate) node: Option<NodeRef<T, N>>,
}

impl<T, const N: usize> Cursor<T, N> {
    /// The end position.
    pub fn end() -> Self {
        Self { node: None }
    }

    /// True at the end position.
    #[inline]
    pub fn is_end(&self) -> bool {
        self.node.is_none()
    }

    pub(crate) fn cell(&self) -> Option<&NodeRef<T, N>> {
        self.node.as_ref()
    }
}

impl<T, const N: usize> Cursor<T, N>
where
    T: Clone + Default + Send + Sync + 'static,
{
    /// Moves to the successor node, or to the end.
    ///
    /// Advancing from a deleted node follows the `next` the node carried
    /// when it was unlinked, which may itself lead to deleted territory;
    /// callers that need a live position restart from the list head.
    pub fn advance(&mut self) {
        self.node = self
            .node
            .as_ref()
            .and_then(|cell| cell.read(|n| n.next.clone()));
    }

    /// Snapshot-reads the node's payload. `None` at the end position.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.node.as_ref().map(|cell| cell.read(|n| f(&n.data)))
    }

    /// Whether the node is reserved by a deleter or pinned. `false` at the
    /// end position.
    pub fn is_locked(&self) -> bool {
        self.node
            .as_ref()
            .is_some_and(|cell| cell.read(|n| n.locked))
    }

    /// Whether the node has been unlinked. `false` at the end position.
    pub fn is_deleted(&self) -> bool {
        self.node
            .as_ref()
            .is_some_and(|cell| cell.read(|n| n.deleted))
    }

    /// One attempt to update the payload. Fails on contention, if the
    /// mutator vetoes, or — permanently — once the node is deleted.
    pub fn update_weak(&self, f: impl FnOnce(&mut T) -> bool) -> bool {
        let Some(cell) = self.node.as_ref() else {
            return false;
        };
        cell.update_weak(|n| {
            if n.deleted {
                return false;
            }
            f(&mut n.data)
        })
    }

    /// Updates the payload, retrying on contention until the edit takes or
    /// the node is observed deleted (then `false`). A mutator that always
    /// vetoes spins forever, as with `AtomicCell::update`.
    pub fn update(&self, mut f: impl FnMut(&mut T) -> bool) -> bool {
        let Some(cell) = self.node.as_ref() else {
            return false;
        };
        let backoff = Backoff::new();
        loop {
            let mut gone = false;
            let applied = cell.update_weak(|n| {
                if n.deleted {
                    gone = true;
                    return false;
                }
                f(&mut n.data)
            });
            if applied {
                return true;
            }
            if gone {
                return false;
            }
            backoff.snooze();
        }
    }

    /// Pins the node: sets `locked` and leaves it that way, so the node
    /// can never be unlinked and nothing can be inserted after it.
    ///
    /// Returns `false` if the node is already deleted (or at the end).
    /// There is no unpin; a pinned node stays in the list for the list's
    /// life.
    pub fn lock(&self) -> bool {
        let Some(cell) = self.node.as_ref() else {
            return false;
        };
        let backoff = Backoff::new();
        loop {
            let mut gone = false;
            let applied = cell.update_weak(|n| {
                if n.deleted {
                    gone = true;
                    return false;
                }
                n.locked = true;
                true
            });
            if applied {
                return true;
            }
            if gone {
                return false;
            }
            backoff.snooze();
        }
    }
}

impl<T, const N: usize> Clone for Cursor<T, N> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
        }
    }
}

/// Cursors compare by node identity, not payload: two cursors are equal
/// when they sit on the same node (or both at the end).
impl<T, const N: usize> PartialEq for Cursor<T, N> {
    fn eq(&self, other: &Self) -> bool {
        match (&self.node, &other.node) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl<T, const N: usize> Eq for Cursor<T, N> {}

/// Walks the list's data nodes, yielding a [`Cursor`] per node.
///
/// The walk is a best-effort snapshot: nodes inserted or removed while
/// iterating may or may not be seen, but every yielded cursor points at a
/// node that was linked at the moment its predecessor was read.
pub struct Iter<T, const N: usize> {
    pub(crate) cursor: Option<NodeRef<T, N>>,
}

impl<T, const N: usize> Iterator for Iter<T, N>
where
    T: Clone + Default + Send + Sync + 'static,
{
    type Item = Cursor<T, N>;

    fn next(&mut self) -> Option<Cursor<T, N>> {
        let current = self.cursor.take()?;
        self.cursor = current.read(|n| n.next.clone());
        Some(Cursor {
            node: Some(current),
        })
    }
}
