//! List node: user data plus the linkage and the two protocol flags.

use core::fmt;
use lapcell::AtomicCell;
use std::sync::Arc;

/// Shared handle to a node's cell. The predecessor's `next` and any number
/// of cursors hold one; the node is freed when the last handle drops.
pub(crate) type NodeRef<T, const N: usize> = Arc<AtomicCell<Node<T, N>, N>>;

/// One list node, stored inside an [`AtomicCell`] so every field update —
/// linkage, flags, payload — publishes atomically as a whole-node swap.
///
/// The flags implement the two-step delete protocol: a deleter first
/// `locked`s its victim (barring new insertions after it and competing
/// deletions of it), then unlinks it and marks it `deleted`. `deleted`
/// implies `locked`, and both are sticky once the node has left the list.
#[derive(Clone, Default)]
pub struct Node<T, const N: usize> {
    /// The payload. Mutable through cursor updates.
    pub data: T,
    /// Reserved by a would-be deleter, or pinned by [`Cursor::lock`].
    ///
    /// [`Cursor::lock`]: crate::Cursor::lock
    pub(crate) locked: bool,
    /// Set once the node has been unlinked. Sticky.
    pub(crate) deleted: bool,
    pub(crate) next: Option<NodeRef<T, N>>,
}

impl<T, const N: usize> Node<T, N> {
    pub(crate) fn new(data: T) -> Self {
        Self {
            data,
            locked: false,
            deleted: false,
            next: None,
        }
    }

    /// Whether a deleter (or a pin) holds this node.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Whether the node has been unlinked from the list.
    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

impl<T: fmt::Debug, const N: usize> fmt::Debug for Node<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The tail is elided: printing `next` would walk the rest of the
        // list under a read ticket per node.
        f.debug_struct("Node")
            .field("data", &self.data)
            .field("locked", &self.locked)
            .field("deleted", &self.deleted)
            .field("has_next", &self.next.is_some())
            .finish()
    }
}
