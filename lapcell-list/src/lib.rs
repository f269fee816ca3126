//! A concurrent singly linked list built on [`lapcell::AtomicCell`].
//!
//! Every node lives inside its own atomic cell, so linking and unlinking
//! are ordinary cell updates — the list inherits the cell's progress
//! guarantees wholesale. What the list adds is the part a lock-free singly
//! linked list cannot get for free: **safe deletion**. A naive unlink
//! loses races — a concurrent update of the victim would re-publish it
//! with a fresh `next` and resurrect it behind the deleter's back. The fix
//! is a two-step protocol: the deleter first *locks* the victim through
//! the victim's own cell (after which no insertion lands behind it and no
//! competing deleter claims it), and only then unlinks it through the
//! predecessor's cell. Unlinked nodes carry a sticky `deleted` mark, so a
//! cursor left pointing at one knows its node is gone.
//!
//! The head node is a sentinel: it holds no user data, is never locked and
//! never removed, and anchors every insertion and deletion "after" it.
//!
//! # Example
//!
//! ```rust
//! use lapcell_list::AtomicList;
//!
//! let list: AtomicList<u32, 8> = AtomicList::new();
//! list.push_front(1);
//! list.push_front(2);
//!
//! assert_eq!(list.len(), 2);
//! assert_eq!(list.pop_front(), Some(2));
//! assert_eq!(list.pop_front(), Some(1));
//! assert!(list.is_empty());
//! ```
//!
//! `N` is the slot-pool capacity handed to the node cells. It must be a
//! power of two **of at least 2**: a deletion nests two cell updates, so
//! it needs two free slots in flight at once.

#![warn(missing_docs)]

mod cursor;
mod node;

pub use cursor::{Cursor, Iter};
pub use node::Node;

use crate::node::NodeRef;
use crossbeam_utils::Backoff;
use lapcell::{AtomicCell, SlotPool};
use std::sync::Arc;

/// Concurrent singly linked list with per-node logical locking.
///
/// All operations are positional: insertions and deletions act on the
/// successor of a [`Cursor`], with the head sentinel anchoring the front.
/// The `*_weak` operations make one attempt and report failure (node
/// locked, position contended, or pool momentarily dry) for the caller to
/// retry with a fresh position; `push_front`, `pop_front`, and `clear`
/// wrap the retry loop.
pub struct AtomicList<T, const N: usize = 8> {
    head: NodeRef<T, N>,
    pool: Arc<SlotPool<Node<T, N>, N>>,
}

impl<T, const N: usize> AtomicList<T, N>
where
    T: Clone + Default + Send + Sync + 'static,
{
    /// Creates an empty list: just the head sentinel. Node cells draw from
    /// the process-wide pool for this node type.
    pub fn new() -> Self {
        Self::with_pool(SlotPool::shared())
    }

    /// Creates an empty list whose node cells draw from `pool`.
    pub fn with_pool(pool: Arc<SlotPool<Node<T, N>, N>>) -> Self {
        const {
            assert!(
                N >= 2 && N.is_power_of_two(),
                "list pool capacity must be a power of two >= 2: a delete \
                 holds two slots at once"
            )
        };
        Self {
            head: Arc::new(AtomicCell::with_pool(Node::new(T::default()), pool.clone())),
            pool,
        }
    }

    /// A cursor on the head sentinel — the anchor for `insert_after_weak`
    /// and `erase_after_weak` at the front of the list.
    pub fn head(&self) -> Cursor<T, N> {
        Cursor {
            node: Some(self.head.clone()),
        }
    }

    /// Walks the data nodes (the sentinel is skipped).
    ///
    /// Best-effort under concurrent mutation: the walk sees some
    /// interleaving of the updates that ran during it.
    pub fn iter(&self) -> Iter<T, N> {
        Iter {
            cursor: self.head.read(|n| n.next.clone()),
        }
    }

    /// Inserts `value` at the front, retrying until it takes. Returns a
    /// cursor to the new node.
    pub fn push_front(&self, value: T) -> Cursor<T, N> {
        let head = self.head();
        let backoff = Backoff::new();
        loop {
            if let Some(cursor) = self.insert_after_weak(&head, value.clone()) {
                return cursor;
            }
            backoff.snooze();
        }
    }

    /// One attempt to insert `value` after `pos`.
    ///
    /// Fails — `None` — when `pos` is the end, when its node is locked
    /// (reserved by a deleter or pinned), or when the position is
    /// contended. On success the returned cursor points at the new node.
    pub fn insert_after_weak(&self, pos: &Cursor<T, N>, value: T) -> Option<Cursor<T, N>> {
        let pos_cell = pos.cell()?;
        let mut fresh: NodeRef<T, N> = Arc::new(AtomicCell::with_pool(
            Node::new(value),
            self.pool.clone(),
        ));

        let linked = pos_cell.update_weak(|n| {
            if n.locked {
                return false;
            }
            // The new node is still unshared here (this closure runs once
            // and nothing else holds the Arc), so it can be wired up
            // directly, without going through its own cell update.
            match Arc::get_mut(&mut fresh) {
                Some(cell) => cell.get_mut().next = n.next.clone(),
                None => return false,
            }
            n.next = Some(fresh.clone());
            true
        });

        linked.then(|| Cursor { node: Some(fresh) })
    }

    /// Removes the first data node, retrying until a removal takes or the
    /// list is empty. Returns the removed payload.
    pub fn pop_front(&self) -> Option<T> {
        let head = self.head();
        let backoff = Backoff::new();
        loop {
            if self.is_empty() {
                return None;
            }
            if let Some(removed) = self.erase_after_weak(&head) {
                return removed.read(Clone::clone);
            }
            backoff.snooze();
        }
    }

    /// One attempt to remove the successor of `pos` — the two-step delete.
    ///
    /// Step one runs inside the *victim's* cell: observe it unlocked, lock
    /// it, and capture its `next`. Step two runs inside the predecessor's
    /// cell: splice the captured `next` over the victim. If step two fails
    /// after step one locked the victim, the lock is rolled back; if it
    /// succeeds, the victim gets its sticky `deleted` mark.
    ///
    /// Fails — `None` — when `pos` is the end or has no successor, when
    /// `pos`'s node or the victim is locked, or when either step is
    /// contended. On success the returned cursor points at the removed,
    /// tombstoned node (still readable through it).
    pub fn erase_after_weak(&self, pos: &Cursor<T, N>) -> Option<Cursor<T, N>> {
        let pos_cell = pos.cell()?;
        let mut victim: Option<NodeRef<T, N>> = None;

        let unlinked = pos_cell.update_weak(|n| {
            if n.locked {
                return false;
            }
            let Some(target) = n.next.clone() else {
                return false;
            };

            // Step one: claim the victim through its own cell. Reentrant
            // update inside an update — this is why N >= 2.
            let mut spliced_next: Option<NodeRef<T, N>> = None;
            let claimed = target.update_weak(|v| {
                if v.locked {
                    return false;
                }
                v.locked = true;
                spliced_next = v.next.clone();
                true
            });
            if !claimed {
                return false;
            }

            // Step two: unlink. Committed by the caller's publish CAS.
            victim = Some(target);
            n.next = spliced_next;
            true
        });

        match (unlinked, victim) {
            (true, Some(node)) => {
                // Unreachable from the list now; tombstone it for any
                // cursor still holding it. Strong update: contention here
                // is only with cursors editing the payload.
                node.update(|n| {
                    n.deleted = true;
                    true
                });
                Some(Cursor { node: Some(node) })
            }
            (false, Some(node)) => {
                // Locked the victim but lost the unlink — roll the lock
                // back so the node is deletable again.
                node.update(|n| {
                    n.locked = false;
                    true
                });
                None
            }
            _ => None,
        }
    }

    /// Number of data nodes. O(n), and approximate while writers are
    /// active: concurrent inserts and erases may or may not be counted.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Whether the head sentinel has no successor.
    pub fn is_empty(&self) -> bool {
        self.head.read(|n| n.next.is_none())
    }

    /// Pops until empty. Pinned (locked) nodes cannot be removed, so a
    /// list containing one never fully drains; `clear` stops at the first
    /// node it can never get past.
    pub fn clear(&self) {
        let head = self.head();
        loop {
            if self.is_empty() {
                return;
            }
            // A locked first node blocks every further pop attempt.
            let mut first = head.clone();
            first.advance();
            if first.is_locked() {
                return;
            }
            let _ = self.erase_after_weak(&head);
        }
    }
}

impl<T, const N: usize> Default for AtomicList<T, N>
where
    T: Clone + Default + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T, const N: usize> IntoIterator for &'a AtomicList<T, N>
where
    T: Clone + Default + Send + Sync + 'static,
{
    type Item = Cursor<T, N>;
    type IntoIter = Iter<T, N>;

    fn into_iter(self) -> Iter<T, N> {
        self.iter()
    }
}

impl<T, const N: usize> core::fmt::Debug for AtomicList<T, N>
where
    T: Clone + Default + Send + Sync + 'static + core::fmt::Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut list = f.debug_list();
        for cursor in self.iter() {
            cursor.read(|data| {
                list.entry(data);
            });
        }
        list.finish()
    }
}
