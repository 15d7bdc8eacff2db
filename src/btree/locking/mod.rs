//! Row locking done on behalf of the tree-walking code.
//!
//! Every operation that may have to wait for a lock tries NOWAIT first,
//! while the caller's latches are held. If that fails the latches are
//! released before the blocking request, so a latch is never held across a
//! lock wait.

mod no_locking;
mod row_locking;

pub use no_locking::NoLocking;
pub use row_locking::RowLocking;

use super::{buffer_pool::LeafGuard, position::RowPosition, BTree};
use crate::{storage::IndexRow, transaction::LockDuration, types::SmallResult};

/// Outcome of a lock request made while holding latches.
#[derive(Debug)]
pub enum Latched<G> {
    /// The lock was granted without giving up the latches, here they are
    /// back, untouched.
    Held(G),

    /// The latches were released to wait for the lock. The lock is granted
    /// but every page reference the caller had is stale, it must search
    /// again.
    Released,
}

impl<G> Latched<G> {
    pub fn is_held(&self) -> bool {
        matches!(self, Latched::Held(_))
    }

    pub fn into_held(self) -> Option<G> {
        match self {
            Latched::Held(g) => Some(g),
            Latched::Released => None,
        }
    }

    pub fn map<H, F: FnOnce(G) -> H>(self, f: F) -> Latched<H> {
        match self {
            Latched::Held(g) => Latched::Held(f(g)),
            Latched::Released => Latched::Released,
        }
    }
}

/// Latches handed over with `lock_row_in_memory`.
pub type LeafPair = (Option<LeafGuard>, Option<LeafGuard>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOperation {
    Read,
    Insert,
    InsertPreviousKey,
    Delete,
}

/// Locking done while walking the tree, one implementation per kind of
/// index.
pub trait BTreeLockingPolicy: Send + Sync {
    /// Lock the row at the position's slot, or the row previous to slot 1
    /// when the position is at slot 0.
    ///
    /// Return true if the lock was granted with the latch still held. On
    /// false the latch is gone and the caller must reposition the scan: for
    /// a row slot the position was saved before releasing, for slot 0 it was
    /// not and the caller restarts positioning.
    fn lock_row_for_scan(
        &self,
        btree: &BTree,
        pos: &mut RowPosition,
        template: &mut IndexRow,
        is_previous_key: bool,
        for_update: bool,
        op: LockOperation,
    ) -> SmallResult<bool>;

    /// Release the read lock of the row the position points to, if this kind
    /// of locking releases read locks early. Never blocks.
    fn unlock_scan_row_after_read(&self, pos: &RowPosition, for_update: bool);

    /// NOWAIT exclusive probe, true if no other transaction holds a lock on
    /// the (deleted) row at `slot`. Never waits, never touches the latch.
    fn lock_scan_committed_deleted_row(
        &self,
        btree: &BTree,
        leaf: &LeafGuard,
        template: &mut IndexRow,
        slot: usize,
    ) -> SmallResult<bool>;

    /// Lock the row logically previous to `slot` on `leaf`, walking left
    /// across leaves when `slot` is the first one.
    fn lock_previous_row(
        &self,
        btree: &BTree,
        leaf: LeafGuard,
        slot: usize,
        template: &mut IndexRow,
        op: LockOperation,
        duration: LockDuration,
    ) -> SmallResult<Latched<LeafGuard>>;

    /// Lock a row that is not on a page (yet).
    fn lock_row_in_memory(
        &self,
        btree: &BTree,
        leaf: Option<LeafGuard>,
        aux_leaf: Option<LeafGuard>,
        row: &IndexRow,
        op: LockOperation,
    ) -> SmallResult<Latched<LeafPair>>;

    /// Lock the row at `slot` on `leaf`. The row is copied into `template`.
    fn lock_row_on_page(
        &self,
        btree: &BTree,
        leaf: LeafGuard,
        slot: usize,
        template: &mut IndexRow,
        op: LockOperation,
    ) -> SmallResult<Latched<LeafGuard>>;
}
