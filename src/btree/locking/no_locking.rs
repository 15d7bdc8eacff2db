use super::{BTreeLockingPolicy, Latched, LeafPair, LockOperation};
use crate::{
    btree::{buffer_pool::LeafGuard, position::RowPosition, BTree},
    storage::IndexRow,
    transaction::LockDuration,
    types::SmallResult,
};

/// Policy of indexes that need no row locks: every request is granted on
/// the spot and the latches are handed back.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLocking;

impl BTreeLockingPolicy for NoLocking {
    fn lock_row_for_scan(
        &self,
        _btree: &BTree,
        _pos: &mut RowPosition,
        _template: &mut IndexRow,
        _is_previous_key: bool,
        _for_update: bool,
        _op: LockOperation,
    ) -> SmallResult<bool> {
        Ok(true)
    }

    fn unlock_scan_row_after_read(&self, _pos: &RowPosition, _for_update: bool) {}

    fn lock_scan_committed_deleted_row(
        &self,
        _btree: &BTree,
        _leaf: &LeafGuard,
        _template: &mut IndexRow,
        _slot: usize,
    ) -> SmallResult<bool> {
        Ok(true)
    }

    fn lock_previous_row(
        &self,
        _btree: &BTree,
        leaf: LeafGuard,
        _slot: usize,
        _template: &mut IndexRow,
        _op: LockOperation,
        _duration: LockDuration,
    ) -> SmallResult<Latched<LeafGuard>> {
        Ok(Latched::Held(leaf))
    }

    fn lock_row_in_memory(
        &self,
        _btree: &BTree,
        leaf: Option<LeafGuard>,
        aux_leaf: Option<LeafGuard>,
        _row: &IndexRow,
        _op: LockOperation,
    ) -> SmallResult<Latched<LeafPair>> {
        Ok(Latched::Held((leaf, aux_leaf)))
    }

    fn lock_row_on_page(
        &self,
        _btree: &BTree,
        leaf: LeafGuard,
        slot: usize,
        template: &mut IndexRow,
        _op: LockOperation,
    ) -> SmallResult<Latched<LeafGuard>> {
        leaf.page().fetch_into(slot, template);
        Ok(Latched::Held(leaf))
    }
}
