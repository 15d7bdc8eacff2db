use std::sync::Arc;

use bit_vec::BitVec;
use log::{debug, info};

use super::{
    locking::{BTreeLockingPolicy, Latched, LockOperation},
    page::BTreePageID,
    scan::{BTreeScan, ScanBound},
    search::{PartialKeyMatch, SearchParams},
    BTree,
};
use crate::{
    error::{ErrorKind, SmallError},
    storage::IndexRow,
    transaction::{LockDuration, Transaction},
    types::SmallResult,
};

/// An index opened by one transaction. All reads and writes go through the
/// locking policy chosen when the tree was opened.
pub struct OpenBTree {
    btree: Arc<BTree>,
    tx: Transaction,
    policy: Box<dyn BTreeLockingPolicy>,
}

impl OpenBTree {
    pub fn new(btree: Arc<BTree>, tx: &Transaction, policy: Box<dyn BTreeLockingPolicy>) -> Self {
        Self {
            btree,
            tx: tx.clone(),
            policy,
        }
    }

    pub fn btree(&self) -> &BTree {
        &self.btree
    }

    pub fn tx(&self) -> &Transaction {
        &self.tx
    }

    pub fn policy(&self) -> &dyn BTreeLockingPolicy {
        self.policy.as_ref()
    }

    fn check_row(&self, row: &IndexRow) -> SmallResult<()> {
        let width = self.btree.schema().row_width();
        if row.len() != width || row.location().is_none() {
            return Err(SmallError::new(
                ErrorKind::Internal,
                &format!(
                    "row {} does not fit index {}, expect {} columns ending with a location",
                    row,
                    self.btree.index_id(),
                    width
                ),
            ));
        }
        Ok(())
    }

    /// Insert a row, keeping the rows in sorted order.
    ///
    /// A row whose key is already present and marked deleted is replaced in
    /// place. A live duplicate fails with `DuplicateKey`.
    pub fn insert(&self, row: &IndexRow) -> SmallResult<()> {
        self.check_row(row)?;
        let btree = self.btree.as_ref();
        let mut template = IndexRow::default();

        loop {
            let mut sp = SearchParams::new(row.clone(), PartialKeyMatch::LeftOf, false);
            let leaf = btree.search(&mut sp)?;
            let slot = sp.result_slot;

            if sp.result_exact {
                let leaf = match self.policy.lock_row_on_page(
                    btree,
                    leaf,
                    slot,
                    &mut template,
                    LockOperation::Insert,
                )? {
                    Latched::Held(leaf) => leaf,
                    Latched::Released => continue,
                };

                if !leaf.page().is_deleted(slot) {
                    return Err(SmallError::new(
                        ErrorKind::DuplicateKey,
                        &format!(
                            "duplicate key {} in index {}, existing row: {}",
                            row,
                            btree.index_id(),
                            template
                        ),
                    ));
                }

                // the new row reuses the slot, it needs its own lock
                let leaf = match self.policy.lock_row_in_memory(
                    btree,
                    Some(leaf),
                    None,
                    row,
                    LockOperation::Insert,
                )? {
                    Latched::Held((Some(leaf), _)) => leaf,
                    _ => continue,
                };
                leaf.page_mut().replace_row(slot, row.clone());
                debug!("{} replaced deleted row {} by {}", self.tx, template, row);
                return Ok(());
            }

            if leaf.page().is_full() {
                let pid = leaf.pid();
                drop(leaf);
                btree.split_leaf(&pid)?;
                continue;
            }

            // wait for range readers covering the gap the row goes into
            let leaf = match self.policy.lock_previous_row(
                btree,
                leaf,
                slot,
                &mut template,
                LockOperation::InsertPreviousKey,
                LockDuration::Instant,
            )? {
                Latched::Held(leaf) => leaf,
                Latched::Released => continue,
            };

            let leaf = match self.policy.lock_row_in_memory(
                btree,
                Some(leaf),
                None,
                row,
                LockOperation::Insert,
            )? {
                Latched::Held((Some(leaf), _)) => leaf,
                _ => continue,
            };

            leaf.page_mut().insert_row(slot, row.clone());
            return Ok(());
        }
    }

    /// Mark a row deleted. Return false if there is no such live row.
    pub fn delete(&self, row: &IndexRow) -> SmallResult<bool> {
        self.check_row(row)?;
        let btree = self.btree.as_ref();
        let mut template = IndexRow::default();

        loop {
            let mut sp = SearchParams::new(row.clone(), PartialKeyMatch::LeftOf, false);
            let leaf = btree.search(&mut sp)?;
            if !sp.result_exact {
                return Ok(false);
            }
            let slot = sp.result_slot;

            // a unique index matches on the key alone, the location may differ
            if leaf.page().get_row(slot).map_or(true, |r| r != row) {
                return Ok(false);
            }

            let leaf = match self.policy.lock_row_on_page(
                btree,
                leaf,
                slot,
                &mut template,
                LockOperation::Delete,
            )? {
                Latched::Held(leaf) => leaf,
                Latched::Released => continue,
            };

            let mut page = leaf.page_mut();
            let same_row = page.get_row(slot).map_or(false, |r| r == row);
            if !same_row || page.is_deleted(slot) {
                return Ok(false);
            }
            page.set_deleted(slot, true);
            return Ok(true);
        }
    }

    /// Remove the deleted rows of a leaf no other transaction still holds a
    /// lock on. Return how many rows were removed.
    pub fn purge_committed_deletes(&self, pid: &BTreePageID) -> SmallResult<usize> {
        let btree = self.btree.as_ref();
        let leaf = btree.latch_leaf_wait(pid)?;
        let mut template = IndexRow::default();
        let mut purged = 0;

        let count = leaf.page().row_count();
        for slot in (1..=count).rev() {
            if !leaf.page().is_deleted(slot) {
                continue;
            }
            if self
                .policy
                .lock_scan_committed_deleted_row(btree, &leaf, &mut template, slot)?
            {
                leaf.page_mut().remove_row(slot);
                purged += 1;
            } else {
                debug!("{} keeps deleted row {}, still locked", pid, template);
            }
        }

        if purged > 0 {
            info!("purged {} committed deleted rows from {}", purged, pid);
        }
        Ok(purged)
    }

    /// Purge every leaf of the index.
    pub fn purge_all_committed_deletes(&self) -> SmallResult<usize> {
        let mut purged = 0;
        for pid in self.btree.leaf_pids()? {
            purged += self.purge_committed_deletes(&pid)?;
        }
        Ok(purged)
    }

    /// Open a range scan. `columns` selects the columns returned, all of
    /// them when None.
    pub fn open_scan(
        &self,
        start: Option<ScanBound>,
        stop: Option<ScanBound>,
        for_update: bool,
        columns: Option<BitVec<u32>>,
    ) -> BTreeScan {
        BTreeScan::new(self, start, stop, for_update, columns)
    }

    /// Scan the whole index.
    pub fn scan_all(&self) -> BTreeScan {
        self.open_scan(None, None, false, None)
    }
}
