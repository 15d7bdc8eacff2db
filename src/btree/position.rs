use log::debug;

use super::{
    buffer_pool::LeafGuard,
    page::BTreePageID,
    search::{PartialKeyMatch, SearchParams},
    BTree,
};
use crate::{
    error::{ErrorKind, SmallError},
    storage::{IndexRow, RowLocation},
    types::SmallResult,
};

/// Where a scan is: the latched leaf and slot while positioned, or the key
/// of the current row while the latch is released.
#[derive(Debug, Default)]
pub struct RowPosition {
    current_leaf: Option<LeafGuard>,
    current_slot: usize,

    // row the scan was on when the latch was released
    saved_key: Option<IndexRow>,

    // page and page version at the time of the save, used to skip the
    // re-search when nothing moved
    saved_page: Option<(BTreePageID, u64)>,

    // location of the row last locked through this position
    current_row_location: Option<RowLocation>,
}

impl RowPosition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the latch and forget everything.
    pub fn init(&mut self) {
        self.current_leaf = None;
        self.current_slot = 0;
        self.saved_key = None;
        self.saved_page = None;
        self.current_row_location = None;
    }

    pub fn set(&mut self, leaf: LeafGuard, slot: usize) {
        self.current_leaf = Some(leaf);
        self.current_slot = slot;
    }

    pub fn is_latched(&self) -> bool {
        self.current_leaf.is_some()
    }

    pub fn current_leaf(&self) -> Option<&LeafGuard> {
        self.current_leaf.as_ref()
    }

    pub fn take_leaf(&mut self) -> Option<LeafGuard> {
        self.current_leaf.take()
    }

    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    pub fn set_current_slot(&mut self, slot: usize) {
        self.current_slot = slot;
    }

    pub fn current_row_location(&self) -> Option<RowLocation> {
        self.current_row_location
    }

    pub fn set_current_row_location(&mut self, location: Option<RowLocation>) {
        self.current_row_location = location;
    }

    pub fn saved_key(&self) -> Option<&IndexRow> {
        self.saved_key.as_ref()
    }

    /// Remember the row at the current slot and release the latch.
    pub fn save_and_release(&mut self) -> SmallResult<()> {
        let leaf = self.current_leaf.take().ok_or_else(|| {
            SmallError::new(
                ErrorKind::ScanNotPositioned,
                "cannot save a position that holds no latch",
            )
        })?;

        let page = leaf.page();
        match page.get_row(self.current_slot) {
            Some(row) => {
                self.saved_key = Some(row.clone());
                self.saved_page = Some((page.get_pid(), page.version()));
            }
            None => {
                return Err(SmallError::new(
                    ErrorKind::ScanNotPositioned,
                    &format!(
                        "no row at slot {} of {} to save",
                        self.current_slot,
                        page.get_pid()
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Point the saved position at another row, the page hint no longer
    /// applies.
    pub(crate) fn retarget(&mut self, row: IndexRow) {
        self.saved_key = Some(row);
        self.saved_page = None;
    }

    /// Latch the leaf holding the saved row again.
    ///
    /// If the saved page did not change since the save the old slot is
    /// reused, otherwise the tree is searched for the saved key. When the
    /// row is gone the position is put on the row in front of where it would
    /// be if `missing_row_ok`, else false is returned with no latch held.
    pub fn reposition(&mut self, btree: &BTree, missing_row_ok: bool) -> SmallResult<bool> {
        let key = self.saved_key.clone().ok_or_else(|| {
            SmallError::new(ErrorKind::ScanNotPositioned, "no saved position to return to")
        })?;
        self.current_leaf = None;

        if let Some((pid, version)) = self.saved_page {
            let leaf = btree.latch_leaf_wait(&pid)?;
            let unchanged = leaf.page().version() == version;
            if unchanged {
                debug!("reposition on {} without search", pid);
                self.current_leaf = Some(leaf);
                return Ok(true);
            }
        }

        let mut sp = SearchParams::new(key, PartialKeyMatch::LeftOf, false);
        let leaf = btree.search(&mut sp)?;
        self.saved_page = None;

        if !sp.result_exact && !missing_row_ok {
            debug!("reposition: {} is gone", sp.search_key());
            return Ok(false);
        }

        self.current_slot = if sp.result_exact {
            sp.result_slot
        } else {
            sp.result_slot - 1
        };
        debug!(
            "reposition by search on {}, slot: {}",
            leaf.pid(),
            self.current_slot
        );
        self.current_leaf = Some(leaf);
        Ok(true)
    }
}
