use std::cmp::Ordering;

use bit_vec::BitVec;
use log::debug;

use super::{
    buffer_pool::LeafGuard,
    controller::OpenBTree,
    locking::LockOperation,
    position::RowPosition,
    scan_info::{ScanCounters, ScanInfo},
    search::{PartialKeyMatch, SearchParams},
};
use crate::{
    error::{ErrorKind, SmallError},
    storage::IndexRow,
    types::SmallResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOperator {
    GE,
    GT,
}

/// One end of a scan range.
///
/// As a start bound GE includes rows equal to the key and GT skips them. As
/// a stop bound GE stops in front of the first row equal to the key and GT
/// stops behind the last one. A shorter key matches every row it is a prefix
/// of.
#[derive(Debug, Clone)]
pub struct ScanBound {
    pub key: IndexRow,
    pub op: ScanOperator,
}

impl ScanBound {
    pub fn ge(key: IndexRow) -> Self {
        Self {
            key,
            op: ScanOperator::GE,
        }
    }

    pub fn gt(key: IndexRow) -> Self {
        Self {
            key,
            op: ScanOperator::GT,
        }
    }

    pub fn partial_key_match(&self) -> PartialKeyMatch {
        match self.op {
            ScanOperator::GE => PartialKeyMatch::LeftOf,
            ScanOperator::GT => PartialKeyMatch::RightOf,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Uninitialized,
    InProgress,
    Done,
}

/// A forward range scan.
///
/// Rows are locked through the locking policy of the open tree as they are
/// visited. No latch is held between two calls of `next_row`.
pub struct BTreeScan<'a> {
    open: &'a OpenBTree,

    start: Option<ScanBound>,
    stop: Option<ScanBound>,
    for_update: bool,

    // None means every column
    columns: Option<BitVec<u32>>,

    pos: RowPosition,
    template: IndexRow,
    state: ScanState,

    counters: ScanCounters,
}

impl<'a> BTreeScan<'a> {
    pub(crate) fn new(
        open: &'a OpenBTree,
        start: Option<ScanBound>,
        stop: Option<ScanBound>,
        for_update: bool,
        columns: Option<BitVec<u32>>,
    ) -> Self {
        Self {
            open,
            start,
            stop,
            for_update,
            columns,
            pos: RowPosition::new(),
            template: IndexRow::default(),
            state: ScanState::Uninitialized,
            counters: ScanCounters::default(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == ScanState::Done
    }

    /// Give up the position and every latch, the scan returns no more rows.
    pub fn close(&mut self) {
        self.state = ScanState::Done;
        self.pos.init();
    }

    fn current_leaf(&self) -> SmallResult<&LeafGuard> {
        self.pos.current_leaf().ok_or_else(|| {
            SmallError::new(ErrorKind::ScanNotPositioned, "scan holds no latch")
        })
    }

    /// Latch the leaf where the range starts and lock the key in front of
    /// the range. Starts over whenever the latch had to be given up.
    fn position_at_start(&mut self) -> SmallResult<()> {
        let btree = self.open.btree();
        let policy = self.open.policy();

        loop {
            self.pos.init();
            let height = btree.height()?;

            let (leaf, slot, exact) = match &self.start {
                None => (btree.latch_leftmost_leaf()?, 0, false),
                Some(bound) => {
                    let mut sp =
                        SearchParams::new(bound.key.clone(), bound.partial_key_match(), false);
                    let leaf = btree.search(&mut sp)?;
                    let slot = match bound.op {
                        ScanOperator::GE => sp.result_slot - 1,
                        ScanOperator::GT if sp.result_exact => sp.result_slot,
                        ScanOperator::GT => sp.result_slot - 1,
                    };
                    (leaf, slot, sp.result_exact)
                }
            };
            self.counters.pages_visited += height;
            self.pos.set(leaf, slot);

            // on a unique index an exact GE start is the row itself, nothing
            // can be inserted in front of it into the range
            let unique_exact_start = exact
                && btree.schema().is_unique()
                && self.start.as_ref().map(|b| b.op) == Some(ScanOperator::GE);

            if !unique_exact_start
                && !policy.lock_row_for_scan(
                    btree,
                    &mut self.pos,
                    &mut self.template,
                    true,
                    self.for_update,
                    LockOperation::Read,
                )?
            {
                debug!("latch released while locking the previous key, position again");
                continue;
            }

            self.state = ScanState::InProgress;
            return Ok(());
        }
    }

    fn past_stop(&self, row: &IndexRow) -> bool {
        match &self.stop {
            None => false,
            Some(bound) => {
                let order = self.open.btree().schema().compare(
                    row,
                    &bound.key,
                    bound.partial_key_match().row_order(),
                );
                match bound.op {
                    ScanOperator::GE => order != Ordering::Less,
                    ScanOperator::GT => order == Ordering::Greater,
                }
            }
        }
    }

    fn project(&self, row: &IndexRow) -> IndexRow {
        match &self.columns {
            Some(bits) => row.project(
                bits.iter()
                    .enumerate()
                    .filter(|(_, set)| *set)
                    .map(|(i, _)| i),
            ),
            None => row.clone(),
        }
    }

    /// Return the next row of the range, or None once the range is
    /// exhausted.
    pub fn next_row(&mut self) -> SmallResult<Option<IndexRow>> {
        let btree = self.open.btree();
        let policy = self.open.policy();

        match self.state {
            ScanState::Done => return Ok(None),
            ScanState::Uninitialized => self.position_at_start()?,
            ScanState::InProgress => {
                if !self.pos.is_latched() {
                    self.pos.reposition(btree, true)?;
                }
            }
        }

        loop {
            let slot = self.pos.current_slot() + 1;
            self.pos.set_current_slot(slot);

            let (count, right) = {
                let page = self.current_leaf()?.page();
                (page.row_count(), page.get_right_pid())
            };

            if slot > count {
                match right {
                    None => {
                        self.close();
                        return Ok(None);
                    }
                    Some(pid) => {
                        // moving right, keep the current latch until the
                        // next one is granted
                        let next = btree.latch_leaf_wait(&pid)?;
                        self.pos.set(next, 0);
                        self.counters.pages_visited += 1;
                        continue;
                    }
                }
            }

            self.counters.rows_visited += 1;
            if !policy.lock_row_for_scan(
                btree,
                &mut self.pos,
                &mut self.template,
                false,
                self.for_update,
                LockOperation::Read,
            )? && !self.pos.reposition(btree, false)?
            {
                // the row went away while we waited for its lock
                policy.unlock_scan_row_after_read(&self.pos, self.for_update);
                self.pos.reposition(btree, true)?;
                continue;
            }

            let (row, deleted) = {
                let slot = self.pos.current_slot();
                let leaf = self.current_leaf()?;
                let page = leaf.page();
                (page.get_row(slot).cloned(), page.is_deleted(slot))
            };
            let row = row.ok_or_else(|| {
                SmallError::new(
                    ErrorKind::ScanNotPositioned,
                    &format!("scan lost its row at slot {}", self.pos.current_slot()),
                )
            })?;

            if deleted {
                self.counters.deleted_rows_visited += 1;
                policy.unlock_scan_row_after_read(&self.pos, self.for_update);
                continue;
            }

            if self.past_stop(&row) {
                policy.unlock_scan_row_after_read(&self.pos, self.for_update);
                self.close();
                return Ok(None);
            }

            self.counters.rows_qualified += 1;
            policy.unlock_scan_row_after_read(&self.pos, self.for_update);
            self.pos.save_and_release()?;
            return Ok(Some(self.project(&row)));
        }
    }

    /// Snapshot of the statistics gathered so far.
    pub fn scan_info(&self) -> ScanInfo {
        let btree = self.open.btree();
        ScanInfo::new(
            &self.counters,
            self.columns.as_ref(),
            btree.schema().row_width(),
            btree.height(),
        )
    }

    pub fn get_all_scan_info(&self) -> std::collections::BTreeMap<String, String> {
        self.scan_info().get_all_scan_info()
    }
}

impl<'a> Iterator for BTreeScan<'a> {
    type Item = SmallResult<IndexRow>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_row() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => None,
            Err(e) => {
                self.close();
                Some(Err(e))
            }
        }
    }
}
