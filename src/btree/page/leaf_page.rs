use std::fmt;

use bit_vec::BitVec;

use super::{BTreeBasePage, BTreePageID};
use crate::storage::IndexRow;

/// A leaf page. Slots are numbered from 1, slot 0 is the position "before
/// the first row" of the page.
pub struct BTreeLeafPage {
    page: BTreeBasePage,

    // all rows of the page in key order, including rows marked deleted
    rows: Vec<IndexRow>,

    // indicate rows' status: true means the row is marked deleted
    deleted: BitVec<u32>,

    right_sibling: Option<BTreePageID>,
    left_sibling: Option<BTreePageID>,

    capacity: usize,
}

impl std::ops::Deref for BTreeLeafPage {
    type Target = BTreeBasePage;
    fn deref(&self) -> &Self::Target {
        &self.page
    }
}

impl std::ops::DerefMut for BTreeLeafPage {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.page
    }
}

impl BTreeLeafPage {
    pub fn new(pid: &BTreePageID, capacity: usize) -> Self {
        Self {
            page: BTreeBasePage::new(pid),
            rows: Vec::new(),
            deleted: BitVec::new(),
            right_sibling: None,
            left_sibling: None,
            capacity,
        }
    }

    pub fn set_right_pid(&mut self, pid: Option<BTreePageID>) {
        self.right_sibling = pid;
    }

    pub fn get_right_pid(&self) -> Option<BTreePageID> {
        self.right_sibling
    }

    pub fn set_left_pid(&mut self, pid: Option<BTreePageID>) {
        self.left_sibling = pid;
    }

    pub fn get_left_pid(&self) -> Option<BTreePageID> {
        self.left_sibling
    }

    /// The leftmost leaf has no left sibling.
    pub fn is_leftmost(&self) -> bool {
        self.left_sibling.is_none()
    }

    /// Number of rows on the page, rows marked deleted included.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn non_deleted_count(&self) -> usize {
        self.rows.len() - self.deleted.iter().filter(|d| *d).count()
    }

    /// Number of rows not marked deleted in slots `1..=slot`.
    pub fn non_deleted_up_to(&self, slot: usize) -> usize {
        let end = slot.min(self.rows.len());
        self.deleted.iter().take(end).filter(|d| !*d).count()
    }

    pub fn is_full(&self) -> bool {
        self.rows.len() >= self.capacity
    }

    pub fn rows(&self) -> &[IndexRow] {
        &self.rows
    }

    pub fn get_row(&self, slot: usize) -> Option<&IndexRow> {
        if slot == 0 {
            return None;
        }
        self.rows.get(slot - 1)
    }

    /// Copy the row at `slot` into `template`, return false when the slot
    /// holds no row.
    pub fn fetch_into(&self, slot: usize, template: &mut IndexRow) -> bool {
        match self.get_row(slot) {
            Some(row) => {
                template.clone_from(row);
                true
            }
            None => false,
        }
    }

    pub fn is_deleted(&self, slot: usize) -> bool {
        if slot == 0 {
            return false;
        }
        self.deleted.get(slot - 1).unwrap_or(false)
    }

    pub fn set_deleted(&mut self, slot: usize, deleted: bool) {
        self.deleted.set(slot - 1, deleted);
    }

    /// Insert `row` at `slot`, shifting the rows at and after it one slot to
    /// the right.
    pub fn insert_row(&mut self, slot: usize, row: IndexRow) {
        let i = slot - 1;
        self.rows.insert(i, row);

        self.deleted.push(false);
        for j in (i + 1..self.deleted.len()).rev() {
            let prev = self.deleted.get(j - 1).unwrap_or(false);
            self.deleted.set(j, prev);
        }
        self.deleted.set(i, false);

        self.bump_version();
    }

    /// Overwrite the row at `slot` in place and clear its deleted mark.
    pub fn replace_row(&mut self, slot: usize, row: IndexRow) {
        self.rows[slot - 1] = row;
        self.deleted.set(slot - 1, false);
        self.bump_version();
    }

    /// Physically remove the row at `slot`.
    pub fn remove_row(&mut self, slot: usize) -> IndexRow {
        let i = slot - 1;
        let row = self.rows.remove(i);

        for j in i..self.deleted.len() - 1 {
            let next = self.deleted.get(j + 1).unwrap_or(false);
            self.deleted.set(j, next);
        }
        self.deleted.pop();

        self.bump_version();
        row
    }

    /// Move the upper half of the rows out of this page, with their deleted
    /// marks.
    pub fn split_off_upper_half(&mut self) -> Vec<(IndexRow, bool)> {
        let mid = self.rows.len() / 2;
        let moved_rows = self.rows.split_off(mid);
        let moved = moved_rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| (row, self.deleted.get(mid + i).unwrap_or(false)))
            .collect();
        self.deleted.truncate(mid);

        self.bump_version();
        moved
    }

    /// Append rows that are known to sort after every row on the page.
    pub fn append_rows(&mut self, rows: Vec<(IndexRow, bool)>) {
        for (row, deleted) in rows {
            self.rows.push(row);
            self.deleted.push(deleted);
        }
        self.bump_version();
    }
}

impl fmt::Debug for BTreeLeafPage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} (v{}, rows: {}, left: {:?}, right: {:?})",
            self.get_pid(),
            self.version(),
            self.rows.len(),
            self.left_sibling,
            self.right_sibling,
        )
    }
}
