use std::cmp::Ordering;

use super::page::{BTreeInternalPage, BTreeLeafPage, BTreePageID};
use crate::storage::{IndexRow, IndexSchema};

/// Tie-break for rows whose leading columns equal a shorter search key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialKeyMatch {
    /// Position in front of the whole group of partial matches (inclusive
    /// lower bound).
    LeftOf,

    /// Position behind the whole group of partial matches (exclusive lower
    /// bound).
    RightOf,
}

impl PartialKeyMatch {
    /// Decode the numeric form, `1` is left of and `-1` is right of. Any
    /// other value is a caller bug and only checked in debug builds.
    pub fn from_raw(v: i32) -> Self {
        debug_assert!(v == 1 || v == -1, "invalid partial key match: {}", v);
        if v > 0 {
            PartialKeyMatch::LeftOf
        } else {
            PartialKeyMatch::RightOf
        }
    }

    pub fn as_raw(&self) -> i32 {
        match self {
            PartialKeyMatch::LeftOf => 1,
            PartialKeyMatch::RightOf => -1,
        }
    }

    /// How a partially matching row compares to the search key. Being left
    /// of the group means every row of the group is greater than the key.
    pub(crate) fn row_order(&self) -> Ordering {
        match self {
            PartialKeyMatch::LeftOf => Ordering::Greater,
            PartialKeyMatch::RightOf => Ordering::Less,
        }
    }
}

/// State of one descent from the root to a leaf.
///
/// Owned by the caller and passed by exclusive reference to
/// `BTree::search`. The record can be searched with repeatedly, every search
/// overwrites the outputs.
#[derive(Debug, Clone)]
pub struct SearchParams {
    search_key: IndexRow,
    partial_key_match: PartialKeyMatch,

    /// Scratch row, holds the row at `result_slot` after a search when there
    /// is one. Not meaningful otherwise.
    pub template: IndexRow,

    optimizer: bool,

    /// Fraction of the index known to lie left of the position.
    pub left_fraction: f64,

    /// Fraction of the index covered by the subtree the descent is in.
    pub current_fraction: f64,

    /// First slot whose row is not less than the key, or one past the last
    /// row of the leaf.
    pub result_slot: usize,

    /// The row at `result_slot` equals the key on every unique column.
    pub result_exact: bool,
}

impl SearchParams {
    pub fn new(
        search_key: IndexRow,
        partial_key_match: PartialKeyMatch,
        optimizer: bool,
    ) -> Self {
        Self {
            search_key,
            partial_key_match,
            template: IndexRow::default(),
            optimizer,
            left_fraction: 0.0,
            current_fraction: 1.0,
            result_slot: 0,
            result_exact: false,
        }
    }

    pub fn search_key(&self) -> &IndexRow {
        &self.search_key
    }

    pub fn partial_key_match(&self) -> PartialKeyMatch {
        self.partial_key_match
    }

    pub fn is_optimizer(&self) -> bool {
        self.optimizer
    }

    /// Forget the outputs of the previous descent.
    pub(crate) fn reset(&mut self) {
        self.left_fraction = 0.0;
        self.current_fraction = 1.0;
        self.result_slot = 0;
        self.result_exact = false;
    }

    fn compare(&self, schema: &IndexSchema, row: &IndexRow) -> Ordering {
        schema.compare(row, &self.search_key, self.partial_key_match.row_order())
    }

    /// Pick the child of an internal page to descend into.
    pub(crate) fn descend_internal(
        &mut self,
        page: &BTreeInternalPage,
        schema: &IndexSchema,
    ) -> BTreePageID {
        // keys[i] is the low key of child i + 1, follow the last child whose
        // low key is not greater than the search key
        let index = page
            .keys()
            .partition_point(|k| self.compare(schema, k) != Ordering::Greater);

        if self.optimizer {
            let children = page.children_count() as f64;
            self.left_fraction += self.current_fraction * (index as f64) / children;
            self.current_fraction *= 1.0 / children;
            self.check_fractions();
        }

        page.get_child(index)
    }

    /// Locate the search key on a leaf.
    pub(crate) fn search_leaf(&mut self, page: &BTreeLeafPage, schema: &IndexSchema) {
        let rows = page.rows();
        let index = rows.partition_point(|r| self.compare(schema, r) == Ordering::Less);

        self.result_slot = index + 1;
        self.result_exact =
            index < rows.len() && self.compare(schema, &rows[index]) == Ordering::Equal;
        page.fetch_into(self.result_slot, &mut self.template);

        if self.optimizer {
            self.leaf_fractions(page);
        }
    }

    fn leaf_fractions(&mut self, page: &BTreeLeafPage) {
        let total = page.non_deleted_count();
        if total == 0 {
            return;
        }

        // an exact match of an exclusive bound lies left of the position
        let start_slot =
            if self.result_exact && self.partial_key_match == PartialKeyMatch::RightOf {
                self.result_slot
            } else {
                self.result_slot - 1
            };
        let left = page.non_deleted_up_to(start_slot) as f64;
        let total = total as f64;

        self.left_fraction += self.current_fraction * left / total;
        self.current_fraction = (self.current_fraction / total)
            .min(self.current_fraction * (total - left) / total);
        self.check_fractions();
    }

    fn check_fractions(&self) {
        debug_assert!(
            self.left_fraction >= 0.0
                && self.current_fraction >= 0.0
                && self.left_fraction + self.current_fraction <= 1.0 + 1e-9,
            "fractions out of range, left: {}, current: {}",
            self.left_fraction,
            self.current_fraction,
        );
    }
}
