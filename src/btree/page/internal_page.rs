use std::fmt;

use itertools::Itertools;

use super::{BTreeBasePage, BTreePageID};
use crate::storage::IndexRow;

/// An internal page. `keys[i]` is the low key of `children[i + 1]`, so a
/// page with n children has n - 1 keys.
pub struct BTreeInternalPage {
    page: BTreeBasePage,

    keys: Vec<IndexRow>,

    children: Vec<BTreePageID>,
}

impl std::ops::Deref for BTreeInternalPage {
    type Target = BTreeBasePage;
    fn deref(&self) -> &Self::Target {
        &self.page
    }
}

impl std::ops::DerefMut for BTreeInternalPage {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.page
    }
}

impl BTreeInternalPage {
    /// A new root above a page that just split into `left` and `right`.
    pub fn new_root(
        pid: &BTreePageID,
        left: BTreePageID,
        key: IndexRow,
        right: BTreePageID,
    ) -> Self {
        Self {
            page: BTreeBasePage::new(pid),
            keys: vec![key],
            children: vec![left, right],
        }
    }

    pub fn keys(&self) -> &[IndexRow] {
        &self.keys
    }

    pub fn children(&self) -> &[BTreePageID] {
        &self.children
    }

    pub fn children_count(&self) -> usize {
        self.children.len()
    }

    pub fn get_child(&self, i: usize) -> BTreePageID {
        self.children[i]
    }

    /// Insert `key` and `right` directly after the child `left`. Return false
    /// if `left` is not a child of this page.
    pub fn insert_after(
        &mut self,
        left: &BTreePageID,
        key: IndexRow,
        right: BTreePageID,
    ) -> bool {
        match self.children.iter().position(|c| c == left) {
            Some(i) => {
                self.keys.insert(i, key);
                self.children.insert(i + 1, right);
                self.bump_version();
                true
            }
            None => false,
        }
    }

    /// Move the upper half of the children into a new page with id `pid`,
    /// return the key to push up to the parent together with the new page.
    pub fn split(&mut self, pid: &BTreePageID) -> (IndexRow, BTreeInternalPage) {
        let mid = self.children.len() / 2;
        let children = self.children.split_off(mid);
        let keys = self.keys.split_off(mid);
        // the key in front of the moved children goes up
        let up = self.keys.pop().unwrap_or_default();
        self.bump_version();

        let right = Self {
            page: BTreeBasePage::new(pid),
            keys,
            children,
        };
        (up, right)
    }
}

impl fmt::Debug for BTreeInternalPage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} (children: [{}], keys: [{}])",
            self.get_pid(),
            self.children.iter().join(", "),
            self.keys.iter().join(", "),
        )
    }
}
