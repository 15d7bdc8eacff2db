use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicU32, Ordering},
        RwLock,
    },
};

use log::{debug, info};

use super::{
    buffer_pool::{BufferPool, LeafGuard},
    page::{BTreeInternalPage, BTreeLeafPage, BTreePageID, PageCategory},
    search::{PartialKeyMatch, SearchParams},
    wait_signal::InterruptResult,
};
use crate::{
    config::Config,
    error::{ErrorKind, SmallError},
    storage::{IndexRow, IndexSchema},
    transaction::WaitPolicy,
    types::SmallResult,
    utils::HandyRwLock,
};

/// Everything above the leaf level. Guarded by one latch for the whole tree:
/// descents read it, splits write it.
///
/// A thread holding a leaf latch never asks for this latch, a thread waiting
/// for it holds no leaf latch.
struct TreeStructure {
    root: BTreePageID,
    internals: HashMap<BTreePageID, BTreeInternalPage>,

    // child page -> parent page, the root has no entry
    parents: HashMap<BTreePageID, BTreePageID>,

    // levels including the leaf level
    height: usize,

    // splits move rows to the right, so the first leaf never changes
    leftmost_leaf: BTreePageID,

    dropped: bool,
}

/// B+ tree index
pub struct BTree {
    index_id: u32,

    // the base table, row locks are keyed on it
    container: u32,

    schema: IndexSchema,

    // whether opened trees lock rows, false for indexes that rely on some
    // other locking scheme
    row_locking: bool,

    structure: RwLock<TreeStructure>,

    pool: BufferPool,

    /// the page index of the last allocated page, start from 0 and increase
    /// monotonically by 1
    page_index: AtomicU32,

    leaf_capacity: usize,
    internal_capacity: usize,
}

impl fmt::Display for BTree {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<BTree, id: {}, container: {}, leaves: {}>",
            self.index_id,
            self.container,
            self.pool.leaf_count()
        )
    }
}

// init functions
impl BTree {
    pub fn new(
        index_id: u32,
        container: u32,
        schema: IndexSchema,
        row_locking: bool,
        config: &Config,
    ) -> Self {
        let root = BTreePageID::new(PageCategory::Leaf, index_id, 0);
        let pool = BufferPool::new(config.latch_timeout);
        pool.add_leaf(BTreeLeafPage::new(&root, config.leaf_capacity.max(2)));

        Self {
            index_id,
            container,
            schema,
            row_locking,
            structure: RwLock::new(TreeStructure {
                root,
                internals: HashMap::new(),
                parents: HashMap::new(),
                height: 1,
                leftmost_leaf: root,
                dropped: false,
            }),
            pool,
            page_index: AtomicU32::new(0),
            leaf_capacity: config.leaf_capacity.max(2),
            internal_capacity: config.internal_capacity.max(3),
        }
    }

    pub fn index_id(&self) -> u32 {
        self.index_id
    }

    pub fn container(&self) -> u32 {
        self.container
    }

    pub fn schema(&self) -> &IndexSchema {
        &self.schema
    }

    pub fn is_row_locking(&self) -> bool {
        self.row_locking
    }

    fn allocate_pid(&self, category: PageCategory) -> BTreePageID {
        let index = self.page_index.fetch_add(1, Ordering::Relaxed) + 1;
        BTreePageID::new(category, self.index_id, index)
    }
}

// read paths
impl BTree {
    /// Number of levels, leaf level included. Fails once the index is
    /// dropped.
    pub fn height(&self) -> SmallResult<usize> {
        let structure = self.structure.rl();
        if structure.dropped {
            return Err(Self::dropped_error(self.index_id));
        }
        Ok(structure.height)
    }

    pub(crate) fn mark_dropped(&self) {
        self.structure.wl().dropped = true;
    }

    fn dropped_error(index_id: u32) -> SmallError {
        SmallError::new(
            ErrorKind::IndexDropped,
            &format!("index {} has been dropped", index_id),
        )
    }

    /// Descend from the root to the leaf where the search key belongs and
    /// return that leaf latched. The caller must hold no latch.
    pub fn search(&self, sp: &mut SearchParams) -> SmallResult<LeafGuard> {
        sp.reset();

        let structure = self.structure.rl();
        if structure.dropped {
            return Err(Self::dropped_error(self.index_id));
        }

        let mut pid = structure.root;
        while pid.category == PageCategory::Internal {
            let page = structure.internals.get(&pid).ok_or_else(|| {
                SmallError::new(
                    ErrorKind::PageNotFound,
                    &format!("internal page not found: {}", pid),
                )
            })?;
            pid = sp.descend_internal(page, &self.schema);
        }

        let leaf = self.pool.latch_leaf_wait(&pid)?;
        drop(structure);

        sp.search_leaf(&leaf.page(), &self.schema);
        Ok(leaf)
    }

    /// Run a search only for its fractions, no latch stays held.
    pub fn optimizer_search(&self, sp: &mut SearchParams) -> SmallResult<()> {
        self.search(sp).map(|_| ())
    }

    /// Latch the first leaf of the index. The caller must hold no latch.
    pub fn latch_leftmost_leaf(&self) -> SmallResult<LeafGuard> {
        let structure = self.structure.rl();
        if structure.dropped {
            return Err(Self::dropped_error(self.index_id));
        }
        self.pool.latch_leaf_wait(&structure.leftmost_leaf)
    }

    pub fn leftmost_leaf_pid(&self) -> BTreePageID {
        self.structure.rl().leftmost_leaf
    }

    pub(crate) fn latch_leaf(
        &self,
        pid: &BTreePageID,
        wait: WaitPolicy,
    ) -> InterruptResult<LeafGuard> {
        self.pool.latch_leaf(pid, wait)
    }

    /// WAIT latch a leaf. Allowed with no latch held, or while moving right
    /// from the left sibling.
    pub fn latch_leaf_wait(&self, pid: &BTreePageID) -> SmallResult<LeafGuard> {
        self.pool.latch_leaf_wait(pid)
    }

    pub fn is_latched(&self, pid: &BTreePageID) -> bool {
        self.pool.is_latched(pid)
    }

    /// Ids of all leaves from left to right. Latches every leaf in turn, for
    /// tests and debugging.
    pub fn leaf_pids(&self) -> SmallResult<Vec<BTreePageID>> {
        let mut pids = Vec::new();
        let mut leaf = self.latch_leftmost_leaf()?;
        loop {
            pids.push(leaf.pid());
            let right = leaf.page().get_right_pid();
            match right {
                Some(pid) => leaf = self.pool.latch_leaf_wait(&pid)?,
                None => return Ok(pids),
            }
        }
    }

    /// Find the row not marked deleted whose leading columns equal `key`.
    pub(crate) fn find_live_row(&self, key: &IndexRow) -> SmallResult<Option<IndexRow>> {
        let mut sp = SearchParams::new(key.clone(), PartialKeyMatch::LeftOf, false);
        let mut leaf = self.search(&mut sp)?;
        let mut slot = sp.result_slot;

        loop {
            let right = {
                let page = leaf.page();
                if slot <= page.row_count() {
                    let row = match page.get_row(slot) {
                        Some(row) => row,
                        None => return Ok(None),
                    };
                    if row.len() < key.len() || row.cells()[..key.len()] != *key.cells() {
                        return Ok(None);
                    }
                    if !page.is_deleted(slot) {
                        return Ok(Some(row.clone()));
                    }
                    slot += 1;
                    continue;
                }
                page.get_right_pid()
            };

            match right {
                Some(pid) => {
                    leaf = self.pool.latch_leaf_wait(&pid)?;
                    slot = 1;
                }
                None => return Ok(None),
            }
        }
    }
}

// structure modifications
impl BTree {
    /// Split the leaf `pid` if it is (still) full. The caller must hold no
    /// latch.
    pub fn split_leaf(&self, pid: &BTreePageID) -> SmallResult<()> {
        let mut structure = self.structure.wl();
        if structure.dropped {
            return Err(Self::dropped_error(self.index_id));
        }

        // latch left to right: the page, then its right sibling
        let leaf = self.pool.latch_leaf_wait(pid)?;
        if !leaf.page().is_full() {
            debug!("{} already split by someone else", pid);
            return Ok(());
        }

        let old_right = leaf.page().get_right_pid();
        let right_neighbor = match old_right {
            Some(p) => Some(self.pool.latch_leaf_wait(&p)?),
            None => None,
        };

        let new_pid = self.allocate_pid(PageCategory::Leaf);
        let mut new_page = BTreeLeafPage::new(&new_pid, self.leaf_capacity);
        let moved = leaf.page_mut().split_off_upper_half();
        new_page.append_rows(moved);
        new_page.set_left_pid(Some(*pid));
        new_page.set_right_pid(old_right);

        let separator = match new_page.get_row(1) {
            Some(row) => row.clone(),
            None => {
                return Err(SmallError::new(
                    ErrorKind::Internal,
                    &format!("split of {} left the new page empty", pid),
                ))
            }
        };

        leaf.page_mut().set_right_pid(Some(new_pid));
        if let Some(neighbor) = &right_neighbor {
            neighbor.page_mut().set_left_pid(Some(new_pid));
        }
        self.pool.add_leaf(new_page);

        info!("split leaf {} -> {}, separator: {}", pid, new_pid, separator);
        drop(right_neighbor);
        drop(leaf);

        self.insert_into_parent(&mut structure, *pid, separator, new_pid)
    }

    fn insert_into_parent(
        &self,
        structure: &mut TreeStructure,
        left: BTreePageID,
        key: IndexRow,
        right: BTreePageID,
    ) -> SmallResult<()> {
        let parent_pid = match structure.parents.get(&left) {
            Some(pid) => *pid,
            None => {
                // the root split, grow the tree by one level
                let root_pid = self.allocate_pid(PageCategory::Internal);
                let root = BTreeInternalPage::new_root(&root_pid, left, key, right);
                structure.internals.insert(root_pid, root);
                structure.parents.insert(left, root_pid);
                structure.parents.insert(right, root_pid);
                structure.root = root_pid;
                structure.height += 1;
                debug!("new root {}, height: {}", root_pid, structure.height);
                return Ok(());
            }
        };

        let parent = structure.internals.get_mut(&parent_pid).ok_or_else(|| {
            SmallError::new(
                ErrorKind::PageNotFound,
                &format!("internal page not found: {}", parent_pid),
            )
        })?;
        if !parent.insert_after(&left, key, right) {
            return Err(SmallError::new(
                ErrorKind::Internal,
                &format!("{} is not a child of {}", left, parent_pid),
            ));
        }

        if parent.children_count() <= self.internal_capacity {
            structure.parents.insert(right, parent_pid);
            return Ok(());
        }

        let new_pid = self.allocate_pid(PageCategory::Internal);
        let (up, new_page) = parent.split(&new_pid);
        structure.parents.insert(right, parent_pid);
        for child in new_page.children() {
            structure.parents.insert(*child, new_pid);
        }
        structure.internals.insert(new_pid, new_page);
        debug!("split internal {} -> {}", parent_pid, new_pid);

        self.insert_into_parent(structure, parent_pid, up, new_pid)
    }
}
