use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, RwLock,
    },
};

use log::info;

use crate::{
    btree::{BTree, BTreeLockingPolicy, NoLocking, OpenBTree, RowLocking},
    config::Config,
    error::{ErrorKind, SmallError},
    storage::IndexSchema,
    transaction::{IsolationLevel, LockManager, Transaction},
    types::SmallResult,
    utils::HandyRwLock,
};

/// Owns the indexes and the lock manager they share.
pub struct Database {
    config: Config,
    lock_manager: Arc<LockManager>,

    // index id -> index
    catalog: RwLock<HashMap<u32, Arc<BTree>>>,

    index_id: AtomicU32,
}

impl Database {
    pub fn new(config: Config) -> Self {
        let lock_manager = Arc::new(LockManager::new(config.lock_timeout));
        Self {
            config,
            lock_manager,
            catalog: RwLock::new(HashMap::new()),
            index_id: AtomicU32::new(1),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }

    /// Create an empty index on the rows of table `container`. Trees opened
    /// on an index created without `row_locking` take no row locks.
    pub fn create_index(
        &self,
        container: u32,
        schema: IndexSchema,
        row_locking: bool,
    ) -> Arc<BTree> {
        let index_id = self.index_id.fetch_add(1, Ordering::Relaxed);
        let btree = Arc::new(BTree::new(
            index_id,
            container,
            schema,
            row_locking,
            &self.config,
        ));
        self.catalog.wl().insert(index_id, Arc::clone(&btree));
        info!("create index {}", btree);
        btree
    }

    pub fn get_index(&self, index_id: u32) -> Option<Arc<BTree>> {
        self.catalog.rl().get(&index_id).cloned()
    }

    /// Drop an index. Handles that are still around keep the pages alive but
    /// every descent fails from now on.
    pub fn drop_index(&self, index_id: u32) -> SmallResult<()> {
        match self.catalog.wl().remove(&index_id) {
            Some(btree) => {
                btree.mark_dropped();
                info!("drop index {}", index_id);
                Ok(())
            }
            None => Err(SmallError::new(
                ErrorKind::IndexDropped,
                &format!("index {} does not exist", index_id),
            )),
        }
    }

    pub fn begin(&self) -> Transaction {
        Transaction::new()
    }

    /// Open `btree` for `tx` at the configured isolation level.
    pub fn open(&self, btree: &Arc<BTree>, tx: &Transaction) -> OpenBTree {
        self.open_with_isolation(btree, tx, self.config.isolation)
    }

    pub fn open_with_isolation(
        &self,
        btree: &Arc<BTree>,
        tx: &Transaction,
        isolation: IsolationLevel,
    ) -> OpenBTree {
        let policy: Box<dyn BTreeLockingPolicy> = if btree.is_row_locking() {
            Box::new(RowLocking::new(
                tx,
                Arc::clone(&self.lock_manager),
                btree.container(),
                isolation,
                self.config.max_relock_attempts,
            ))
        } else {
            Box::new(NoLocking)
        };
        OpenBTree::new(Arc::clone(btree), tx, policy)
    }

    pub fn commit(&self, tx: &Transaction) {
        let released = self.lock_manager.release_all(tx);
        info!("{} commit, released {} locks", tx, released);
    }

    pub fn abort(&self, tx: &Transaction) {
        let released = self.lock_manager.release_all(tx);
        info!("{} abort, released {} locks", tx, released);
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
