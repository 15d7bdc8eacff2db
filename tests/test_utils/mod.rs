#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use rand::prelude::*;
use small_lock_btree::{
    btree::{BTree, BTreeScan, LeafGuard},
    storage::{Cell, IndexRow, IndexSchema, RowLocation},
    transaction::IsolationLevel,
    utils, Config, Database,
};

pub const CONTAINER: u32 = 7;

/// # Conduct the initialization
///
/// - Setting up log configurations.
pub fn setup() {
    utils::init_log();
}

/// Small pages so that a few dozen rows already give a multi-level tree.
pub fn small_config(isolation: IsolationLevel) -> Config {
    Config {
        isolation,
        lock_timeout: Duration::from_secs(5),
        latch_timeout: Duration::from_secs(5),
        leaf_capacity: 4,
        internal_capacity: 4,
        max_relock_attempts: 10,
    }
}

pub fn new_db(isolation: IsolationLevel) -> Arc<Database> {
    Arc::new(Database::new(small_config(isolation)))
}

pub fn int_key(key: &[i64]) -> IndexRow {
    IndexRow::new(key.iter().map(|v| Cell::Int64(*v)).collect())
}

pub fn int_row(key: &[i64], location: u64) -> IndexRow {
    IndexRow::with_location(
        key.iter().map(|v| Cell::Int64(*v)).collect(),
        RowLocation(location),
    )
}

/// Create a row locking index and fill it with `rows` in a committed
/// transaction.
pub fn new_index(
    db: &Database,
    key_columns: usize,
    unique: bool,
    rows: &[IndexRow],
) -> Arc<BTree> {
    let btree = db.create_index(CONTAINER, IndexSchema::new(key_columns, unique), true);
    insert_committed(db, &btree, rows);
    btree
}

pub fn insert_committed(db: &Database, btree: &Arc<BTree>, rows: &[IndexRow]) {
    let tx = db.begin();
    let open = db.open(btree, &tx);
    for row in rows {
        open.insert(row).unwrap();
    }
    db.commit(&tx);
}

/// Rows `(k)` for k in `keys`, located at `k`.
pub fn single_column_rows(keys: impl IntoIterator<Item = i64>) -> Vec<IndexRow> {
    keys.into_iter().map(|k| int_row(&[k], k as u64)).collect()
}

pub fn shuffled(mut rows: Vec<IndexRow>) -> Vec<IndexRow> {
    let mut rng = rand::thread_rng();
    rows.shuffle(&mut rng);
    rows
}

pub fn collect(scan: BTreeScan) -> Vec<IndexRow> {
    scan.map(|r| r.unwrap()).collect()
}

/// The row a search result points to, following the right sibling when
/// the slot is one past the end of the leaf.
pub fn row_at_or_after(btree: &BTree, leaf: LeafGuard, slot: usize) -> Option<IndexRow> {
    let (row, right) = {
        let page = leaf.page();
        (page.get_row(slot).cloned(), page.get_right_pid())
    };
    if row.is_some() {
        return row;
    }

    let mut pid = right?;
    loop {
        let next = btree.latch_leaf_wait(&pid).unwrap();
        let page = next.page();
        if let Some(row) = page.get_row(1) {
            return Some(row.clone());
        }
        pid = page.get_right_pid()?;
    }
}
