mod test_utils;

use std::{sync::Arc, thread, time::Duration};

use small_lock_btree::{
    btree::{BTree, ScanBound},
    storage::{IndexRow, IndexSchema},
    transaction::IsolationLevel,
    Database, ErrorKind,
};
use test_utils::*;

fn keys(rows: &[IndexRow]) -> Vec<i64> {
    rows.iter().map(|r| r.get_cell(0).as_i64().unwrap()).collect()
}

/// Check the leaf chain: rows sorted across leaves, siblings consistent,
/// no leaf over capacity.
fn check_leaves(btree: &BTree, capacity: usize) {
    let pids = btree.leaf_pids().unwrap();
    let mut last: Option<IndexRow> = None;
    let mut left = None;
    for pid in pids {
        let leaf = btree.latch_leaf_wait(&pid).unwrap();
        let page = leaf.page();
        assert_eq!(page.get_left_pid(), left);
        assert!(page.row_count() <= capacity);
        for row in page.rows() {
            if let Some(prev) = &last {
                assert_eq!(
                    btree.schema().compare_rows(prev, row),
                    std::cmp::Ordering::Less,
                    "{} before {}",
                    prev,
                    row
                );
            }
            last = Some(row.clone());
        }
        left = Some(pid);
    }
}

#[test]
fn test_insert_and_duplicate() {
    setup();
    let db = new_db(IsolationLevel::Serializable);
    let btree = new_index(&db, 1, true, &shuffled(single_column_rows(0..50)));
    check_leaves(&btree, db.config().leaf_capacity);

    let tx = db.begin();
    let open = db.open(&btree, &tx);
    // same key, other location
    let err = open.insert(&int_row(&[7], 1007)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateKey);

    // a row that does not fit the index
    let err = open.insert(&int_key(&[7])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    db.abort(&tx);

    let tx = db.begin();
    let open = db.open(&btree, &tx);
    assert_eq!(keys(&collect(open.scan_all())), (0..50).collect::<Vec<_>>());
    db.commit(&tx);
}

#[test]
fn test_delete() {
    setup();
    let db = new_db(IsolationLevel::Serializable);
    let btree = new_index(&db, 1, false, &single_column_rows(0..20));

    let tx = db.begin();
    let open = db.open(&btree, &tx);
    assert!(open.delete(&int_row(&[3], 3)).unwrap());
    assert!(!open.delete(&int_row(&[3], 3)).unwrap());
    assert!(!open.delete(&int_row(&[100], 100)).unwrap());
    // right key, wrong location
    assert!(!open.delete(&int_row(&[4], 5)).unwrap());
    db.commit(&tx);

    let tx = db.begin();
    let open = db.open(&btree, &tx);
    let rows = collect(open.scan_all());
    assert_eq!(rows.len(), 19);
    assert!(!keys(&rows).contains(&3));
    db.commit(&tx);
}

#[test]
fn test_delete_unique_other_location() {
    setup();
    let db = new_db(IsolationLevel::Serializable);
    let btree = new_index(&db, 1, true, &single_column_rows(0..10));

    let writer = db.begin();
    assert!(db.open(&btree, &writer).delete(&int_row(&[4], 4)).unwrap());

    // the key matches but the row is another one, so nothing to wait for
    let tx = db.begin();
    let open = db.open(&btree, &tx);
    assert_eq!(open.tx().get_id(), tx.get_id());
    assert!(!open.delete(&int_row(&[4], 999)).unwrap());
    assert_eq!(db.lock_manager().lock_count(&tx), 0);
    db.commit(&tx);
    db.abort(&writer);
}

#[test]
fn test_reuse_deleted_unique_key() {
    setup();
    let db = new_db(IsolationLevel::Serializable);
    let btree = new_index(&db, 1, true, &single_column_rows(0..10));
    let leaves = btree.leaf_pids().unwrap().len();

    let tx = db.begin();
    let open = db.open(&btree, &tx);
    assert!(open.delete(&int_row(&[6], 6)).unwrap());
    open.insert(&int_row(&[6], 66)).unwrap();
    db.commit(&tx);

    // the deleted slot was reused, nothing had to move
    assert_eq!(btree.leaf_pids().unwrap().len(), leaves);
    let tx = db.begin();
    let open = db.open(&btree, &tx);
    let rows = collect(open.scan_all());
    assert_eq!(rows.len(), 10);
    assert_eq!(rows[6], int_row(&[6], 66));
    db.commit(&tx);
}

#[test]
fn test_purge_committed_deletes() {
    setup();
    let db = new_db(IsolationLevel::Serializable);
    let btree = new_index(&db, 1, false, &single_column_rows(0..20));

    let deleter = db.begin();
    let open = db.open(&btree, &deleter);
    for k in (0..20).step_by(3) {
        assert!(open.delete(&int_row(&[k], k as u64)).unwrap());
    }

    // the deletes are not committed yet, their rows stay
    let cleaner = db.begin();
    let cleaner_open = db.open(&btree, &cleaner);
    assert_eq!(cleaner_open.purge_all_committed_deletes().unwrap(), 0);

    db.commit(&deleter);
    assert_eq!(cleaner_open.purge_all_committed_deletes().unwrap(), 7);
    assert_eq!(cleaner_open.purge_all_committed_deletes().unwrap(), 0);
    assert_eq!(db.lock_manager().lock_count(&cleaner), 0);

    let mut scan = cleaner_open.scan_all();
    let mut count = 0;
    while scan.next_row().unwrap().is_some() {
        count += 1;
    }
    assert_eq!(count, 13);
    assert_eq!(scan.scan_info().deleted_rows_visited(), 0);
    db.commit(&cleaner);
}

fn concurrent_inserts(row_locking: bool) {
    setup();
    let db = new_db(IsolationLevel::Serializable);
    let btree = db.create_index(CONTAINER, IndexSchema::new(1, false), row_locking);
    let rows = shuffled(single_column_rows(0..400));

    let (sender, receiver) = crossbeam::channel::unbounded();
    for row in rows {
        sender.send(row).unwrap();
    }
    drop(sender);

    let mut threads = Vec::new();
    for _ in 0..4 {
        let local_db = Arc::clone(&db);
        let local_btree = Arc::clone(&btree);
        let local_receiver = receiver.clone();
        threads.push(thread::spawn(move || {
            for row in local_receiver.iter() {
                let tx = local_db.begin();
                local_db.open(&local_btree, &tx).insert(&row).unwrap();
                local_db.commit(&tx);
            }
        }));
    }
    for handle in threads {
        handle.join().unwrap();
    }

    check_leaves(&btree, db.config().leaf_capacity);
    let tx = db.begin();
    let open = db.open(&btree, &tx);
    assert_eq!(keys(&collect(open.scan_all())), (0..400).collect::<Vec<_>>());
    db.commit(&tx);
}

#[test]
fn test_concurrent_inserts_row_locking() {
    concurrent_inserts(true);
}

#[test]
fn test_concurrent_inserts_no_locking() {
    concurrent_inserts(false);
}

#[test]
fn test_no_locking_takes_no_locks() {
    setup();
    let db = new_db(IsolationLevel::Serializable);
    let btree = db.create_index(CONTAINER, IndexSchema::new(1, false), false);
    insert_committed(&db, &btree, &single_column_rows(0..20));

    let tx = db.begin();
    let open = db.open(&btree, &tx);
    open.insert(&int_row(&[100], 100)).unwrap();
    assert!(open.delete(&int_row(&[4], 4)).unwrap());
    assert_eq!(collect(open.scan_all()).len(), 20);
    assert_eq!(db.lock_manager().lock_count(&tx), 0);
    db.commit(&tx);
}

fn insert_in_thread(
    db: &Arc<Database>,
    btree: &Arc<BTree>,
    row: IndexRow,
) -> crossbeam::channel::Receiver<()> {
    let (sender, receiver) = crossbeam::channel::unbounded();
    let local_db = Arc::clone(db);
    let local_btree = Arc::clone(btree);
    thread::spawn(move || {
        let tx = local_db.begin();
        local_db.open(&local_btree, &tx).insert(&row).unwrap();
        local_db.commit(&tx);
        sender.send(()).unwrap();
    });
    receiver
}

#[test]
fn test_serializable_range_blocks_inserts() {
    setup();
    let db = new_db(IsolationLevel::Serializable);
    let btree = new_index(&db, 1, false, &single_column_rows((0..100).step_by(10)));

    let reader = db.begin();
    let open = db.open(&btree, &reader);
    let rows = collect(open.open_scan(
        Some(ScanBound::ge(int_key(&[20]))),
        Some(ScanBound::gt(int_key(&[50]))),
        false,
        None,
    ));
    assert_eq!(keys(&rows), vec![20, 30, 40, 50]);

    // outside the range: goes through
    let outside = insert_in_thread(&db, &btree, int_row(&[75], 75));
    outside.recv_timeout(Duration::from_secs(3)).unwrap();

    // inside the range: waits for the reader
    let inside = insert_in_thread(&db, &btree, int_row(&[35], 35));
    assert!(inside.recv_timeout(Duration::from_millis(300)).is_err());

    db.commit(&reader);
    inside.recv_timeout(Duration::from_secs(3)).unwrap();

    let tx = db.begin();
    let open = db.open(&btree, &tx);
    assert_eq!(
        keys(&collect(open.scan_all())),
        vec![0, 10, 20, 30, 35, 40, 50, 60, 70, 75, 80, 90]
    );
    db.commit(&tx);
}

#[test]
fn test_serializable_adjacent_inserts() {
    setup();
    let db = new_db(IsolationLevel::Serializable);
    let btree = new_index(&db, 1, false, &single_column_rows(vec![10, 20]));

    let first = db.begin();
    db.open(&btree, &first).insert(&int_row(&[15], 15)).unwrap();

    // 15 is the previous key of 16, its insert lock lets 16 through
    let next = insert_in_thread(&db, &btree, int_row(&[16], 16));
    next.recv_timeout(Duration::from_secs(3)).unwrap();
    db.commit(&first);

    let tx = db.begin();
    let open = db.open(&btree, &tx);
    assert_eq!(keys(&collect(open.scan_all())), vec![10, 15, 16, 20]);
    db.commit(&tx);
}
