mod test_utils;

use small_lock_btree::{
    btree::{PartialKeyMatch, ScanBound, SearchParams},
    storage::{IndexRow, IndexSchema},
    transaction::IsolationLevel,
    Config, Database,
};
use test_utils::*;

fn duplicate_rows() -> Vec<IndexRow> {
    vec![
        int_row(&[4, 9], 1),
        int_row(&[5, 1], 2),
        int_row(&[5, 2], 3),
        int_row(&[6, 0], 4),
    ]
}

#[test]
fn test_partial_key_match() {
    setup();
    let db = new_db(IsolationLevel::Serializable);
    let btree = new_index(&db, 2, false, &duplicate_rows());

    let mut sp = SearchParams::new(int_key(&[5]), PartialKeyMatch::LeftOf, false);
    let leaf = btree.search(&mut sp).unwrap();
    assert!(!sp.result_exact);
    assert_eq!(
        row_at_or_after(&btree, leaf, sp.result_slot),
        Some(int_row(&[5, 1], 2))
    );

    let mut sp = SearchParams::new(int_key(&[5]), PartialKeyMatch::RightOf, false);
    let leaf = btree.search(&mut sp).unwrap();
    assert!(!sp.result_exact);
    assert_eq!(
        row_at_or_after(&btree, leaf, sp.result_slot),
        Some(int_row(&[6, 0], 4))
    );
}

#[test]
fn test_exact_match_ignores_partial_key_rule() {
    setup();
    let db = new_db(IsolationLevel::Serializable);

    // unique index, the key columns identify the row
    let unique = new_index(&db, 2, true, &duplicate_rows());
    for mode in [PartialKeyMatch::LeftOf, PartialKeyMatch::RightOf].iter() {
        let mut sp = SearchParams::new(int_key(&[5, 2]), *mode, false);
        let leaf = unique.search(&mut sp).unwrap();
        assert!(sp.result_exact);
        assert_eq!(leaf.page().get_row(sp.result_slot), Some(&int_row(&[5, 2], 3)));
    }

    // non-unique index, the location is part of the key
    let non_unique = new_index(&db, 2, false, &duplicate_rows());
    for mode in [PartialKeyMatch::LeftOf, PartialKeyMatch::RightOf].iter() {
        let mut sp = SearchParams::new(int_row(&[5, 2], 3), *mode, false);
        let leaf = non_unique.search(&mut sp).unwrap();
        assert!(sp.result_exact);
        assert_eq!(leaf.page().get_row(sp.result_slot), Some(&int_row(&[5, 2], 3)));

        let mut sp = SearchParams::new(int_key(&[5, 2]), *mode, false);
        drop(leaf);
        non_unique.search(&mut sp).unwrap();
        assert!(!sp.result_exact);
    }
}

#[test]
fn test_duplicate_groups_across_leaves() {
    setup();
    let db = new_db(IsolationLevel::Serializable);

    let mut rows = Vec::new();
    for k in 0..30 {
        for j in 0..3 {
            rows.push(int_row(&[k, j], (k * 3 + j) as u64));
        }
    }
    let btree = new_index(&db, 2, false, &shuffled(rows));
    assert!(btree.height().unwrap() >= 3);

    for k in 0..30 {
        let mut sp = SearchParams::new(int_key(&[k]), PartialKeyMatch::LeftOf, false);
        let leaf = btree.search(&mut sp).unwrap();
        assert_eq!(
            row_at_or_after(&btree, leaf, sp.result_slot),
            Some(int_row(&[k, 0], (k * 3) as u64)),
            "left of {}",
            k
        );

        let mut sp = SearchParams::new(int_key(&[k]), PartialKeyMatch::RightOf, false);
        let leaf = btree.search(&mut sp).unwrap();
        let expected = if k < 29 {
            Some(int_row(&[k + 1, 0], ((k + 1) * 3) as u64))
        } else {
            None
        };
        assert_eq!(
            row_at_or_after(&btree, leaf, sp.result_slot),
            expected,
            "right of {}",
            k
        );
    }
}

#[test]
fn test_descending_column() {
    setup();
    let db = new_db(IsolationLevel::Serializable);
    let btree = db.create_index(
        CONTAINER,
        IndexSchema::new(1, true).with_ascending(vec![false]),
        true,
    );
    insert_committed(&db, &btree, &single_column_rows(0..20));

    let tx = db.begin();
    let open = db.open(&btree, &tx);
    let keys: Vec<i64> = collect(open.scan_all())
        .iter()
        .map(|r| r.get_cell(0).as_i64().unwrap())
        .collect();
    assert_eq!(keys, (0..20).rev().collect::<Vec<i64>>());
    db.commit(&tx);
}

#[test]
fn test_partial_key_match_raw_values() {
    assert_eq!(PartialKeyMatch::from_raw(1), PartialKeyMatch::LeftOf);
    assert_eq!(PartialKeyMatch::from_raw(-1), PartialKeyMatch::RightOf);
    assert_eq!(PartialKeyMatch::LeftOf.as_raw(), 1);
    assert_eq!(PartialKeyMatch::RightOf.as_raw(), -1);
}

#[cfg(debug_assertions)]
#[test]
#[should_panic]
fn test_partial_key_match_invalid_raw_value() {
    PartialKeyMatch::from_raw(0);
}

#[test]
fn test_fractions_single_leaf() {
    setup();
    // a single leaf large enough for every row
    let config = Config {
        leaf_capacity: 64,
        ..small_config(IsolationLevel::Serializable)
    };
    let db = Database::new(config);
    let btree = db.create_index(CONTAINER, IndexSchema::new(1, true), true);
    insert_committed(&db, &btree, &single_column_rows(0..10));
    assert_eq!(btree.height().unwrap(), 1);

    let mut sp = SearchParams::new(int_key(&[5]), PartialKeyMatch::LeftOf, true);
    btree.optimizer_search(&mut sp).unwrap();
    assert!((sp.left_fraction - 0.5).abs() < 1e-9);

    // an exclusive bound counts the matching row as left of the position
    let mut sp = SearchParams::new(int_key(&[5]), PartialKeyMatch::RightOf, true);
    btree.optimizer_search(&mut sp).unwrap();
    assert!((sp.left_fraction - 0.6).abs() < 1e-9);

    let fraction = btree
        .estimate_range_fraction(
            Some(&ScanBound::ge(int_key(&[2]))),
            Some(&ScanBound::ge(int_key(&[5]))),
        )
        .unwrap();
    assert!((fraction - 0.3).abs() < 1e-9);

    assert!((btree.estimate_range_fraction(None, None).unwrap() - 1.0).abs() < 1e-9);

    // inverted ranges are empty, not negative
    let fraction = btree
        .estimate_range_fraction(
            Some(&ScanBound::ge(int_key(&[7]))),
            Some(&ScanBound::ge(int_key(&[3]))),
        )
        .unwrap();
    assert_eq!(fraction, 0.0);
}

#[test]
fn test_fractions_stay_in_range_and_grow_with_key() {
    setup();
    let db = new_db(IsolationLevel::Serializable);
    let btree = new_index(&db, 1, true, &shuffled(single_column_rows((0..400).map(|k| k * 2))));
    assert!(btree.height().unwrap() >= 3);

    let mut last_left = 0.0;
    for k in -1..=801 {
        let mut sp = SearchParams::new(int_key(&[k]), PartialKeyMatch::LeftOf, true);
        btree.optimizer_search(&mut sp).unwrap();

        assert!(sp.left_fraction >= 0.0);
        assert!(sp.current_fraction >= 0.0);
        assert!(sp.left_fraction + sp.current_fraction <= 1.0 + 1e-9);
        assert!(sp.left_fraction + 1e-12 >= last_left, "not monotonic at {}", k);
        last_left = sp.left_fraction;
    }
    assert!(last_left > 0.99);

    // searching again with the same record starts over
    let mut sp = SearchParams::new(int_key(&[400]), PartialKeyMatch::LeftOf, true);
    btree.optimizer_search(&mut sp).unwrap();
    let first = (sp.left_fraction, sp.current_fraction);
    btree.optimizer_search(&mut sp).unwrap();
    assert_eq!(first, (sp.left_fraction, sp.current_fraction));
}
