mod test_utils;

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use small_lock_btree::{
    storage::RowLocation,
    transaction::{LockDuration, LockKey, LockManager, LockMode, Transaction, WaitPolicy},
    ErrorKind,
};
use test_utils::*;

fn row_key(location: u64) -> LockKey {
    LockKey::Row {
        container: CONTAINER,
        location: RowLocation(location),
    }
}

#[test]
fn test_compatibility() {
    use LockMode::*;

    assert!(Shared.compatible_with(Shared));
    assert!(Shared.compatible_with(RangeShared));
    assert!(RangeShared.compatible_with(Shared));
    assert!(Shared.compatible_with(Update));
    assert!(Update.compatible_with(RangeShared));
    assert!(InsertIntent.compatible_with(InsertIntent));

    // inserts into neighboring gaps do not block each other
    assert!(InsertIntent.compatible_with(Insert));
    assert!(Insert.compatible_with(InsertIntent));
    assert!(InsertIntent.compatible_with(Shared));
    assert!(Shared.compatible_with(InsertIntent));

    assert!(!Shared.compatible_with(Exclusive));
    assert!(!Update.compatible_with(Update));
    assert!(!Exclusive.compatible_with(Shared));
    assert!(!Exclusive.compatible_with(InsertIntent));
    assert!(!InsertIntent.compatible_with(Exclusive));
    assert!(!InsertIntent.compatible_with(RangeShared));
    assert!(!InsertIntent.compatible_with(Update));
    assert!(!Insert.compatible_with(Insert));
    assert!(!Shared.compatible_with(Insert));
    assert!(!RangeShared.compatible_with(Insert));
}

#[test]
fn test_nowait_conflict() {
    setup();
    let locks = LockManager::new(Duration::from_secs(1));
    let tx1 = Transaction::new();
    let tx2 = Transaction::new();
    let key = row_key(1);

    assert!(locks
        .request_lock(&tx1, &key, LockMode::Exclusive, WaitPolicy::NoWait, LockDuration::Commit)
        .unwrap());
    // a transaction never conflicts with itself
    assert!(locks
        .request_lock(&tx1, &key, LockMode::Shared, WaitPolicy::NoWait, LockDuration::Commit)
        .unwrap());
    assert!(!locks
        .request_lock(&tx2, &key, LockMode::Shared, WaitPolicy::NoWait, LockDuration::Commit)
        .unwrap());
    assert!(!locks.holds(&tx2, &key));

    assert_eq!(locks.release_all(&tx1), 1);
    assert!(locks
        .request_lock(&tx2, &key, LockMode::Shared, WaitPolicy::NoWait, LockDuration::Commit)
        .unwrap());
}

#[test]
fn test_instant_and_manual_duration() {
    setup();
    let locks = LockManager::new(Duration::from_secs(1));
    let tx = Transaction::new();

    assert!(locks
        .request_lock(&tx, &row_key(1), LockMode::Shared, WaitPolicy::NoWait, LockDuration::Instant)
        .unwrap());
    assert!(!locks.holds(&tx, &row_key(1)));

    locks
        .request_lock(&tx, &row_key(2), LockMode::Shared, WaitPolicy::Wait, LockDuration::Manual)
        .unwrap();
    locks
        .request_lock(&tx, &row_key(2), LockMode::Shared, WaitPolicy::Wait, LockDuration::Manual)
        .unwrap();
    assert!(locks.holds_mode(&tx, &row_key(2), LockMode::Shared));

    // granted twice, released twice
    assert!(locks.release(&tx, &row_key(2), LockMode::Shared));
    assert!(locks.holds(&tx, &row_key(2)));
    assert!(locks.release(&tx, &row_key(2), LockMode::Shared));
    assert!(!locks.holds(&tx, &row_key(2)));
    assert!(!locks.release(&tx, &row_key(2), LockMode::Shared));
    assert_eq!(locks.lock_count(&tx), 0);
}

#[test]
fn test_wait_until_released() {
    setup();
    let locks = Arc::new(LockManager::new(Duration::from_secs(5)));
    let holder = Transaction::new();
    let waiter = Transaction::new();
    let key = row_key(3);

    locks
        .request_lock(&holder, &key, LockMode::Exclusive, WaitPolicy::Wait, LockDuration::Commit)
        .unwrap();

    let (sender, receiver) = crossbeam::channel::unbounded();
    let local_locks = Arc::clone(&locks);
    let local_waiter = waiter.clone();
    let handle = thread::spawn(move || {
        let start = Instant::now();
        let granted = local_locks
            .request_lock(&local_waiter, &key, LockMode::Shared, WaitPolicy::Wait, LockDuration::Commit)
            .unwrap();
        sender.send((granted, start.elapsed())).unwrap();
    });

    assert!(receiver.recv_timeout(Duration::from_millis(200)).is_err());
    locks.release_all(&holder);

    let (granted, elapsed) = receiver.recv_timeout(Duration::from_secs(2)).unwrap();
    assert!(granted);
    assert!(elapsed >= Duration::from_millis(150));
    assert!(locks.holds(&waiter, &key));
    handle.join().unwrap();
}

#[test]
fn test_timeout() {
    setup();
    let locks = LockManager::new(Duration::from_millis(100));
    let holder = Transaction::new();
    let waiter = Transaction::new();
    let key = row_key(4);

    locks
        .request_lock(&holder, &key, LockMode::Shared, WaitPolicy::Wait, LockDuration::Commit)
        .unwrap();
    let err = locks
        .request_lock(&waiter, &key, LockMode::Exclusive, WaitPolicy::Wait, LockDuration::Commit)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LockTimeout);
}

#[test]
fn test_deadlock_detected() {
    setup();
    let locks = Arc::new(LockManager::new(Duration::from_secs(5)));
    let tx1 = Transaction::new();
    let tx2 = Transaction::new();

    locks
        .request_lock(&tx1, &row_key(10), LockMode::Exclusive, WaitPolicy::Wait, LockDuration::Commit)
        .unwrap();
    locks
        .request_lock(&tx2, &row_key(20), LockMode::Exclusive, WaitPolicy::Wait, LockDuration::Commit)
        .unwrap();

    let local_locks = Arc::clone(&locks);
    let local_tx1 = tx1.clone();
    let handle = thread::spawn(move || {
        let result = local_locks.request_lock(
            &local_tx1,
            &row_key(20),
            LockMode::Exclusive,
            WaitPolicy::Wait,
            LockDuration::Commit,
        );
        // whoever loses gives everything back so the other can go on
        if result.is_err() {
            local_locks.release_all(&local_tx1);
        }
        result
    });

    thread::sleep(Duration::from_millis(100));
    let result = locks.request_lock(
        &tx2,
        &row_key(10),
        LockMode::Exclusive,
        WaitPolicy::Wait,
        LockDuration::Commit,
    );
    if result.is_err() {
        locks.release_all(&tx2);
    }
    let other = handle.join().unwrap();

    // exactly one of the two is chosen as the victim
    let errors: Vec<_> = vec![&result, &other]
        .into_iter()
        .filter_map(|r| r.as_ref().err())
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind(), ErrorKind::Deadlock);
}
