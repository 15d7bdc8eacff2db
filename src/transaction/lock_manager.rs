use core::fmt;
use std::{
    collections::{HashMap, HashSet},
    sync::{Condvar, Mutex},
    time::{Duration, Instant},
};

use log::{debug, warn};

use super::{wait_for_graph::WaitForGraph, Transaction, TransactionID};
use crate::{
    error::{ErrorKind, SmallError},
    storage::RowLocation,
    types::SmallResult,
    utils::HandyMutex,
};

/// What a lock protects. Row locks are taken on the base table row an index
/// row points to, so every index of a table shares them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKey {
    Row {
        container: u32,
        location: RowLocation,
    },

    /// The key "previous" to the first key of the table, locked instead of a
    /// real row when a range starts before every row.
    PreviousToFirst { container: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Read lock that does not protect the gap before the row.
    Shared,

    /// Serializable read lock. Also covers the gap before the row, so
    /// inserts into that gap wait for it.
    RangeShared,

    Update,
    Exclusive,

    /// Taken on a freshly inserted row. Lets other inserts use the row as
    /// their previous key.
    Insert,

    /// Taken on the key previous to an insert position. Waits for range
    /// readers and writers of that key, not for other inserts.
    InsertIntent,
}

impl LockMode {
    /// Whether a request in this mode can be granted while another
    /// transaction holds the lock in `held` mode.
    pub fn compatible_with(&self, held: LockMode) -> bool {
        use LockMode::*;
        match (self, held) {
            (Shared | RangeShared, Shared | RangeShared) => true,
            (Shared | RangeShared, Update) | (Update, Shared | RangeShared) => true,
            (InsertIntent, InsertIntent | Insert | Shared) => true,
            (Insert | Shared, InsertIntent) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockDuration {
    /// Wait until the lock could be granted, then forget it.
    Instant,
    /// Held until the transaction commits or aborts.
    Commit,
    /// Held until released explicitly, or at the latest at commit.
    Manual,
}

/// How to behave when a latch or a lock is not immediately available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    NoWait,
    Wait,
}

#[derive(Debug, Clone)]
struct Holding {
    tx: TransactionID,
    mode: LockMode,
    count: u32,
}

struct LockTable {
    granted: HashMap<LockKey, Vec<Holding>>,
    held_by_tx: HashMap<TransactionID, HashSet<LockKey>>,
    wait_for_graph: WaitForGraph,
}

impl LockTable {
    fn conflicting_holders(
        &self,
        tx: TransactionID,
        key: &LockKey,
        mode: LockMode,
    ) -> Vec<TransactionID> {
        match self.granted.get(key) {
            Some(holdings) => holdings
                .iter()
                .filter(|h| h.tx != tx && !mode.compatible_with(h.mode))
                .map(|h| h.tx)
                .collect(),
            None => Vec::new(),
        }
    }

    fn grant(
        &mut self,
        tx: TransactionID,
        key: &LockKey,
        mode: LockMode,
        duration: LockDuration,
    ) {
        if duration == LockDuration::Instant {
            return;
        }

        let holdings = self.granted.entry(*key).or_insert_with(Vec::new);
        match holdings.iter_mut().find(|h| h.tx == tx && h.mode == mode) {
            Some(h) => h.count += 1,
            None => holdings.push(Holding { tx, mode, count: 1 }),
        }

        self.held_by_tx
            .entry(tx)
            .or_insert_with(HashSet::new)
            .insert(*key);
    }

    fn release(&mut self, tx: TransactionID, key: &LockKey, mode: LockMode) -> bool {
        let holdings = match self.granted.get_mut(key) {
            Some(v) => v,
            None => return false,
        };

        let pos = match holdings.iter().position(|h| h.tx == tx && h.mode == mode) {
            Some(pos) => pos,
            None => return false,
        };

        holdings[pos].count -= 1;
        if holdings[pos].count == 0 {
            holdings.remove(pos);
        }

        let still_held = holdings.iter().any(|h| h.tx == tx);
        if holdings.is_empty() {
            self.granted.remove(key);
        }

        if !still_held {
            if let Some(keys) = self.held_by_tx.get_mut(&tx) {
                keys.remove(key);
                if keys.is_empty() {
                    self.held_by_tx.remove(&tx);
                }
            }
        }

        true
    }

    fn release_all(&mut self, tx: TransactionID) -> usize {
        let keys = match self.held_by_tx.remove(&tx) {
            Some(keys) => keys,
            None => return 0,
        };

        for key in keys.iter() {
            if let Some(holdings) = self.granted.get_mut(key) {
                holdings.retain(|h| h.tx != tx);
                if holdings.is_empty() {
                    self.granted.remove(key);
                }
            }
        }

        keys.len()
    }
}

/// Transactional lock manager. Grants logical locks on rows, makes WAIT
/// requests block until the lock is free, and breaks deadlocks and
/// overlong waits with an error.
pub struct LockManager {
    table: Mutex<LockTable>,
    released: Condvar,
    timeout: Duration,
}

impl LockManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            table: Mutex::new(LockTable {
                granted: HashMap::new(),
                held_by_tx: HashMap::new(),
                wait_for_graph: WaitForGraph::new(),
            }),
            released: Condvar::new(),
            timeout,
        }
    }

    /// Request a lock on `key`.
    ///
    /// Return `Ok(true)` once the lock is granted. A `NoWait` request that
    /// conflicts with another transaction returns `Ok(false)` immediately, a
    /// `Wait` request blocks until the lock is granted, the wait times out
    /// or a deadlock is detected.
    pub fn request_lock(
        &self,
        tx: &Transaction,
        key: &LockKey,
        mode: LockMode,
        wait: WaitPolicy,
        duration: LockDuration,
    ) -> SmallResult<bool> {
        let tid = tx.get_id();
        let mut table = self.table.ml();

        if table.conflicting_holders(tid, key, mode).is_empty() {
            table.grant(tid, key, mode, duration);
            return Ok(true);
        }

        if wait == WaitPolicy::NoWait {
            debug!("{} cannot lock {:?} in {:?} mode without waiting", tx, key, mode);
            return Ok(false);
        }

        debug!("{} waits for {:?} in {:?} mode", tx, key, mode);
        let deadline = Instant::now() + self.timeout;
        loop {
            let blockers = table.conflicting_holders(tid, key, mode);
            if blockers.is_empty() {
                table.wait_for_graph.remove_waiter(tid);
                table.grant(tid, key, mode, duration);
                return Ok(true);
            }

            // blockers may have changed since the last round
            table.wait_for_graph.remove_waiter(tid);
            for blocker in blockers {
                table.wait_for_graph.add_edge(tid, blocker);
            }

            if let Some(cycle) = table.wait_for_graph.find_cycle_from(tid) {
                table.wait_for_graph.remove_waiter(tid);
                let err = SmallError::new(
                    ErrorKind::Deadlock,
                    &format!(
                        "deadlock detected, tx: {}, key: {:?}, mode: {:?}, cycle: {:?}",
                        tx, key, mode, cycle
                    ),
                );
                err.show_backtrace();
                return Err(err);
            }

            let now = Instant::now();
            if now >= deadline {
                table.wait_for_graph.remove_waiter(tid);
                let err = SmallError::new(
                    ErrorKind::LockTimeout,
                    &format!(
                        "acquire lock timeout, tx: {}, key: {:?}, mode: {:?}",
                        tx, key, mode
                    ),
                );
                warn!("{}", err);
                return Err(err);
            }

            let (guard, _) = self
                .released
                .wait_timeout(table, deadline - now)
                .unwrap();
            table = guard;
        }
    }

    /// Release one grant of `key` in `mode`. Never blocks.
    pub fn release(&self, tx: &Transaction, key: &LockKey, mode: LockMode) -> bool {
        let released = self.table.ml().release(tx.get_id(), key, mode);
        if released {
            self.released.notify_all();
        }
        released
    }

    /// Release every lock held by the transaction, return how many keys were
    /// unlocked.
    pub fn release_all(&self, tx: &Transaction) -> usize {
        let count = {
            let mut table = self.table.ml();
            table.wait_for_graph.remove_waiter(tx.get_id());
            table.release_all(tx.get_id())
        };
        self.released.notify_all();
        count
    }

    pub fn holds(&self, tx: &Transaction, key: &LockKey) -> bool {
        match self.table.ml().granted.get(key) {
            Some(holdings) => holdings.iter().any(|h| h.tx == tx.get_id()),
            None => false,
        }
    }

    pub fn holds_mode(&self, tx: &Transaction, key: &LockKey, mode: LockMode) -> bool {
        match self.table.ml().granted.get(key) {
            Some(holdings) => holdings
                .iter()
                .any(|h| h.tx == tx.get_id() && h.mode == mode),
            None => false,
        }
    }

    /// Number of distinct keys the transaction holds a lock on.
    pub fn lock_count(&self, tx: &Transaction) -> usize {
        self.table
            .ml()
            .held_by_tx
            .get(&tx.get_id())
            .map_or(0, |keys| keys.len())
    }
}

impl fmt::Debug for LockManager {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let table = self.table.ml();
        let mut depiction = "\n".to_string();

        depiction.push_str("granted: {");
        for (k, v) in table.granted.iter() {
            depiction.push_str(&format!("\n\t{:?} -> [", k));
            for h in v {
                depiction.push_str(&format!("\n\t\ttx_{} {:?} x{}, ", h.tx, h.mode, h.count));
            }
            depiction.push_str("\n\t]");
        }
        depiction.push_str("\n}\n");

        write!(f, "{}", depiction)
    }
}
