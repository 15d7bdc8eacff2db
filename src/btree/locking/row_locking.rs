use std::sync::Arc;

use log::{debug, warn};

use super::{BTreeLockingPolicy, Latched, LeafPair, LockOperation};
use crate::{
    btree::{
        buffer_pool::LeafGuard,
        page::BTreePageID,
        position::RowPosition,
        wait_signal::{Interrupt, InterruptResult},
        BTree,
    },
    error::{ErrorKind, SmallError},
    storage::IndexRow,
    transaction::{
        IsolationLevel, LockDuration, LockKey, LockManager, LockMode, Transaction, WaitPolicy,
    },
    types::SmallResult,
};

/// Row locking of a transaction on one index.
///
/// What gets locked depends on the isolation level:
///
/// - serializable: previous key locks guard ranges, read locks are held to
///   commit.
/// - repeatable read: read locks are held to commit, no previous key locks.
/// - read committed: read locks are released once the row has been read.
/// - read uncommitted: no read locks at all.
///
/// Write locks are always taken and held to commit.
pub struct RowLocking {
    tx: Transaction,
    locks: Arc<LockManager>,
    container: u32,
    isolation: IsolationLevel,
    max_relock_attempts: usize,
}

// where the previous key of a leaf's first row lives
enum PreviousKey {
    Row(usize),
    FirstKey,
}

impl RowLocking {
    pub fn new(
        tx: &Transaction,
        locks: Arc<LockManager>,
        container: u32,
        isolation: IsolationLevel,
        max_relock_attempts: usize,
    ) -> Self {
        Self {
            tx: tx.clone(),
            locks,
            container,
            isolation,
            max_relock_attempts,
        }
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    fn lock_mode(&self, op: LockOperation, for_update: bool) -> LockMode {
        match op {
            LockOperation::Read if for_update => LockMode::Update,
            LockOperation::Read if self.takes_previous_key_locks() => LockMode::RangeShared,
            LockOperation::Read => LockMode::Shared,
            LockOperation::Insert => LockMode::Insert,
            LockOperation::Delete => LockMode::Exclusive,
            LockOperation::InsertPreviousKey => LockMode::InsertIntent,
        }
    }

    fn takes_previous_key_locks(&self) -> bool {
        self.isolation == IsolationLevel::Serializable
    }

    fn takes_lock(&self, op: LockOperation) -> bool {
        match op {
            LockOperation::Read => self.isolation != IsolationLevel::ReadUncommitted,
            LockOperation::InsertPreviousKey => self.takes_previous_key_locks(),
            LockOperation::Insert | LockOperation::Delete => true,
        }
    }

    fn read_duration(&self, op: LockOperation, for_update: bool) -> LockDuration {
        if op == LockOperation::Read
            && !for_update
            && self.isolation == IsolationLevel::ReadCommitted
        {
            LockDuration::Manual
        } else {
            LockDuration::Commit
        }
    }

    fn row_key(&self, row: &IndexRow) -> SmallResult<LockKey> {
        match row.location() {
            Some(location) => Ok(LockKey::Row {
                container: self.container,
                location,
            }),
            None => Err(SmallError::new(
                ErrorKind::Internal,
                &format!("row {} carries no row location", row),
            )),
        }
    }

    fn first_key(&self) -> LockKey {
        LockKey::PreviousToFirst {
            container: self.container,
        }
    }

    /// Request NOWAIT while `latches` are held. If that is refused, release
    /// them all and request WAIT.
    fn lock_or_release<L>(
        &self,
        key: &LockKey,
        mode: LockMode,
        duration: LockDuration,
        latches: L,
    ) -> SmallResult<Latched<L>> {
        if self
            .locks
            .request_lock(&self.tx, key, mode, WaitPolicy::NoWait, duration)?
        {
            return Ok(Latched::Held(latches));
        }

        debug!("{} releases its latches to wait for {:?}", self.tx, key);
        drop(latches);
        self.locks
            .request_lock(&self.tx, key, mode, WaitPolicy::Wait, duration)?;
        Ok(Latched::Released)
    }

    /// Copy the row at `slot` into `template` and return the key to lock
    /// it with.
    fn slot_key(
        &self,
        leaf: &LeafGuard,
        slot: usize,
        template: &mut IndexRow,
    ) -> SmallResult<LockKey> {
        if !leaf.page().fetch_into(slot, template) {
            return Err(SmallError::new(
                ErrorKind::Internal,
                &format!("no row at slot {} of {}", slot, leaf.pid()),
            ));
        }
        self.row_key(template)
    }

    /// Latch leaves to the left of `current` with NOWAIT until one with a
    /// row is found, or the leftmost leaf. At most the found leaf stays
    /// latched besides `current`.
    fn walk_left_nowait(
        &self,
        btree: &BTree,
        current: &LeafGuard,
    ) -> InterruptResult<(LeafGuard, PreviousKey)> {
        let left = current.page().get_left_pid().ok_or_else(|| {
            SmallError::new(
                ErrorKind::Internal,
                &format!("{} has no left sibling", current.pid()),
            )
        })?;
        let mut prev = btree.latch_leaf(&left, WaitPolicy::NoWait)?;

        loop {
            let (count, left) = {
                let page = prev.page();
                (page.row_count(), page.get_left_pid())
            };
            if count > 0 {
                return Ok((prev, PreviousKey::Row(count)));
            }
            match left {
                None => return Ok((prev, PreviousKey::FirstKey)),
                Some(pid) => {
                    // ladder: latch the next one before letting go of prev
                    prev = btree.latch_leaf(&pid, WaitPolicy::NoWait)?;
                }
            }
        }
    }

    /// Find and lock the previous key again after every latch was given up,
    /// holding at most one latch at a time. The caller searches again
    /// afterwards whatever happens here.
    fn lock_previous_after_wait(
        &self,
        btree: &BTree,
        mut pid: BTreePageID,
        template: &mut IndexRow,
        mode: LockMode,
        duration: LockDuration,
    ) -> SmallResult<()> {
        loop {
            let leaf = btree.latch_leaf_wait(&pid)?;
            let (count, left) = {
                let page = leaf.page();
                (page.row_count(), page.get_left_pid())
            };

            if count > 0 {
                let key = self.slot_key(&leaf, count, template)?;
                self.lock_or_release(&key, mode, duration, leaf)?;
                return Ok(());
            }
            match left {
                None => {
                    let key = self.first_key();
                    self.lock_or_release(&key, mode, duration, leaf)?;
                    return Ok(());
                }
                Some(left) => pid = left,
            }
        }
    }

    fn search_left_and_lock_previous_key(
        &self,
        btree: &BTree,
        current: LeafGuard,
        template: &mut IndexRow,
        mode: LockMode,
        duration: LockDuration,
    ) -> SmallResult<Latched<LeafGuard>> {
        let left = current.page().get_left_pid();

        match self.walk_left_nowait(btree, &current) {
            Ok((prev, PreviousKey::Row(slot))) => {
                // the last row of prev is the previous key
                let key = self.slot_key(&prev, slot, template)?;
                self.lock_or_release(&key, mode, duration, (current, prev))
                    .map(|l| l.map(|(current, _)| current))
            }
            Ok((prev, PreviousKey::FirstKey)) => {
                let key = self.first_key();
                self.lock_or_release(&key, mode, duration, (current, prev))
                    .map(|l| l.map(|(current, _)| current))
            }
            Err(Interrupt::Wait(_)) => {
                debug!(
                    "{} cannot walk left from {} without waiting, releasing latches",
                    self.tx,
                    current.pid()
                );
                drop(current);
                if let Some(pid) = left {
                    self.lock_previous_after_wait(btree, pid, template, mode, duration)?;
                }
                Ok(Latched::Released)
            }
            Err(Interrupt::Fail(e)) => Err(e),
        }
    }

    /// After waiting for the lock on the row of a unique index, the row with
    /// that key may have been replaced by one at another location. Chase the
    /// live row until the locked location is the visible one.
    fn relock_unique_row(
        &self,
        btree: &BTree,
        pos: &mut RowPosition,
        locked: &IndexRow,
        mode: LockMode,
        duration: LockDuration,
    ) -> SmallResult<()> {
        let key_columns = btree.schema().key_columns();
        let prefix = locked.prefix(key_columns);
        let mut locked_key = self.row_key(locked)?;
        let mut relocks = 0;

        loop {
            let live = match btree.find_live_row(&prefix)? {
                Some(row) => row,
                None => return Ok(()),
            };
            let live_key = self.row_key(&live)?;
            if live_key == locked_key {
                return Ok(());
            }
            if relocks == self.max_relock_attempts {
                break;
            }
            relocks += 1;

            debug!(
                "{} relocks {}: {:?} -> {:?}",
                self.tx, prefix, locked_key, live_key
            );
            self.locks.release(&self.tx, &locked_key, mode);
            self.locks
                .request_lock(&self.tx, &live_key, mode, WaitPolicy::Wait, duration)?;
            locked_key = live_key;
            pos.set_current_row_location(live.location());
            pos.retarget(live);
        }

        let err = SmallError::new(
            ErrorKind::RelockLimitExceeded,
            &format!(
                "{} gave up relocking {} after {} relocks",
                self.tx, prefix, self.max_relock_attempts
            ),
        );
        warn!("{}", err);
        Err(err)
    }
}

impl BTreeLockingPolicy for RowLocking {
    fn lock_row_for_scan(
        &self,
        btree: &BTree,
        pos: &mut RowPosition,
        template: &mut IndexRow,
        is_previous_key: bool,
        for_update: bool,
        op: LockOperation,
    ) -> SmallResult<bool> {
        if is_previous_key && !self.takes_previous_key_locks() {
            return Ok(true);
        }
        if !self.takes_lock(op) {
            return Ok(true);
        }

        let mode = self.lock_mode(op, for_update);
        let duration = self.read_duration(op, for_update);

        let leaf = pos.take_leaf().ok_or_else(|| {
            SmallError::new(
                ErrorKind::ScanNotPositioned,
                "scan row lock requested without a latched leaf",
            )
        })?;

        if pos.current_slot() == 0 {
            // the previous key of the first row on this leaf
            let latched =
                self.lock_previous_row(btree, leaf, 1, template, op, LockDuration::Commit)?;
            return Ok(match latched {
                Latched::Held(leaf) => {
                    pos.set(leaf, 0);
                    true
                }
                Latched::Released => false,
            });
        }

        let slot = pos.current_slot();
        if !leaf.page().fetch_into(slot, template) {
            return Err(SmallError::new(
                ErrorKind::ScanNotPositioned,
                &format!("no row at slot {} of {}", slot, leaf.pid()),
            ));
        }
        let key = self.row_key(template)?;
        pos.set_current_row_location(template.location());

        if self
            .locks
            .request_lock(&self.tx, &key, mode, WaitPolicy::NoWait, duration)?
        {
            pos.set(leaf, slot);
            return Ok(true);
        }

        // save where we are before letting go of the latch, the row may move
        // while we wait
        pos.set(leaf, slot);
        pos.save_and_release()?;
        debug!("{} released {:?} to wait for its row lock", self.tx, key);

        self.locks
            .request_lock(&self.tx, &key, mode, WaitPolicy::Wait, duration)?;

        if btree.schema().is_unique() {
            let locked = template.clone();
            self.relock_unique_row(btree, pos, &locked, mode, duration)?;
        }
        Ok(false)
    }

    fn unlock_scan_row_after_read(&self, pos: &RowPosition, for_update: bool) {
        if for_update || self.isolation != IsolationLevel::ReadCommitted {
            return;
        }
        if let Some(location) = pos.current_row_location() {
            let key = LockKey::Row {
                container: self.container,
                location,
            };
            self.locks.release(&self.tx, &key, LockMode::Shared);
        }
    }

    fn lock_scan_committed_deleted_row(
        &self,
        _btree: &BTree,
        leaf: &LeafGuard,
        template: &mut IndexRow,
        slot: usize,
    ) -> SmallResult<bool> {
        if !leaf.page().fetch_into(slot, template) {
            return Ok(false);
        }
        let key = self.row_key(template)?;
        self.locks.request_lock(
            &self.tx,
            &key,
            LockMode::Exclusive,
            WaitPolicy::NoWait,
            LockDuration::Instant,
        )
    }

    fn lock_previous_row(
        &self,
        btree: &BTree,
        leaf: LeafGuard,
        slot: usize,
        template: &mut IndexRow,
        op: LockOperation,
        duration: LockDuration,
    ) -> SmallResult<Latched<LeafGuard>> {
        debug_assert!(slot >= 1, "previous row of slot {}", slot);
        if !self.takes_previous_key_locks() {
            return Ok(Latched::Held(leaf));
        }
        let mode = self.lock_mode(op, false);

        if slot > 1 {
            let key = self.slot_key(&leaf, slot - 1, template)?;
            return self.lock_or_release(&key, mode, duration, leaf);
        }

        if leaf.page().is_leftmost() {
            let key = self.first_key();
            return self.lock_or_release(&key, mode, duration, leaf);
        }

        self.search_left_and_lock_previous_key(btree, leaf, template, mode, duration)
    }

    fn lock_row_in_memory(
        &self,
        _btree: &BTree,
        leaf: Option<LeafGuard>,
        aux_leaf: Option<LeafGuard>,
        row: &IndexRow,
        op: LockOperation,
    ) -> SmallResult<Latched<LeafPair>> {
        if !self.takes_lock(op) {
            return Ok(Latched::Held((leaf, aux_leaf)));
        }
        let key = self.row_key(row)?;
        let mode = self.lock_mode(op, false);
        self.lock_or_release(&key, mode, LockDuration::Commit, (leaf, aux_leaf))
    }

    fn lock_row_on_page(
        &self,
        _btree: &BTree,
        leaf: LeafGuard,
        slot: usize,
        template: &mut IndexRow,
        op: LockOperation,
    ) -> SmallResult<Latched<LeafGuard>> {
        if !self.takes_lock(op) {
            leaf.page().fetch_into(slot, template);
            return Ok(Latched::Held(leaf));
        }
        let mode = self.lock_mode(op, false);
        let key = self.slot_key(&leaf, slot, template)?;
        self.lock_or_release(&key, mode, LockDuration::Commit, leaf)
    }
}
