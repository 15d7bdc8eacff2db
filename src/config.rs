use std::time::Duration;

use crate::transaction::IsolationLevel;

/// Knobs of a database instance. Every index created by the database reads
/// its page capacities from here, every opened tree its locking behaviour.
#[derive(Debug, Clone)]
pub struct Config {
    /// Isolation level used by `Database::open` when the caller does not
    /// pick one.
    pub isolation: IsolationLevel,

    /// How long a WAIT lock request may block before it fails with
    /// `LockTimeout`.
    pub lock_timeout: Duration,

    /// How long a WAIT latch request may block before it fails with
    /// `LatchTimeout`.
    pub latch_timeout: Duration,

    /// Max rows per leaf page, a full leaf is split before inserting.
    pub leaf_capacity: usize,

    /// Max children per internal page.
    pub internal_capacity: usize,

    /// Max times a scan on a unique index re-locks a row whose location
    /// changed while it was waiting. With 0 the scan fails as soon as the
    /// row it waited for has moved.
    pub max_relock_attempts: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            isolation: IsolationLevel::default(),
            lock_timeout: Duration::from_secs(3),
            latch_timeout: Duration::from_secs(3),
            leaf_capacity: 64,
            internal_capacity: 64,
            max_relock_attempts: 10,
        }
    }
}
