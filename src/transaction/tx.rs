use core::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

pub type TransactionID = u32;

static TRANSACTION_ID: AtomicU32 = AtomicU32::new(1);

/// Handle of one transaction. Locks are owned by the transaction id, a
/// `Transaction` can be cloned freely and used from the single thread that
/// runs the transaction.
#[derive(Eq, PartialEq, Clone)]
pub struct Transaction {
    // increase monotonically by 1
    id: TransactionID,
}

impl Transaction {
    pub fn new() -> Self {
        let id = TRANSACTION_ID.fetch_add(1, Ordering::Relaxed);
        Self { id }
    }

    pub fn get_id(&self) -> TransactionID {
        self.id
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl std::hash::Hash for Transaction {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "tx_{}", self.id)
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// Isolation level of a transaction, decides which row locks the locking
/// policy takes and how long it keeps them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl Default for IsolationLevel {
    fn default() -> Self {
        if cfg!(feature = "serializable") {
            IsolationLevel::Serializable
        } else if cfg!(feature = "repeatable_read") {
            IsolationLevel::RepeatableRead
        } else if cfg!(feature = "read_committed") {
            IsolationLevel::ReadCommitted
        } else if cfg!(feature = "read_uncommitted") {
            IsolationLevel::ReadUncommitted
        } else {
            IsolationLevel::Serializable
        }
    }
}
