mod lock_manager;
mod tx;
mod wait_for_graph;

pub use lock_manager::{
    LockDuration, LockKey, LockManager, LockMode, WaitPolicy,
};
pub use tx::{IsolationLevel, Transaction, TransactionID};
