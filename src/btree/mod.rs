/*
B+ tree index whose readers and writers lock rows through a pluggable
locking policy while holding page latches. A latch is never held across a
blocking lock request: the walker gives its latches up, waits, and finds its
way back by key.
*/

pub mod buffer_pool;
pub mod controller;
pub mod cost;
pub mod latch;
pub mod locking;
pub mod page;
pub mod position;
pub mod scan;
pub mod scan_info;
pub mod search;
pub mod tree;
pub(crate) mod wait_signal;

pub use buffer_pool::LeafGuard;
pub use controller::OpenBTree;
pub use locking::{BTreeLockingPolicy, Latched, LockOperation, NoLocking, RowLocking};
pub use position::RowPosition;
pub use scan::{BTreeScan, ScanBound, ScanOperator};
pub use scan_info::ScanInfo;
pub use search::{PartialKeyMatch, SearchParams};
pub use tree::BTree;
