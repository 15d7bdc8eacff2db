pub mod btree;
pub mod config;
pub mod database;
pub mod storage;
pub mod transaction;
pub mod types;
pub mod utils;

mod error;

pub use btree::{BTree, OpenBTree};
pub use config::Config;
pub use database::Database;
pub use error::{ErrorKind, SmallError};
