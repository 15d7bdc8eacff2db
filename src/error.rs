use std::{error::Error, fmt};

use backtrace::Backtrace;
use log::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A WAIT lock request was not granted within the configured timeout.
    LockTimeout,
    /// Granting a WAIT lock request would close a cycle in the wait-for
    /// graph.
    Deadlock,
    /// A WAIT latch request was not granted within the configured timeout.
    LatchTimeout,
    DuplicateKey,
    /// A page id reachable from the tree has no frame in the buffer pool.
    PageNotFound,
    ScanNotPositioned,
    /// The unique index relock loop gave up chasing a row whose identity
    /// kept changing.
    RelockLimitExceeded,
    IndexDropped,
    Internal,
}

#[derive(Debug, Clone)]
pub struct SmallError {
    kind: ErrorKind,
    details: String,
}

impl SmallError {
    pub fn new(kind: ErrorKind, msg: &str) -> SmallError {
        SmallError {
            kind,
            details: msg.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn details(&self) -> &str {
        &self.details
    }

    pub fn show_backtrace(&self) {
        let bt = Backtrace::new();
        error!("msg: [{}], backtrace: {:?}", self.details, bt);
    }
}

impl fmt::Display for SmallError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.details)
    }
}

impl Error for SmallError {}
