use std::{
    collections::HashMap,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use log::debug;

use super::{
    latch::Latch,
    page::{BTreeLeafPage, BTreePageID},
    wait_signal::{Interrupt, InterruptResult, WaitSignal},
};
use crate::{
    error::{ErrorKind, SmallError},
    transaction::WaitPolicy,
    types::SmallResult,
    utils::HandyRwLock,
};

/// A leaf page together with the latch that protects it.
pub struct LeafFrame {
    pid: BTreePageID,
    latch: Latch,
    page: RwLock<BTreeLeafPage>,
}

/// Proof that the current thread holds the latch of a leaf. The latch is
/// released when the guard is dropped.
pub struct LeafGuard {
    frame: Arc<LeafFrame>,
}

impl LeafGuard {
    pub fn pid(&self) -> BTreePageID {
        self.frame.pid
    }

    pub fn page(&self) -> RwLockReadGuard<BTreeLeafPage> {
        self.frame.page.rl()
    }

    pub fn page_mut(&self) -> RwLockWriteGuard<BTreeLeafPage> {
        self.frame.page.wl()
    }
}

impl Drop for LeafGuard {
    fn drop(&mut self) {
        self.frame.latch.release();
    }
}

impl std::fmt::Debug for LeafGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "latched {}", self.frame.pid)
    }
}

/// Leaf pages of one index, addressed by page id.
///
/// Pages are never freed while the index is alive, so a page id read from a
/// sibling pointer or a saved scan position can always be latched.
pub struct BufferPool {
    leaves: RwLock<HashMap<BTreePageID, Arc<LeafFrame>>>,
    latch_timeout: Duration,
}

impl BufferPool {
    pub fn new(latch_timeout: Duration) -> Self {
        Self {
            leaves: RwLock::new(HashMap::new()),
            latch_timeout,
        }
    }

    pub fn add_leaf(&self, page: BTreeLeafPage) {
        let pid = page.get_pid();
        let frame = LeafFrame {
            pid,
            latch: Latch::new(),
            page: RwLock::new(page),
        };
        self.leaves.wl().insert(pid, Arc::new(frame));
    }

    fn get_frame(&self, pid: &BTreePageID) -> SmallResult<Arc<LeafFrame>> {
        match self.leaves.rl().get(pid) {
            Some(frame) => Ok(Arc::clone(frame)),
            None => Err(SmallError::new(
                ErrorKind::PageNotFound,
                &format!("leaf page not found: {}", pid),
            )),
        }
    }

    /// Latch a leaf.
    ///
    /// A refused NOWAIT request yields `Interrupt::Wait`, a WAIT request that
    /// times out yields `LatchTimeout`.
    pub(crate) fn latch_leaf(
        &self,
        pid: &BTreePageID,
        wait: WaitPolicy,
    ) -> InterruptResult<LeafGuard> {
        let frame = self.get_frame(pid)?;
        let granted = match wait {
            WaitPolicy::NoWait => frame.latch.try_acquire(),
            WaitPolicy::Wait => frame.latch.acquire(self.latch_timeout),
        };

        if granted {
            return Ok(LeafGuard { frame });
        }

        match wait {
            WaitPolicy::NoWait => {
                debug!("latch on {} refused without waiting", pid);
                Err(Interrupt::Wait(WaitSignal))
            }
            WaitPolicy::Wait => Err(Interrupt::Fail(SmallError::new(
                ErrorKind::LatchTimeout,
                &format!("acquire latch timeout, page: {}", pid),
            ))),
        }
    }

    /// WAIT latch, for callers that hold no other latch.
    pub(crate) fn latch_leaf_wait(&self, pid: &BTreePageID) -> SmallResult<LeafGuard> {
        match self.latch_leaf(pid, WaitPolicy::Wait) {
            Ok(guard) => Ok(guard),
            Err(Interrupt::Fail(e)) => Err(e),
            Err(Interrupt::Wait(_)) => Err(SmallError::new(
                ErrorKind::Internal,
                &format!("WAIT latch request on {} reported would-block", pid),
            )),
        }
    }

    pub fn is_latched(&self, pid: &BTreePageID) -> bool {
        match self.leaves.rl().get(pid) {
            Some(frame) => frame.latch.is_held(),
            None => false,
        }
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.rl().len()
    }
}
