use std::{
    sync::{Condvar, Mutex},
    time::{Duration, Instant},
};

use crate::utils::HandyMutex;

/// Exclusive, non-reentrant page latch.
///
/// Release is not exposed outside the btree module, a latch is given back by
/// dropping the guard that holds it.
pub struct Latch {
    held: Mutex<bool>,
    released: Condvar,
}

impl Latch {
    pub fn new() -> Self {
        Self {
            held: Mutex::new(false),
            released: Condvar::new(),
        }
    }

    /// NOWAIT acquisition.
    pub fn try_acquire(&self) -> bool {
        let mut held = self.held.ml();
        if *held {
            return false;
        }
        *held = true;
        true
    }

    /// WAIT acquisition, return false if the latch is still taken after
    /// `timeout`.
    pub fn acquire(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut held = self.held.ml();
        while *held {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self.released.wait_timeout(held, deadline - now).unwrap();
            held = guard;
        }
        *held = true;
        true
    }

    pub(crate) fn release(&self) {
        *self.held.ml() = false;
        self.released.notify_one();
    }

    pub fn is_held(&self) -> bool {
        *self.held.ml()
    }
}

impl Default for Latch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread, time::Duration};

    use super::*;

    #[test]
    fn test_wait_for_release() {
        let latch = Arc::new(Latch::new());
        assert!(latch.try_acquire());
        assert!(!latch.try_acquire());
        assert!(!latch.acquire(Duration::from_millis(10)));

        let cloned = Arc::clone(&latch);
        let handle = thread::spawn(move || cloned.acquire(Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(50));
        latch.release();

        assert!(handle.join().unwrap());
        assert!(latch.is_held());
    }
}
