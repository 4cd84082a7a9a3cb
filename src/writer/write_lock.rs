use std::time::{Duration, Instant};
use parking_lot::{Condvar, Mutex};
use tracing::warn;

/// Single write gate for one index.
///
/// Tracks only locked/unlocked, not the holder: a write session may hand
/// the lock across threads and any of them may release it.
#[derive(Debug, Default)]
pub struct WriteLock {
    locked: Mutex<bool>,
    released: Condvar,
}

impl WriteLock {
    pub fn new() -> Self {
        WriteLock::default()
    }

    /// Block until the lock is ours
    pub fn acquire(&self) -> bool {
        let mut locked = self.locked.lock();
        while *locked {
            self.released.wait(&mut locked);
        }
        *locked = true;
        true
    }

    /// Wait at most `timeout`; false if the lock stayed taken.
    /// A timeout too large to represent waits like `acquire`.
    pub fn try_acquire(&self, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.acquire();
        };
        let mut locked = self.locked.lock();
        while *locked {
            if self.released.wait_until(&mut locked, deadline).timed_out() {
                if *locked {
                    return false;
                }
                break;
            }
        }
        *locked = true;
        true
    }

    pub fn release(&self) {
        let mut locked = self.locked.lock();
        if !*locked {
            warn!("write lock released while not held");
        }
        *locked = false;
        self.released.notify_one();
    }

    pub fn is_locked(&self) -> bool {
        *self.locked.lock()
    }
}
