//! Per-user async locks.
//!
//! Everything that moves a user's balances holds that user's lock for the
//! whole check-and-write, so two settlements for one user never interleave
//! while different users proceed in parallel. Entries are dropped once no
//! request holds or waits on them.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<String, Arc<Mutex<()>>>;

/// Registry of one async mutex per user.
#[derive(Clone, Default)]
pub struct UserLocks {
    locks: Arc<LockMap>,
}

/// Holds a user's lock. Dropping it releases the lock and forgets the entry
/// if nobody else is waiting for it.
pub struct UserLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    user_id: String,
    locks: Arc<LockMap>,
}

impl Drop for UserLockGuard {
    fn drop(&mut self) {
        self.guard.take();
        prune(&self.locks, &self.user_id);
    }
}

/// Remove the entry when the map holds the only reference. `entry` and
/// `remove_if` share the shard lock, so a concurrent acquire either sees the
/// old mutex before removal or inserts a fresh one after.
fn prune(locks: &LockMap, user_id: &str) {
    locks.remove_if(user_id, |_, lock| Arc::strong_count(lock) == 1);
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the user's lock, or `None` if it is not free within `timeout`.
    pub async fn acquire(&self, user_id: &str, timeout: Duration) -> Option<UserLockGuard> {
        let lock = self
            .locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        match tokio::time::timeout(timeout, lock.lock_owned()).await {
            Ok(guard) => Some(UserLockGuard {
                guard: Some(guard),
                user_id: user_id.to_string(),
                locks: self.locks.clone(),
            }),
            Err(_) => {
                prune(&self.locks, user_id);
                None
            }
        }
    }

    /// Number of users whose lock is held or awaited.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
