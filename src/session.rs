//! Per-user serialisation.
//!
//! Messages from one user must be handled strictly in order ("here is my
//! résumé" has to finish before "here is the vacancy" reads it), while
//! different users proceed independently. [`UserLocks`] hands out one async
//! mutex per user id, created on first use.
//!
//! The registry holds only `Weak` references: the lock lives exactly as long
//! as someone holds or waits on it, and dead entries are pruned on every
//! acquisition, so idle users cost nothing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

/// Guard held for the whole handling of one user message.
pub type UserGuard = OwnedMutexGuard<()>;

#[derive(Debug, Default)]
pub struct UserLocks {
    locks: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access for `user_id`.
    ///
    /// Dropping the guard releases the user; waiters are served in FIFO order.
    pub async fn acquire(&self, user_id: &str) -> UserGuard {
        let lock = self.lock_for(user_id);
        lock.lock_owned().await
    }

    /// Take the lock only if the user is idle.
    pub fn try_acquire(&self, user_id: &str) -> Option<UserGuard> {
        self.lock_for(user_id).try_lock_owned().ok()
    }

    /// Number of users with a live lock (held or awaited).
    pub fn active_users(&self) -> usize {
        let map = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        map.values().filter(|w| w.strong_count() > 0).count()
    }

    fn lock_for(&self, user_id: &str) -> Arc<AsyncMutex<()>> {
        // The registry mutex is never held across an await.
        let mut map = self.locks.lock().unwrap_or_else(|p| p.into_inner());

        let before = map.len();
        map.retain(|_, weak| weak.strong_count() > 0);
        if map.len() < before {
            debug!("Pruned {} idle user locks", before - map.len());
        }

        if let Some(existing) = map.get(user_id).and_then(Weak::upgrade) {
            return existing;
        }
        let fresh = Arc::new(AsyncMutex::new(()));
        map.insert(user_id.to_string(), Arc::downgrade(&fresh));
        fresh
    }

    #[cfg(test)]
    fn registry_len(&self) -> usize {
        self.locks.lock().unwrap().len()
    }
}
