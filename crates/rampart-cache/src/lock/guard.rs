//! Scoped lock ownership.

use tracing::{debug, warn};

use super::{DistributedLock, LockToken};

/// A held lock that is released exactly once.
///
/// Call [`release`](LockGuard::release) on the normal path. A guard
/// dropped without release (loader panic, cancelled future) schedules the
/// release on the current tokio runtime; outside a runtime the lease
/// simply runs out.
#[must_use = "dropping the guard releases the lock in the background"]
pub struct LockGuard {
    lock: DistributedLock,
    key: String,
    token: LockToken,
    released: bool,
}

impl LockGuard {
    pub(crate) fn new(lock: DistributedLock, key: String, token: LockToken) -> Self {
        Self {
            lock,
            key,
            token,
            released: false,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &LockToken {
        &self.token
    }

    /// Releases the lock. Returns false if it had already expired or
    /// been taken over.
    pub async fn release(mut self) -> bool {
        self.released = true;
        self.lock.unlock(&self.key, self.token.as_str()).await
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let lock = self.lock.clone();
                let key = std::mem::take(&mut self.key);
                let token = self.token.clone();
                debug!(key = %key, "Releasing dropped lock guard");
                handle.spawn(async move {
                    lock.unlock(&key, token.as_str()).await;
                });
            },
            Err(_) => {
                warn!(key = %self.key, "Lock guard dropped outside a runtime, lease left to expire");
            },
        }
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("key", &self.key)
            .field("token", &self.token)
            .field("released", &self.released)
            .finish()
    }
}
