use crate::CoreResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

type LockMap = Arc<Mutex<HashMap<String, Slot>>>;

/// One key's mutex and the number of tokens holding or awaiting it.
#[derive(Default)]
struct Slot {
    mutex: Arc<tokio::sync::Mutex<()>>,
    users: usize,
}

/// Proof of a held lock; hand it back to [`ReconcileLock::release`].
#[derive(Debug)]
pub struct LockToken {
    key: String,
    value: String,
    local: Option<LocalGuard>,
}

impl LockToken {
    /// Token for a lock held outside this process (e.g. a Redis key).
    pub fn remote(key: String, value: String) -> Self {
        Self { key, value, local: None }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Claim on a [`LocalReconcileLock`] key. Dropping it unlocks the key and
/// forgets it once nobody else holds or awaits it, so a cancelled future
/// cleans up after itself.
struct LocalGuard {
    locks: LockMap,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl std::fmt::Debug for LocalGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalGuard").field("key", &self.key).finish()
    }
}

impl Drop for LocalGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = locks.get_mut(&self.key) {
            slot.users = slot.users.saturating_sub(1);
            if slot.users == 0 {
                locks.remove(&self.key);
            }
        }
    }
}

/// Serializes reconciliation of a single payment. Callers must release
/// every token they acquire, including on error paths.
#[async_trait]
pub trait ReconcileLock: Send + Sync {
    async fn acquire(&self, key: &str) -> CoreResult<LockToken>;

    async fn release(&self, token: LockToken) -> CoreResult<()>;
}

/// Per-key async mutexes for single-instance deployments and tests
#[derive(Default)]
pub struct LocalReconcileLock {
    locks: LockMap,
}

impl LocalReconcileLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently tracked (held or awaited).
    pub fn tracked_keys(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl ReconcileLock for LocalReconcileLock {
    async fn acquire(&self, key: &str) -> CoreResult<LockToken> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            let slot = locks.entry(key.to_string()).or_default();
            slot.users += 1;
            slot.mutex.clone()
        };
        // Claimed before the await: a drop mid-wait still gives the slot back.
        let mut waiting = LocalGuard {
            locks: self.locks.clone(),
            key: key.to_string(),
            guard: None,
        };
        waiting.guard = Some(mutex.lock_owned().await);
        Ok(LockToken {
            key: key.to_string(),
            value: String::new(),
            local: Some(waiting),
        })
    }

    async fn release(&self, token: LockToken) -> CoreResult<()> {
        drop(token.local);
        Ok(())
    }
}
