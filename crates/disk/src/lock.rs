use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-key async mutexes, created on demand and dropped once nobody holds
/// or waits for them.
#[derive(Default)]
pub(crate) struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyLocks {
    pub(crate) async fn lock(self: &Arc<Self>, key: &str) -> KeyGuard {
        let mutex = self.locks.lock().entry(key.to_string()).or_default().clone();
        // Built before awaiting so the map entry is cleaned up even if this
        // future is dropped while waiting.
        let mut guard = KeyGuard { locks: self.clone(), key: key.to_string(), mutex: mutex.clone(), held: None };
        guard.held = Some(mutex.lock_owned().await);
        guard
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

/// Holds the lock for one key until dropped.
pub struct KeyGuard {
    locks: Arc<KeyLocks>,
    key: String,
    mutex: Arc<AsyncMutex<()>>,
    held: Option<OwnedMutexGuard<()>>,
}

impl KeyGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        self.held.take();
        let mut locks = self.locks.locks.lock();
        // The map's reference plus ours: nobody else is holding or waiting.
        if Arc::strong_count(&self.mutex) == 2 {
            locks.remove(&self.key);
        }
    }
}
