//! Named locks
//!
//! Serialises read-modify-write cycles against a shared parent object
//! (an IoT Hub's endpoint list, a Network Interface's security group).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Held while a parent is being mutated; releases on drop
pub struct NamedLockGuard {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for NamedLockGuard {
    fn drop(&mut self) {
        tracing::trace!("released lock {}", self.key);
    }
}

/// Registry of locks keyed by resource-type tag and name
#[derive(Default)]
pub struct NamedLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl NamedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and take the lock for `name` within `kind`
    pub async fn lock(&self, name: &str, kind: &str) -> NamedLockGuard {
        let key = format!("{}.{}", kind, name);
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        tracing::trace!("acquiring lock {}", key);
        let guard = mutex.lock_owned().await;
        tracing::trace!("acquired lock {}", key);

        NamedLockGuard { key, _guard: guard }
    }
}
