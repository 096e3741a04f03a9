//! Per-key serialization of hypervisor operations.
//!
//! Two calls against the same internal hypervisor name (or the same request,
//! or the same display name while provisioning) never interleave; calls on different keys run concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Clone, Default)]
pub struct NameLocks {
    inner: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl NameLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`. Released when the guard drops.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            // Entries only the map references are idle.
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            map.entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        lock.lock_owned().await
    }

    /// Number of keys currently held or waited on.
    pub fn active(&self) -> usize {
        let map = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        map.values().filter(|lock| Arc::strong_count(lock) > 1).count()
    }
}

pub(crate) fn request_key(request_id: &str) -> String {
    format!("request:{}", request_id)
}

/// Held while a display name is checked and recorded.
pub(crate) fn display_name_key(name: &str) -> String {
    format!("vm-name:{}", name.trim())
}
