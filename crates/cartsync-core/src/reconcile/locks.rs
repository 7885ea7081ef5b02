//! Per-key upload serialization
//!
//! Concurrent uploads to the same logical save from different devices would
//! otherwise race the admission controller's read-then-decide checks. A
//! narrow advisory lock scoped to (user, save key) closes the race without a
//! global lock; uploads to different saves proceed fully in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of async mutexes keyed by an arbitrary string.
#[derive(Clone, Default)]
pub struct KeyedLocks {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl KeyedLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `key`, creating it on first use.
    ///
    /// The guard is owned so it can be held across await points for the
    /// duration of the upload pipeline.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut registry = self.locks.lock().await;
            registry
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }
}
