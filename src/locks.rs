//! Named lock registry
//!
//! The directory has no optimistic-concurrency primitive, so mutations that
//! read-modify-write the same remote object are serialized here by name.
//! Entries are created on first use and kept for the life of the process.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Process-wide keyed mutual exclusion
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock name for a directory object, e.g. `applications/<id>`.
    pub fn object_key(entity: crate::models::Entity, id: &str) -> String {
        format!("{}/{}", entity.path(), id)
    }

    /// Run `f` while holding `key` exclusively.
    ///
    /// Callers sharing a key run one at a time; different keys never wait on
    /// each other. The lock is released however `f` ends, including when the
    /// returned future is dropped before completion.
    pub async fn with_lock<F, T>(&self, key: &str, f: F) -> T
    where
        F: Future<Output = T>,
    {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        let _guard = lock.lock_owned().await;
        tracing::trace!("Acquired lock {}", key);
        f.await
    }

    /// Number of distinct keys ever locked
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
