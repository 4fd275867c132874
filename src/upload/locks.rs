use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Keyed lock table: one async mutex per upload id, pruned once unused.
#[derive(Default)]
pub struct UploadLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl UploadLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `upload_id`.
    pub async fn acquire(&self, upload_id: &str) -> UploadLockGuard<'_> {
        let lock = Arc::clone(self.locks.entry(upload_id.to_string()).or_default().value());
        let guard = lock.lock_owned().await;
        UploadLockGuard {
            guard: Some(guard),
            table: self,
            upload_id: upload_id.to_string(),
        }
    }

    /// Number of ids with a live lock entry.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

pub struct UploadLockGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    table: &'a UploadLocks,
    upload_id: String,
}

impl Drop for UploadLockGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the table's own reference left means no holder and no waiter.
        self.table
            .locks
            .remove_if(&self.upload_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
