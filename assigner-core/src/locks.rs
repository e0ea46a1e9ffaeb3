//! Per-record lock table.
//!
//! Serializes read-modify-write sequences against a single pull request
//! while leaving different pull requests free to proceed in parallel.
//! An entry lives only while some caller holds or waits on it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::model::PullRequestId;

type LockMap = HashMap<PullRequestId, Arc<Mutex<()>>>;

#[derive(Default)]
pub struct RecordLocks {
    // Held only for map bookkeeping, never across an await.
    locks: StdMutex<LockMap>,
}

impl RecordLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> StdMutexGuard<'_, LockMap> {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Get or create the lock for a specific pull request.
    fn get_or_create(&self, id: &PullRequestId) -> Arc<Mutex<()>> {
        self.table()
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Wait for exclusive access to `id`. Released when the guard drops.
    pub async fn acquire(&self, id: &PullRequestId) -> RecordGuard<'_> {
        let guard = self.get_or_create(id).lock_owned().await;
        RecordGuard {
            owner: self,
            id: id.clone(),
            guard: Some(guard),
        }
    }

    /// Number of ids currently held or awaited.
    pub fn tracked(&self) -> usize {
        self.table().len()
    }
}

/// Exclusive access to one pull request. Dropping it releases the lock and
/// forgets the id once nobody else is waiting on it.
pub struct RecordGuard<'a> {
    owner: &'a RecordLocks,
    id: PullRequestId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for RecordGuard<'_> {
    fn drop(&mut self) {
        // The owned guard keeps its own reference to the mutex
        drop(self.guard.take());

        let mut table = self.owner.table();
        if let Some(lock) = table.get(&self.id) {
            // Only the table's reference is left
            if Arc::strong_count(lock) == 1 {
                table.remove(&self.id);
            }
        }
    }
}
