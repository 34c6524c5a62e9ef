//! Per-job dedup set and deferred-write buffer

use crate::item::WorkItem;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Identities already handled in this job plus results awaiting a final write
///
/// The set and the buffer are guarded independently so workers recording
/// results never contend with the drain loop filtering new pulls.
#[derive(Debug, Default)]
pub struct Tracker {
    seen: Mutex<HashSet<String>>,
    pending: Mutex<Vec<WorkItem>>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks an identity as seen
    ///
    /// # Returns
    ///
    /// `true` when the identity had already been seen in this job
    pub fn seen(&self, identity: &str) -> bool {
        !lock(&self.seen).insert(identity.to_string())
    }

    /// Buffers an enriched item and marks its identity as seen
    pub fn record(&self, item: WorkItem) {
        lock(&self.seen).insert(item.identity.clone());
        lock(&self.pending).push(item);
    }

    /// Takes every buffered item
    pub fn drain_pending(&self) -> Vec<WorkItem> {
        std::mem::take(&mut *lock(&self.pending))
    }

    /// Forgets everything
    pub fn reset(&self) {
        lock(&self.seen).clear();
        lock(&self.pending).clear();
    }

    pub fn seen_count(&self) -> usize {
        lock(&self.seen).len()
    }
}
