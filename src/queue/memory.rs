//! In-process job lists
//!
//! Backs local runs and tests. Queued and persisted lists are either one list
//! (like the web flow) or kept apart (like the google flow).

use super::{CompletionState, JobQueue, QueueError, RawRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct Lists {
    source: HashMap<String, Vec<RawRecord>>,
    target: HashMap<String, Vec<RawRecord>>,
    signals: HashMap<String, String>,
    expiry: HashMap<String, Duration>,
}

/// Job lists held in memory
#[derive(Debug, Default)]
pub struct MemoryQueue {
    lists: Mutex<Lists>,
    separate_source: bool,
    unavailable: AtomicBool,
    pulls: AtomicUsize,
}

impl MemoryQueue {
    /// Queued and persisted records share one list per job
    pub fn new() -> Self {
        Self::default()
    }

    /// Queued records live apart from the persisted list
    pub fn with_separate_source() -> Self {
        Self {
            separate_source: true,
            ..Self::default()
        }
    }

    fn lock(&self) -> MutexGuard<'_, Lists> {
        self.lists.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self) -> Result<(), QueueError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(QueueError::Decode {
                key: String::new(),
                reason: "queue unavailable".to_string(),
            });
        }
        Ok(())
    }

    /// Makes every operation fail until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Appends a record as the producer would
    pub fn enqueue(&self, job_id: &str, record: RawRecord) {
        let mut lists = self.lock();
        let list = if self.separate_source {
            &mut lists.source
        } else {
            &mut lists.target
        };
        list.entry(job_id.to_string()).or_default().push(record);
    }

    /// Seeds the persisted list directly
    pub fn store(&self, job_id: &str, records: Vec<RawRecord>) {
        self.lock().target.insert(job_id.to_string(), records);
    }

    /// Current persisted list
    pub fn stored(&self, job_id: &str) -> Vec<RawRecord> {
        self.lock().target.get(job_id).cloned().unwrap_or_default()
    }

    pub fn set_signal(&self, job_id: &str, value: &str) {
        self.lock()
            .signals
            .insert(job_id.to_string(), value.to_string());
    }

    pub fn expiry(&self, job_id: &str) -> Option<Duration> {
        self.lock().expiry.get(job_id).copied()
    }

    /// Number of `pull` calls served so far
    pub fn pull_count(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn pull(&self, job_id: &str) -> Result<Vec<RawRecord>, QueueError> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let lists = self.lock();
        let list = if self.separate_source {
            &lists.source
        } else {
            &lists.target
        };
        Ok(list.get(job_id).cloned().unwrap_or_default())
    }

    async fn load(&self, job_id: &str) -> Result<Vec<RawRecord>, QueueError> {
        self.check()?;
        Ok(self.stored(job_id))
    }

    async fn replace_all(&self, job_id: &str, records: &[RawRecord]) -> Result<(), QueueError> {
        self.check()?;
        let mut lists = self.lock();
        if records.is_empty() {
            lists.target.remove(job_id);
        } else {
            lists.target.insert(job_id.to_string(), records.to_vec());
        }
        Ok(())
    }

    async fn set_expiry(&self, job_id: &str, ttl: Duration) -> Result<(), QueueError> {
        self.check()?;
        self.lock().expiry.insert(job_id.to_string(), ttl);
        Ok(())
    }

    async fn exists(&self, job_id: &str) -> Result<bool, QueueError> {
        self.check()?;
        let lists = self.lock();
        let list = if self.separate_source {
            &lists.source
        } else {
            &lists.target
        };
        Ok(list.contains_key(job_id))
    }

    async fn delete(&self, job_id: &str) -> Result<(), QueueError> {
        self.check()?;
        let mut lists = self.lock();
        if self.separate_source {
            lists.source.remove(job_id);
        }
        lists.signals.remove(job_id);
        Ok(())
    }

    async fn completion(&self, job_id: &str) -> Result<CompletionState, QueueError> {
        self.check()?;
        Ok(CompletionState::from_signal(
            self.lock().signals.get(job_id).map(String::as_str),
        ))
    }
}
