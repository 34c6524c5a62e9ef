//! Durable per-job record lists
//!
//! This module handles:
//! - The [`JobQueue`] boundary the drain loop and reconciler talk to
//! - The producer's tri-state completion signal
//! - Redis and in-memory implementations

mod memory;
mod redis;

pub use self::memory::MemoryQueue;
pub use self::redis::RedisQueue;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

/// A raw record as exchanged with the producer
pub type RawRecord = Map<String, Value>;

/// Errors raised by a queue backend
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Malformed record in '{key}': {reason}")]
    Decode { key: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection closed: {0}")]
    Disconnected(String),
}

/// Producer-side progress of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionState {
    NotSet,
    InProgress,
    Complete,
}

impl CompletionState {
    /// Signal value the producer writes once it has enqueued everything
    pub const COMPLETE_MARKER: &'static str = "3";

    /// Interprets a raw signal value
    pub fn from_signal(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None => CompletionState::NotSet,
            Some(Self::COMPLETE_MARKER) => CompletionState::Complete,
            Some(_) => CompletionState::InProgress,
        }
    }
}

/// Durable list of records scoped to a job id
///
/// `pull` reads what the producer has queued so far without consuming it;
/// `load` and `replace_all` operate on the persisted list results are written
/// back to. The two may be the same list.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Non-destructive read of every record currently queued for the job
    async fn pull(&self, job_id: &str) -> Result<Vec<RawRecord>, QueueError>;

    /// Reads the persisted record list for the job
    async fn load(&self, job_id: &str) -> Result<Vec<RawRecord>, QueueError>;

    /// Atomically replaces the persisted list
    async fn replace_all(&self, job_id: &str, records: &[RawRecord]) -> Result<(), QueueError>;

    async fn set_expiry(&self, job_id: &str, ttl: Duration) -> Result<(), QueueError>;

    /// Replaces the persisted list and sets its retention
    ///
    /// Backends that can do both in one atomic step override this.
    async fn replace_all_with_expiry(
        &self,
        job_id: &str,
        records: &[RawRecord],
        ttl: Duration,
    ) -> Result<(), QueueError> {
        self.replace_all(job_id, records).await?;
        self.set_expiry(job_id, ttl).await
    }

    /// Whether the producer's list for the job exists
    async fn exists(&self, job_id: &str) -> Result<bool, QueueError>;

    /// Removes the producer's list and completion signal for the job
    ///
    /// A producer list that is also the persisted list is left in place.
    async fn delete(&self, job_id: &str) -> Result<(), QueueError>;

    async fn completion(&self, job_id: &str) -> Result<CompletionState, QueueError>;
}

/// Decodes list entries into records
///
/// In lenient mode malformed entries are logged and skipped; otherwise the
/// first one aborts the read.
pub(crate) fn decode_records(
    key: &str,
    entries: Vec<String>,
    lenient: bool,
) -> Result<Vec<RawRecord>, QueueError> {
    let mut records = Vec::with_capacity(entries.len());

    for entry in entries {
        match serde_json::from_str::<Value>(&entry) {
            Ok(Value::Object(record)) => records.push(record),
            Ok(other) => {
                let reason = format!("expected an object, got {}", other);
                if !lenient {
                    return Err(QueueError::Decode {
                        key: key.to_string(),
                        reason,
                    });
                }
                tracing::warn!("Skipping entry in '{}': {}", key, reason);
            }
            Err(e) => {
                if !lenient {
                    return Err(QueueError::Decode {
                        key: key.to_string(),
                        reason: e.to_string(),
                    });
                }
                tracing::warn!("Skipping entry in '{}': {}", key, e);
            }
        }
    }

    Ok(records)
}
