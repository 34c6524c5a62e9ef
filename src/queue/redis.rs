//! Redis-backed job lists
//!
//! The producer may keep its queued lists and completion signals in other
//! databases than the persisted lists, so three connections are held. They
//! point at the same database unless configured otherwise. When the queued
//! list is the persisted list, cleanup leaves it in place.

use super::{decode_records, CompletionState, JobQueue, QueueError, RawRecord};
use crate::config::QueueConfig;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;

/// Job lists stored as Redis lists of JSON objects
#[derive(Clone)]
pub struct RedisQueue {
    target: MultiplexedConnection,
    source: MultiplexedConnection,
    signal: MultiplexedConnection,
    shared_source: bool,
}

impl RedisQueue {
    /// Opens the connections described by the queue configuration
    ///
    /// # Returns
    ///
    /// * `Ok(RedisQueue)` - All connections established
    /// * `Err(QueueError)` - A URL is invalid or a server is unreachable
    pub async fn connect(config: &QueueConfig) -> Result<Self, QueueError> {
        let target = open(&config.url).await?;
        let source = match &config.source_url {
            Some(url) => open(url).await?,
            None => target.clone(),
        };
        let signal = match &config.signal_url {
            Some(url) => open(url).await?,
            None => target.clone(),
        };

        Ok(Self {
            target,
            source,
            signal,
            shared_source: source_is_target(config),
        })
    }
}

/// Whether queued records are read from the persisted list itself
fn source_is_target(config: &QueueConfig) -> bool {
    match &config.source_url {
        Some(url) => url.trim() == config.url.trim(),
        None => true,
    }
}

async fn open(url: &str) -> Result<MultiplexedConnection, QueueError> {
    let client = redis::Client::open(url)?;
    Ok(client.get_multiplexed_async_connection().await?)
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn pull(&self, job_id: &str) -> Result<Vec<RawRecord>, QueueError> {
        let mut conn = self.source.clone();
        let entries: Vec<String> = conn.lrange(job_id, 0, -1).await?;
        decode_records(job_id, entries, true)
    }

    async fn load(&self, job_id: &str) -> Result<Vec<RawRecord>, QueueError> {
        let mut conn = self.target.clone();
        let entries: Vec<String> = conn.lrange(job_id, 0, -1).await?;
        decode_records(job_id, entries, false)
    }

    async fn replace_all(&self, job_id: &str, records: &[RawRecord]) -> Result<(), QueueError> {
        let mut conn = self.target.clone();
        replace_pipeline(job_id, records, None)?
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn replace_all_with_expiry(
        &self,
        job_id: &str,
        records: &[RawRecord],
        ttl: Duration,
    ) -> Result<(), QueueError> {
        let mut conn = self.target.clone();
        replace_pipeline(job_id, records, Some(ttl))?
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn set_expiry(&self, job_id: &str, ttl: Duration) -> Result<(), QueueError> {
        let mut conn = self.target.clone();
        conn.expire::<_, ()>(job_id, ttl_seconds(ttl)).await?;
        Ok(())
    }

    async fn exists(&self, job_id: &str) -> Result<bool, QueueError> {
        let mut conn = self.source.clone();
        Ok(conn.exists(job_id).await?)
    }

    async fn delete(&self, job_id: &str) -> Result<(), QueueError> {
        if self.shared_source {
            tracing::debug!("List '{}' holds the results, keeping it", job_id);
        } else {
            let mut source = self.source.clone();
            let removed: i64 = source.del(job_id).await?;
            if removed == 0 {
                tracing::warn!("List '{}' did not exist", job_id);
            }
        }

        let mut signal = self.signal.clone();
        signal.del::<_, ()>(job_id).await?;
        Ok(())
    }

    async fn completion(&self, job_id: &str) -> Result<CompletionState, QueueError> {
        let mut conn = self.signal.clone();
        let value: Option<String> = conn.get(job_id).await?;
        Ok(CompletionState::from_signal(value.as_deref()))
    }
}

/// Builds the transaction that swaps a list's content, optionally with a TTL
fn replace_pipeline(
    job_id: &str,
    records: &[RawRecord],
    ttl: Option<Duration>,
) -> Result<redis::Pipeline, QueueError> {
    let encoded = records
        .iter()
        .map(serde_json::to_string)
        .collect::<Result<Vec<_>, _>>()?;

    let mut pipe = redis::pipe();
    pipe.atomic().del(job_id).ignore();
    if !encoded.is_empty() {
        pipe.rpush(job_id, encoded).ignore();
        if let Some(ttl) = ttl {
            pipe.expire(job_id, ttl_seconds(ttl)).ignore();
        }
    }
    Ok(pipe)
}

fn ttl_seconds(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)
}
