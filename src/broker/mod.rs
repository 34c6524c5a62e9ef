//! Message bus between the producer and the job runner
//!
//! This module handles:
//! - Decoding job requests arriving for one job category
//! - Running each request to completion
//! - Acknowledging every accepted request with its updated count

mod memory;
mod redis;

pub use self::memory::MemoryBus;
pub use self::redis::RedisBus;

use crate::pipeline::JobRunner;
use crate::queue::QueueError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Inbound job request
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobRequest {
    pub oid: String,

    #[serde(default)]
    pub keyword: Option<String>,
}

/// Outbound acknowledgment of a finished job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobAck {
    pub oid: String,
    pub updated_amount: u64,
}

/// Transport carrying requests in and acknowledgments out
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Waits a bounded time for the next raw request
    ///
    /// # Returns
    ///
    /// * `Ok(Some(payload))` - A request arrived
    /// * `Ok(None)` - Nothing arrived before the wait ran out
    /// * `Err(QueueError)` - The connection is gone
    async fn next_request(&self) -> Result<Option<String>, QueueError>;

    async fn publish_ack(&self, ack: &JobAck) -> Result<(), QueueError>;
}

/// Decodes a raw request payload
pub fn parse_request(payload: &str) -> Result<JobRequest, serde_json::Error> {
    serde_json::from_str(payload)
}

/// Serves requests until the bus connection closes
///
/// A request is consumed once accepted: the job always runs to an
/// acknowledgment, and malformed payloads are logged and dropped.
///
/// # Returns
///
/// The error that ended the loop
pub async fn consume(bus: &dyn MessageBus, runner: &JobRunner) -> Result<(), QueueError> {
    tracing::info!("Waiting for {} requests", runner.kind());

    loop {
        let Some(payload) = bus.next_request().await? else {
            tracing::trace!("No {} requests yet", runner.kind());
            continue;
        };

        let request = match parse_request(&payload) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("Dropping malformed request {:?}: {}", payload, e);
                continue;
            }
        };

        if let Some(keyword) = &request.keyword {
            tracing::info!("Request {} (keyword: {})", request.oid, keyword);
        }

        let updated_amount = runner.run(&request.oid).await;
        let ack = JobAck {
            oid: request.oid,
            updated_amount,
        };

        if let Err(e) = bus.publish_ack(&ack).await {
            tracing::error!("Failed to acknowledge job {}: {}", ack.oid, e);
        }
    }
}
