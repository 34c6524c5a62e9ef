//! Message bus on Redis lists
//!
//! Requests are popped from `{inbound_prefix}_{code}_q` and acknowledgments
//! pushed to `{ack_prefix}_{oid}`.

use super::{JobAck, MessageBus};
use crate::config::BrokerConfig;
use crate::pipeline::JobKind;
use crate::queue::QueueError;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;

pub struct RedisBus {
    conn: MultiplexedConnection,
    inbound_key: String,
    ack_prefix: String,
    ack_delay: Duration,
    pop_timeout: f64,
}

impl RedisBus {
    /// Connects to the bus for one job category
    pub async fn connect(config: &BrokerConfig, kind: JobKind) -> Result<Self, QueueError> {
        let client = redis::Client::open(config.url.as_str())?;
        let conn = client.get_multiplexed_async_connection().await?;

        Ok(Self {
            conn,
            inbound_key: kind.inbound_key(&config.inbound_prefix),
            ack_prefix: config.ack_prefix.clone(),
            ack_delay: Duration::from_millis(config.ack_delay_ms),
            pop_timeout: config.pop_timeout_secs,
        })
    }

    pub fn inbound_key(&self) -> &str {
        &self.inbound_key
    }

    fn ack_key(&self, oid: &str) -> String {
        format!("{}_{}", self.ack_prefix, oid)
    }
}

#[async_trait]
impl MessageBus for RedisBus {
    async fn next_request(&self) -> Result<Option<String>, QueueError> {
        let mut conn = self.conn.clone();
        let popped: Option<(String, String)> =
            conn.brpop(self.inbound_key.as_str(), self.pop_timeout).await?;
        Ok(popped.map(|(_, payload)| payload))
    }

    async fn publish_ack(&self, ack: &JobAck) -> Result<(), QueueError> {
        tokio::time::sleep(self.ack_delay).await;

        let payload = serde_json::to_string(ack)?;
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(self.ack_key(&ack.oid), payload).await?;

        tracing::info!("Acknowledged job {} ({} updated)", ack.oid, ack.updated_amount);
        Ok(())
    }
}
