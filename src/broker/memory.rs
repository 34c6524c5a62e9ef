//! In-process message bus

use super::{JobAck, MessageBus};
use crate::queue::QueueError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Bus fed from a fixed list of payloads
///
/// Once every payload has been handed out the bus reports a closed
/// connection, which ends a consume loop.
#[derive(Debug, Default)]
pub struct MemoryBus {
    requests: Mutex<VecDeque<String>>,
    acks: Mutex<Vec<JobAck>>,
}

impl MemoryBus {
    pub fn new<I, S>(payloads: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            requests: Mutex::new(payloads.into_iter().map(Into::into).collect()),
            acks: Mutex::new(Vec::new()),
        }
    }

    /// Acknowledgments published so far
    pub fn acks(&self) -> Vec<JobAck> {
        self.acks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn next_request(&self) -> Result<Option<String>, QueueError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .map(Some)
            .ok_or_else(|| QueueError::Disconnected("no more requests".to_string()))
    }

    async fn publish_ack(&self, ack: &JobAck) -> Result<(), QueueError> {
        self.acks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ack.clone());
        Ok(())
    }
}
