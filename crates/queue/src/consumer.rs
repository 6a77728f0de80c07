//! Queue producer/consumer traits and message types.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// A raw message received from a queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Unique message identifier, stable across redeliveries.
    pub id: String,
    /// Raw message body (JSON string).
    pub body: String,
    /// Handle for ack/nack, fresh on every delivery.
    pub receipt_handle: String,
    /// When the message was enqueued.
    pub timestamp: DateTime<Utc>,
    /// Number of times this message has been delivered.
    pub attempt_count: u32,
}

/// Opaque handle for an enqueued job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(pub String);

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Health status of a queue.
#[derive(Debug, Clone, Serialize)]
pub struct QueueHealth {
    pub connected: bool,
    /// Ready plus in-flight plus delayed messages.
    pub approximate_message_count: Option<u64>,
    pub provider: String,
}

impl fmt::Display for QueueHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "QueueHealth {{ connected: {}, messages: {:?}, provider: {} }}",
            self.connected, self.approximate_message_count, self.provider
        )
    }
}

/// Producer side of a job queue.
///
/// Enqueued jobs must survive until a consumer acks them. Order between
/// independently enqueued jobs is not guaranteed.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Make `body` available to consumers immediately.
    async fn enqueue(&self, body: String) -> Result<JobHandle, QueueError>;

    /// Make `body` available to consumers once `delay` has elapsed.
    async fn enqueue_delayed(&self, body: String, delay: Duration)
        -> Result<JobHandle, QueueError>;

    /// Check queue connectivity and return health status.
    async fn health_check(&self) -> Result<QueueHealth, QueueError>;
}

/// Consumer side of a job queue.
#[async_trait]
pub trait QueueConsumer: Send + Sync {
    /// Poll up to `max_messages` from the queue.
    ///
    /// May wait for the provider's poll timeout. Returns an empty vec if no
    /// messages became available, and `QueueError::Closed` once the queue is
    /// closed and drained.
    async fn poll_batch(&self, max_messages: u32) -> Result<Vec<QueueMessage>, QueueError>;

    /// Acknowledge successful processing; removes the message from the queue.
    async fn ack(&self, receipt_handle: &str) -> Result<(), QueueError>;

    /// Return the message to the queue for redelivery.
    async fn nack(&self, receipt_handle: &str) -> Result<(), QueueError>;
}
