//! In-process job queue.
//!
//! Messages live in memory only; durability across restarts comes from the
//! submission store, which the `resume` command rescans.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, Notify};
use tracing::debug;
use uuid::Uuid;

use crate::consumer::{JobHandle, JobQueue, QueueConsumer, QueueHealth, QueueMessage};
use crate::error::QueueError;

const DEFAULT_POLL_WAIT: Duration = Duration::from_secs(1);

#[derive(Default)]
struct State {
    ready: VecDeque<QueueMessage>,
    in_flight: HashMap<String, QueueMessage>,
    /// Accepted by `enqueue_delayed` but not yet in `ready`.
    delayed: usize,
}

impl State {
    fn is_empty(&self) -> bool {
        self.ready.is_empty() && self.in_flight.is_empty() && self.delayed == 0
    }
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    notify: Notify,
    closed: AtomicBool,
}

impl Inner {
    async fn push(&self, msg: QueueMessage) {
        self.state.lock().await.ready.push_back(msg);
        self.notify.notify_one();
    }

    /// Move a delayed message into `ready`; both counts change under one lock.
    async fn release_delayed(&self, msg: QueueMessage) {
        {
            let mut state = self.state.lock().await;
            state.delayed = state.delayed.saturating_sub(1);
            state.ready.push_back(msg);
        }
        self.notify.notify_one();
    }
}

/// Tokio-backed queue implementing both [`JobQueue`] and [`QueueConsumer`].
///
/// Clones share the same underlying queue.
#[derive(Clone)]
pub struct MemoryQueue {
    inner: Arc<Inner>,
    poll_wait: Duration,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::with_poll_wait(DEFAULT_POLL_WAIT)
    }

    /// `poll_wait` bounds how long an empty `poll_batch` waits for new work.
    pub fn with_poll_wait(poll_wait: Duration) -> Self {
        Self {
            inner: Arc::new(Inner::default()),
            poll_wait,
        }
    }

    /// Stop handing out `Ok` once everything enqueued has been acked.
    ///
    /// Enqueueing stays possible so in-flight jobs can still schedule
    /// follow-up work; consumers see `QueueError::Closed` only when the
    /// queue is fully drained.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Messages not yet acked, including delayed ones.
    pub async fn outstanding(&self) -> usize {
        let state = self.inner.state.lock().await;
        state.ready.len() + state.in_flight.len() + state.delayed
    }

    fn new_message(body: String) -> QueueMessage {
        QueueMessage {
            id: Uuid::new_v4().to_string(),
            body,
            receipt_handle: String::new(),
            timestamp: Utc::now(),
            attempt_count: 0,
        }
    }

    async fn take(&self, max_messages: u32) -> Vec<QueueMessage> {
        let mut state = self.inner.state.lock().await;
        let n = state.ready.len().min(max_messages as usize);
        let mut batch = Vec::with_capacity(n);
        for mut msg in state.ready.drain(..n).collect::<Vec<_>>() {
            msg.attempt_count += 1;
            msg.receipt_handle = Uuid::new_v4().to_string();
            state.in_flight.insert(msg.receipt_handle.clone(), msg.clone());
            batch.push(msg);
        }
        batch
    }

    async fn drained(&self) -> bool {
        if !self.is_closed() {
            return false;
        }
        self.inner.state.lock().await.is_empty()
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, body: String) -> Result<JobHandle, QueueError> {
        let msg = Self::new_message(body);
        let handle = JobHandle(msg.id.clone());
        debug!(job = %handle, "enqueued");
        self.inner.push(msg).await;
        Ok(handle)
    }

    async fn enqueue_delayed(
        &self,
        body: String,
        delay: Duration,
    ) -> Result<JobHandle, QueueError> {
        if delay.is_zero() {
            return self.enqueue(body).await;
        }
        let msg = Self::new_message(body);
        let handle = JobHandle(msg.id.clone());
        debug!(job = %handle, delay_secs = delay.as_secs(), "enqueued with delay");

        self.inner.state.lock().await.delayed += 1;
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.release_delayed(msg).await;
        });
        Ok(handle)
    }

    async fn health_check(&self) -> Result<QueueHealth, QueueError> {
        Ok(QueueHealth {
            connected: !self.is_closed(),
            approximate_message_count: Some(self.outstanding().await as u64),
            provider: "memory".to_string(),
        })
    }
}

#[async_trait]
impl QueueConsumer for MemoryQueue {
    async fn poll_batch(&self, max_messages: u32) -> Result<Vec<QueueMessage>, QueueError> {
        let batch = self.take(max_messages).await;
        if !batch.is_empty() {
            return Ok(batch);
        }
        if self.drained().await {
            return Err(QueueError::Closed);
        }

        let _ = tokio::time::timeout(self.poll_wait, self.inner.notify.notified()).await;

        let batch = self.take(max_messages).await;
        if batch.is_empty() && self.drained().await {
            return Err(QueueError::Closed);
        }
        Ok(batch)
    }

    async fn ack(&self, receipt_handle: &str) -> Result<(), QueueError> {
        let removed = self.inner.state.lock().await.in_flight.remove(receipt_handle);
        match removed {
            Some(_) => {
                // Wake pollers that may be waiting for the queue to drain.
                self.inner.notify.notify_waiters();
                Ok(())
            }
            None => Err(QueueError::Ack(format!("unknown receipt handle {receipt_handle}"))),
        }
    }

    async fn nack(&self, receipt_handle: &str) -> Result<(), QueueError> {
        let msg = self.inner.state.lock().await.in_flight.remove(receipt_handle);
        match msg {
            Some(msg) => {
                self.inner.push(msg).await;
                Ok(())
            }
            None => Err(QueueError::Ack(format!("unknown receipt handle {receipt_handle}"))),
        }
    }
}
