//! # In-Memory Queue
//!
//! A process local queue with the same lease semantics as pgmq: a read hides a
//! message until its visibility timeout expires, after which it is handed out
//! again with an incremented read count. Lease clocks use `tokio::time`, so
//! tests running with a paused clock see leases expire deterministically.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{Envelope, MessagingError, QueueClient};

#[derive(Debug)]
struct StoredMessage {
    payload: serde_json::Value,
    enqueued_at: DateTime<Utc>,
    visible_at: Instant,
    read_ct: i32,
}

#[derive(Debug, Default)]
struct QueueState {
    next_msg_id: i64,
    messages: BTreeMap<i64, StoredMessage>,
}

#[derive(Debug, Default)]
struct Inner {
    queues: HashMap<String, QueueState>,
    injected_read_failures: u32,
    reads: u64,
}

/// In-process [`QueueClient`]
#[derive(Debug, Default)]
pub struct InMemoryQueue {
    inner: Mutex<Inner>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` reads fail with a connectivity error
    pub fn fail_next_reads(&self, count: u32) {
        self.inner.lock().injected_read_failures = count;
    }

    /// Messages currently stored, leased or not
    pub fn len(&self, queue_name: &str) -> usize {
        self.inner
            .lock()
            .queues
            .get(queue_name)
            .map_or(0, |queue| queue.messages.len())
    }

    pub fn is_empty(&self, queue_name: &str) -> bool {
        self.len(queue_name) == 0
    }

    /// Messages that a read would return right now
    pub fn visible_len(&self, queue_name: &str) -> usize {
        let now = Instant::now();
        self.inner
            .lock()
            .queues
            .get(queue_name)
            .map_or(0, |queue| {
                queue
                    .messages
                    .values()
                    .filter(|message| message.visible_at <= now)
                    .count()
            })
    }

    /// Number of successful read calls made against any queue
    pub fn read_calls(&self) -> u64 {
        self.inner.lock().reads
    }

    /// Payloads still stored, in id order
    pub fn payloads(&self, queue_name: &str) -> Vec<serde_json::Value> {
        self.inner
            .lock()
            .queues
            .get(queue_name)
            .map(|queue| {
                queue
                    .messages
                    .values()
                    .map(|message| message.payload.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn enqueue(
        &self,
        queue_name: &str,
        payloads: &[serde_json::Value],
        delay_seconds: u64,
    ) -> Result<Vec<i64>, MessagingError> {
        let mut inner = self.inner.lock();
        let queue = inner
            .queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;

        let visible_at = Instant::now() + Duration::from_secs(delay_seconds);
        let mut msg_ids = Vec::with_capacity(payloads.len());
        for payload in payloads {
            queue.next_msg_id += 1;
            let msg_id = queue.next_msg_id;
            queue.messages.insert(
                msg_id,
                StoredMessage {
                    payload: payload.clone(),
                    enqueued_at: Utc::now(),
                    visible_at,
                    read_ct: 0,
                },
            );
            msg_ids.push(msg_id);
        }
        Ok(msg_ids)
    }
}

#[async_trait]
impl QueueClient for InMemoryQueue {
    async fn ensure_queue(&self, queue_name: &str) -> Result<(), MessagingError> {
        if queue_name.trim().is_empty() {
            return Err(MessagingError::invalid_queue_name(
                queue_name,
                "queue name must not be empty",
            ));
        }
        self.inner
            .lock()
            .queues
            .entry(queue_name.to_string())
            .or_default();
        Ok(())
    }

    async fn read_batch(
        &self,
        queue_name: &str,
        lease_seconds: i32,
        max_count: i32,
    ) -> Result<Vec<Envelope>, MessagingError> {
        let mut inner = self.inner.lock();
        if inner.injected_read_failures > 0 {
            inner.injected_read_failures -= 1;
            warn!(queue = %queue_name, "Injected read failure");
            return Err(MessagingError::database_connection(
                "injected connectivity failure",
            ));
        }
        inner.reads += 1;

        let queue = inner
            .queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;

        let now = Instant::now();
        let lease = Duration::from_secs(u64::try_from(lease_seconds.max(0)).unwrap_or_default());
        let limit = usize::try_from(max_count.max(0)).unwrap_or_default();

        let mut batch = Vec::new();
        for (msg_id, message) in queue
            .messages
            .iter_mut()
            .filter(|(_, message)| message.visible_at <= now)
            .take(limit)
        {
            message.visible_at = now + lease;
            message.read_ct += 1;
            let lease_chrono = chrono::Duration::from_std(lease).unwrap_or_default();
            batch.push(Envelope {
                msg_id: *msg_id,
                read_ct: message.read_ct,
                enqueued_at: message.enqueued_at,
                vt: Utc::now() + lease_chrono,
                payload: message.payload.clone(),
            });
        }

        debug!(queue = %queue_name, count = batch.len(), "Read batch from in-memory queue");
        Ok(batch)
    }

    async fn delete_envelope(&self, queue_name: &str, msg_id: i64) -> Result<bool, MessagingError> {
        let mut inner = self.inner.lock();
        let queue = inner
            .queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;
        Ok(queue.messages.remove(&msg_id).is_some())
    }

    async fn send_one(
        &self,
        queue_name: &str,
        payload: &serde_json::Value,
        delay_seconds: u64,
    ) -> Result<i64, MessagingError> {
        let msg_ids = self.enqueue(queue_name, std::slice::from_ref(payload), delay_seconds)?;
        msg_ids
            .first()
            .copied()
            .ok_or_else(|| MessagingError::queue_operation(queue_name, "send", "no id assigned"))
    }

    async fn send_batch(
        &self,
        queue_name: &str,
        payloads: &[serde_json::Value],
        delay_seconds: u64,
    ) -> Result<Vec<i64>, MessagingError> {
        self.enqueue(queue_name, payloads, delay_seconds)
    }

    async fn purge(&self, queue_name: &str) -> Result<u64, MessagingError> {
        let mut inner = self.inner.lock();
        let queue = inner
            .queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;
        let purged = queue.messages.len() as u64;
        queue.messages.clear();
        Ok(purged)
    }
}
