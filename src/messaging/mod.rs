//! # Messaging Module
//!
//! The queue collaborator boundary. Everything the dispatch core needs from a
//! lease based message queue is expressed by [`QueueClient`]; storage, lease
//! renewal and persistence stay on the other side of that trait.
//!
//! Two implementations ship with the crate:
//!
//! - [`PgmqQueue`] talks to PostgreSQL through the `pgmq` extension
//! - [`InMemoryQueue`] keeps everything in process, for local runs and tests

pub mod errors;
pub mod in_memory;
pub mod pgmq_client;

pub use errors::MessagingError;
pub use in_memory::InMemoryQueue;
pub use pgmq_client::PgmqQueue;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One unit of queued data as handed out by the queue collaborator.
///
/// `read_ct` and `vt` are delivery metadata owned by the queue; the consumer
/// only borrows an envelope for the duration of one poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Queue assigned message id
    pub msg_id: i64,
    /// Number of times this message has been read (attempt count)
    pub read_ct: i32,
    /// When the message was first enqueued
    pub enqueued_at: DateTime<Utc>,
    /// Lease deadline: the message becomes visible to other readers after this
    pub vt: DateTime<Utc>,
    /// Flat wire payload, see [`crate::events::codec`]
    pub payload: serde_json::Value,
}

impl From<pgmq::types::Message<serde_json::Value>> for Envelope {
    fn from(message: pgmq::types::Message<serde_json::Value>) -> Self {
        Self {
            msg_id: message.msg_id,
            read_ct: message.read_ct,
            enqueued_at: message.enqueued_at,
            vt: message.vt,
            payload: message.message,
        }
    }
}

/// Minimal surface of a lease/visibility-timeout queue
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Create the queue if it does not already exist
    async fn ensure_queue(&self, queue_name: &str) -> Result<(), MessagingError>;

    /// Read up to `max_count` visible envelopes, hiding each one from other
    /// readers for `lease_seconds`
    async fn read_batch(
        &self,
        queue_name: &str,
        lease_seconds: i32,
        max_count: i32,
    ) -> Result<Vec<Envelope>, MessagingError>;

    /// Remove an envelope permanently. `false` means it was already gone.
    async fn delete_envelope(&self, queue_name: &str, msg_id: i64) -> Result<bool, MessagingError>;

    /// Enqueue one payload, visible after `delay_seconds`
    async fn send_one(
        &self,
        queue_name: &str,
        payload: &serde_json::Value,
        delay_seconds: u64,
    ) -> Result<i64, MessagingError>;

    /// Enqueue several payloads, visible after `delay_seconds`
    async fn send_batch(
        &self,
        queue_name: &str,
        payloads: &[serde_json::Value],
        delay_seconds: u64,
    ) -> Result<Vec<i64>, MessagingError>;

    /// Delete every message in the queue, returning how many were removed
    async fn purge(&self, queue_name: &str) -> Result<u64, MessagingError>;
}
