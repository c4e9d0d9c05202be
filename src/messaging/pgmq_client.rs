//! # PostgreSQL Message Queue Backend (pgmq-rs)
//!
//! [`QueueClient`] implementation on top of the `pgmq` crate.

use async_trait::async_trait;
use pgmq::PGMQueue;
use tracing::{debug, info, instrument, warn};

use crate::config::QueueConfig;

use super::errors::{is_connectivity_error, MessagingError};
use super::{Envelope, QueueClient};

/// pgmq backed queue collaborator
#[derive(Debug, Clone)]
pub struct PgmqQueue {
    pgmq: PGMQueue,
}

impl PgmqQueue {
    /// Connect using a connection string
    pub async fn new(database_url: &str) -> Result<Self, MessagingError> {
        info!("Connecting to pgmq");

        let pgmq = PGMQueue::new(database_url.to_string())
            .await
            .map_err(|e| classify_pgmq_error("<connect>", "connect", e))?;

        info!("Connected to pgmq");
        Ok(Self { pgmq })
    }

    /// Connect with an explicit pool size
    pub async fn connect_with_max_connections(
        database_url: &str,
        max_connections: u32,
    ) -> Result<Self, MessagingError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| {
                if is_connectivity_error(&e) {
                    MessagingError::database_connection(e.to_string())
                } else {
                    MessagingError::queue_operation("<connect>", "connect", e.to_string())
                }
            })?;
        Ok(Self::new_with_pool(pool).await)
    }

    /// Connect using the `queue` section of the configuration
    pub async fn from_config(config: &QueueConfig) -> Result<Self, MessagingError> {
        Self::connect_with_max_connections(&config.database_url, config.max_connections).await
    }

    /// Create a client over an existing connection pool (BYOP - Bring Your Own Pool)
    pub async fn new_with_pool(pool: sqlx::PgPool) -> Self {
        info!("Creating pgmq client with shared connection pool");

        let pgmq = PGMQueue::new_with_pool(pool).await;
        Self { pgmq }
    }

    /// Underlying connection pool for advanced operations
    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pgmq.connection
    }
}

/// Map a pgmq failure, keeping connectivity problems distinguishable
fn classify_pgmq_error(
    queue_name: &str,
    operation: &str,
    err: pgmq::errors::PgmqError,
) -> MessagingError {
    let unreachable = std::error::Error::source(&err)
        .and_then(|source| source.downcast_ref::<sqlx::Error>())
        .is_some_and(is_connectivity_error);

    if unreachable {
        MessagingError::database_connection(format!("{operation} on {queue_name}: {err}"))
    } else {
        MessagingError::queue_operation(queue_name, operation, err.to_string())
    }
}

#[async_trait]
impl QueueClient for PgmqQueue {
    #[instrument(skip(self), fields(queue = %queue_name))]
    async fn ensure_queue(&self, queue_name: &str) -> Result<(), MessagingError> {
        debug!("Ensuring queue exists: {}", queue_name);

        // pgmq.create is idempotent
        self.pgmq
            .create(queue_name)
            .await
            .map_err(|e| classify_pgmq_error(queue_name, "create", e))?;

        info!("Queue ready: {}", queue_name);
        Ok(())
    }

    #[instrument(skip(self), fields(queue = %queue_name, max_count = max_count))]
    async fn read_batch(
        &self,
        queue_name: &str,
        lease_seconds: i32,
        max_count: i32,
    ) -> Result<Vec<Envelope>, MessagingError> {
        let messages = self
            .pgmq
            .read_batch::<serde_json::Value>(queue_name, Some(lease_seconds), max_count)
            .await
            .map_err(|e| classify_pgmq_error(queue_name, "read_batch", e))?
            .unwrap_or_default();

        debug!("Read {} messages from queue: {}", messages.len(), queue_name);
        Ok(messages.into_iter().map(Envelope::from).collect())
    }

    #[instrument(skip(self), fields(queue = %queue_name, msg_id = msg_id))]
    async fn delete_envelope(&self, queue_name: &str, msg_id: i64) -> Result<bool, MessagingError> {
        let deleted = self
            .pgmq
            .delete(queue_name, msg_id)
            .await
            .map_err(|e| classify_pgmq_error(queue_name, "delete", e))?;

        debug!("Message deleted: {} ({} row)", msg_id, deleted);
        Ok(deleted > 0)
    }

    #[instrument(skip(self, payload), fields(queue = %queue_name))]
    async fn send_one(
        &self,
        queue_name: &str,
        payload: &serde_json::Value,
        delay_seconds: u64,
    ) -> Result<i64, MessagingError> {
        let msg_id = if delay_seconds == 0 {
            self.pgmq.send(queue_name, payload).await
        } else {
            self.pgmq.send_delay(queue_name, payload, delay_seconds).await
        }
        .map_err(|e| classify_pgmq_error(queue_name, "send", e))?;

        debug!("Message sent to queue: {} with id: {}", queue_name, msg_id);
        Ok(msg_id)
    }

    #[instrument(skip(self, payloads), fields(queue = %queue_name, count = payloads.len()))]
    async fn send_batch(
        &self,
        queue_name: &str,
        payloads: &[serde_json::Value],
        delay_seconds: u64,
    ) -> Result<Vec<i64>, MessagingError> {
        if delay_seconds == 0 {
            return self
                .pgmq
                .send_batch(queue_name, payloads)
                .await
                .map_err(|e| classify_pgmq_error(queue_name, "send_batch", e));
        }

        let mut msg_ids = Vec::with_capacity(payloads.len());
        for payload in payloads {
            let msg_id = self
                .pgmq
                .send_delay(queue_name, payload, delay_seconds)
                .await
                .map_err(|e| classify_pgmq_error(queue_name, "send_batch", e))?;
            msg_ids.push(msg_id);
        }
        Ok(msg_ids)
    }

    #[instrument(skip(self), fields(queue = %queue_name))]
    async fn purge(&self, queue_name: &str) -> Result<u64, MessagingError> {
        warn!("Purging queue: {}", queue_name);

        let purged = self
            .pgmq
            .purge(queue_name)
            .await
            .map_err(|e| classify_pgmq_error(queue_name, "purge", e))?;

        warn!("Purged {} messages from queue: {}", purged, queue_name);
        Ok(purged)
    }
}
