//! # Publisher
//!
//! Encodes typed events into their flat wire form and enqueues them on one
//! queue. Also the producer side of the shutdown protocol: [`Publisher::publish_end`]
//! and [`Publisher::publish_interrupt`] enqueue the control sentinels consumers
//! react to.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::events::codec::{encode, CodecError};
use crate::events::{EndEvent, Event, InterruptEvent};
use crate::logging::log_queue_operation;
use crate::messaging::{MessagingError, QueueClient};

/// Error types for event publishing
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Failed to encode event: {0}")]
    Codec(#[from] CodecError),

    #[error("Failed to enqueue event: {0}")]
    Messaging(#[from] MessagingError),
}

/// Typed producer bound to a single queue
#[derive(Clone)]
pub struct Publisher {
    queue: Arc<dyn QueueClient>,
    queue_name: String,
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("queue_name", &self.queue_name)
            .finish()
    }
}

impl Publisher {
    /// Bind to `queue_name`, creating the queue if needed
    pub async fn new(
        queue: Arc<dyn QueueClient>,
        queue_name: impl Into<String>,
    ) -> Result<Self, PublishError> {
        let queue_name = queue_name.into();
        queue.ensure_queue(&queue_name).await?;
        debug!(queue = %queue_name, "Publisher ready");
        Ok(Self { queue, queue_name })
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Enqueue one event, optionally hidden from consumers for `delay`
    #[instrument(skip(self, event), fields(queue = %self.queue_name, event_type = E::TYPE_NAME))]
    pub async fn publish_event<E: Event>(
        &self,
        event: &E,
        delay: Option<Duration>,
    ) -> Result<i64, PublishError> {
        let payload = encode(event)?;
        let msg_id = self
            .queue
            .send_one(&self.queue_name, &payload, delay_seconds(delay))
            .await?;
        debug!(msg_id, "Event published");
        Ok(msg_id)
    }

    /// Enqueue several events of one type in a single call
    #[instrument(skip(self, events), fields(queue = %self.queue_name, event_type = E::TYPE_NAME))]
    pub async fn publish_events<E: Event>(
        &self,
        events: &[E],
        delay: Option<Duration>,
    ) -> Result<Vec<i64>, PublishError> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let payloads = events.iter().map(encode).collect::<Result<Vec<_>, _>>()?;
        let msg_ids = self
            .queue
            .send_batch(&self.queue_name, &payloads, delay_seconds(delay))
            .await?;
        log_queue_operation("publish_batch", &self.queue_name, msg_ids.len(), "ok");
        Ok(msg_ids)
    }

    /// Ask consumers to stop polling once in-flight work is done
    pub async fn publish_end(&self, timeout: Option<f64>) -> Result<i64, PublishError> {
        let event = match timeout {
            Some(seconds) => EndEvent::with_timeout(seconds),
            None => EndEvent::new(),
        };
        let msg_id = self.publish_event(&event, None).await?;
        info!(queue = %self.queue_name, msg_id, "Published end sentinel");
        Ok(msg_id)
    }

    /// Ask consumers to stop polling immediately and report an interrupt
    pub async fn publish_interrupt(&self) -> Result<i64, PublishError> {
        let msg_id = self.publish_event(&InterruptEvent::new(), None).await?;
        info!(queue = %self.queue_name, msg_id, "Published interrupt sentinel");
        Ok(msg_id)
    }

    /// Remove every message from the queue
    pub async fn clean(&self) -> Result<u64, PublishError> {
        let purged = self.queue.purge(&self.queue_name).await?;
        log_queue_operation("purge", &self.queue_name, purged as usize, "ok");
        Ok(purged)
    }
}

/// Queue delays are whole seconds; partial seconds round up
fn delay_seconds(delay: Option<Duration>) -> u64 {
    delay.map_or(0, |delay| {
        delay.as_secs() + u64::from(delay.subsec_nanos() > 0)
    })
}
