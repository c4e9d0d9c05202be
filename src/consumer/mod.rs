//! # Consumer
//!
//! Polls one queue, decodes each envelope into a typed event and hands it to
//! the [`Dispatcher`] as an independent tracked task. The envelope is deleted
//! by that task once dispatch finishes, so a crash mid-dispatch leaves it for
//! redelivery when its lease expires.
//!
//! Polling stops when an `EndEvent` or `InterruptEvent` is read, when a
//! handler escalates a control signal, or when the [`StopFlag`] is raised. In
//! every case the tasks already spawned run to completion before
//! [`Consumer::run`] returns.

pub mod state;

pub use state::ConsumerState;

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{ConfigurationError, ConsumerConfig};
use crate::dispatch::{
    classify, Completion, ControlSignal, Dispatcher, HandlerError, HandlerTable, Outcome,
};
use crate::events::{decode, DynEvent, EndEvent, EventRegistry, InterruptEvent};
use crate::messaging::{MessagingError, QueueClient};

#[derive(Error, Debug)]
pub enum ConsumerError {
    /// The run ended because of an interrupt; in-flight work was drained first
    #[error("Consumer interrupted after dispatching {} events", .summary.dispatched)]
    Interrupted { summary: ConsumerSummary },

    #[error("Consumer configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Consumer could not prepare its queue: {0}")]
    Messaging(#[from] MessagingError),
}

/// Why polling stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    StopFlag,
    End,
    Interrupt,
}

/// Counters for one [`Consumer::run`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerSummary {
    pub consumer_id: Uuid,
    /// Envelopes returned by the queue
    pub read: u64,
    /// Envelopes decoded and handed to a dispatch task
    pub dispatched: u64,
    /// Envelopes removed after dispatch
    pub deleted: u64,
    pub decode_failures: u64,
    pub read_errors: u64,
    /// End or interrupt envelopes left leased because this consumer was
    /// already draining
    pub deferred_sentinels: u64,
    pub stop_reason: Option<StopReason>,
    pub final_state: ConsumerState,
}

impl ConsumerSummary {
    fn new(consumer_id: Uuid) -> Self {
        Self {
            consumer_id,
            read: 0,
            dispatched: 0,
            deleted: 0,
            decode_failures: 0,
            read_errors: 0,
            deferred_sentinels: 0,
            stop_reason: None,
            final_state: ConsumerState::Running,
        }
    }
}

/// Shared flag that asks a running consumer to stop polling
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Result of one dispatch task
#[derive(Debug)]
struct DispatchCompletion {
    msg_id: i64,
    outcome: Outcome,
    deleted: bool,
}

/// Queue polling loop feeding the dispatcher
pub struct Consumer {
    consumer_id: Uuid,
    queue: Arc<dyn QueueClient>,
    registry: Arc<EventRegistry>,
    dispatcher: Dispatcher,
    config: ConsumerConfig,
    stop: StopFlag,
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("consumer_id", &self.consumer_id)
            .field("config", &self.config)
            .field("registered_types", &self.registry.len())
            .field("handlers", &self.dispatcher.handlers().len())
            .finish()
    }
}

impl Consumer {
    pub fn new(
        queue: Arc<dyn QueueClient>,
        registry: Arc<EventRegistry>,
        handlers: Arc<HandlerTable>,
        config: ConsumerConfig,
    ) -> Result<Self, ConsumerError> {
        config.validate()?;
        Ok(Self {
            consumer_id: Uuid::new_v4(),
            queue,
            registry,
            dispatcher: Dispatcher::new(handlers),
            config,
            stop: StopFlag::new(),
        })
    }

    /// Share an externally owned stop flag
    pub fn with_stop_flag(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    pub fn consumer_id(&self) -> Uuid {
        self.consumer_id
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Poll until an end, interrupt or stop request, then drain.
    ///
    /// Returns [`ConsumerError::Interrupted`] when the interrupt path was
    /// taken, after every spawned task has finished.
    pub async fn run(&self) -> Result<ConsumerSummary, ConsumerError> {
        let queue_name = self.config.queue_name.as_str();
        self.queue.ensure_queue(queue_name).await?;

        let lease_seconds = self.config.lease_seconds();
        let max_count = i32::try_from(self.config.batch_size).unwrap_or(i32::MAX);
        let mut summary = ConsumerSummary::new(self.consumer_id);
        let mut state = ConsumerState::Running;
        let mut in_flight: JoinSet<DispatchCompletion> = JoinSet::new();

        info!(
            consumer_id = %self.consumer_id,
            queue = %queue_name,
            batch_size = self.config.batch_size,
            lease_seconds,
            "Starting consumer"
        );

        loop {
            while let Some(joined) = in_flight.try_join_next() {
                state = self.observe_completion(state, joined, &mut summary);
            }

            if !state.is_polling() {
                break;
            }
            if self.stop.is_stopped() {
                info!(consumer_id = %self.consumer_id, "Stop requested");
                state = state.on_stop_requested();
                summary.stop_reason = Some(StopReason::StopFlag);
                break;
            }

            let envelopes = match self
                .queue
                .read_batch(queue_name, lease_seconds, max_count)
                .await
            {
                Ok(envelopes) => envelopes,
                Err(err) => {
                    summary.read_errors += 1;
                    if err.is_transient() {
                        warn!(consumer_id = %self.consumer_id, error = %err, "Transient read failure, backing off");
                    } else {
                        error!(consumer_id = %self.consumer_id, error = %err, "Read failed, backing off");
                    }
                    tokio::time::sleep(self.config.error_backoff()).await;
                    continue;
                }
            };

            if envelopes.is_empty() {
                tokio::time::sleep(self.config.empty_poll_delay()).await;
                continue;
            }

            summary.read += envelopes.len() as u64;
            debug!(consumer_id = %self.consumer_id, count = envelopes.len(), "Read batch");

            for envelope in envelopes {
                let event = match decode(&self.registry, &envelope.payload) {
                    Ok(event) => event,
                    Err(err) => {
                        summary.decode_failures += 1;
                        warn!(
                            consumer_id = %self.consumer_id,
                            msg_id = envelope.msg_id,
                            read_ct = envelope.read_ct,
                            error = %err,
                            "Failed to decode envelope, leaving it for redelivery"
                        );
                        continue;
                    }
                };

                // One sentinel stops one consumer. Later ones in the same batch
                // belong to siblings sharing the queue and return on lease expiry.
                if event.is_control() && !state.is_polling() {
                    summary.deferred_sentinels += 1;
                    info!(
                        consumer_id = %self.consumer_id,
                        msg_id = envelope.msg_id,
                        event_type = event.type_name(),
                        "Already draining, leaving sentinel for another consumer"
                    );
                    continue;
                }

                if event.is::<InterruptEvent>() {
                    info!(consumer_id = %self.consumer_id, msg_id = envelope.msg_id, "Interrupt event received");
                    state = state.on_signal(ControlSignal::Interrupt);
                } else if let Some(end) = event.downcast_ref::<EndEvent>() {
                    info!(
                        consumer_id = %self.consumer_id,
                        msg_id = envelope.msg_id,
                        timeout = ?end.timeout,
                        "End event received"
                    );
                    state = state.on_signal(ControlSignal::End);
                }

                self.spawn_dispatch(&mut in_flight, envelope.msg_id, event);
                summary.dispatched += 1;
            }
        }

        info!(
            consumer_id = %self.consumer_id,
            state = %state,
            in_flight = in_flight.len(),
            "Polling stopped, draining in-flight dispatches"
        );
        while let Some(joined) = in_flight.join_next().await {
            state = self.observe_completion(state, joined, &mut summary);
        }

        let interrupted = state.is_interrupted();
        if interrupted {
            summary.stop_reason = Some(StopReason::Interrupt);
        } else if summary.stop_reason.is_none() {
            summary.stop_reason = Some(StopReason::End);
        }
        summary.final_state = state.finish();

        info!(
            consumer_id = %self.consumer_id,
            read = summary.read,
            dispatched = summary.dispatched,
            deleted = summary.deleted,
            decode_failures = summary.decode_failures,
            read_errors = summary.read_errors,
            deferred_sentinels = summary.deferred_sentinels,
            stop_reason = ?summary.stop_reason,
            "Consumer stopped"
        );

        if interrupted {
            Err(ConsumerError::Interrupted { summary })
        } else {
            Ok(summary)
        }
    }

    fn spawn_dispatch(
        &self,
        in_flight: &mut JoinSet<DispatchCompletion>,
        msg_id: i64,
        event: DynEvent,
    ) {
        let dispatcher = self.dispatcher.clone();
        let queue = self.queue.clone();
        let queue_name = self.config.queue_name.clone();
        let timeout = self.config.handler_timeout();
        let span = info_span!(
            "dispatch",
            consumer_id = %self.consumer_id,
            msg_id,
            event_type = event.type_name()
        );

        in_flight.spawn(
            async move {
                let work = async move {
                    dispatcher
                        .handle_event(event, timeout)
                        .await
                        .map(|_report| ())
                        .map_err(HandlerError::from)
                };
                let unwound = AssertUnwindSafe(work).catch_unwind().await;
                let outcome = classify(Completion::from_unwind(unwound));

                let deleted = if outcome.signal().is_none() {
                    match queue.delete_envelope(&queue_name, msg_id).await {
                        Ok(deleted) => deleted,
                        Err(err) => {
                            warn!(error = %err, "Failed to delete envelope after dispatch");
                            false
                        }
                    }
                } else {
                    false
                };

                DispatchCompletion {
                    msg_id,
                    outcome,
                    deleted,
                }
            }
            .instrument(span),
        );
    }

    fn observe_completion(
        &self,
        state: ConsumerState,
        joined: Result<DispatchCompletion, JoinError>,
        summary: &mut ConsumerSummary,
    ) -> ConsumerState {
        let (msg_id, outcome) = match joined {
            Ok(completion) => {
                if completion.deleted {
                    summary.deleted += 1;
                }
                (Some(completion.msg_id), completion.outcome)
            }
            Err(join_error) => (None, classify(Completion::from_join_error(join_error))),
        };

        match &outcome {
            Outcome::Ok => {
                debug!(consumer_id = %self.consumer_id, msg_id, "Dispatch completed");
            }
            Outcome::Timeout | Outcome::Cancelled => {
                warn!(consumer_id = %self.consumer_id, msg_id, outcome = outcome.label(), "Dispatch did not complete");
            }
            Outcome::EndSignal | Outcome::InterruptSignal => {
                info!(consumer_id = %self.consumer_id, msg_id, outcome = outcome.label(), "Dispatch escalated a control signal");
            }
            Outcome::Fault(err) => {
                error!(consumer_id = %self.consumer_id, msg_id, error = ?err, "Dispatch task failed");
            }
        }

        match outcome.signal() {
            Some(signal) => state.on_signal(signal),
            None => state,
        }
    }
}
