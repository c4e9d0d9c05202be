//! # Dispatcher
//!
//! Fans one event out to every handler registered for its exact type. Each
//! handler runs as its own tokio task under a deadline, siblings are never
//! cancelled when one of them fails, and the call returns only after every
//! task has been observed.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::error_classifier::{classify, Completion, ControlSignal, Outcome};
use super::handler_table::HandlerTable;
use crate::events::DynEvent;

/// Tally of one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Units of work spawned, one per registered handler
    pub spawned: usize,
    pub succeeded: usize,
    pub timed_out: usize,
    pub cancelled: usize,
    pub faulted: usize,
}

impl DispatchReport {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Ok => self.succeeded += 1,
            Outcome::Timeout => self.timed_out += 1,
            Outcome::Cancelled => self.cancelled += 1,
            Outcome::Fault(_) => self.faulted += 1,
            Outcome::EndSignal | Outcome::InterruptSignal => {}
        }
    }
}

/// Concurrent, best-effort handler broadcast
#[derive(Debug, Clone)]
pub struct Dispatcher {
    handlers: Arc<HandlerTable>,
}

impl Dispatcher {
    pub fn new(handlers: Arc<HandlerTable>) -> Self {
        Self { handlers }
    }

    pub fn handlers(&self) -> &Arc<HandlerTable> {
        &self.handlers
    }

    /// Run every handler for `event`, each bounded by `timeout`.
    ///
    /// Returns `Err` with a single control signal when any handler asked for a
    /// shutdown; interrupt wins over end. Faults, timeouts and cancellations
    /// are logged and counted in the report.
    pub async fn handle_event(
        &self,
        event: DynEvent,
        timeout: Duration,
    ) -> Result<DispatchReport, ControlSignal> {
        let registered = self.handlers.handlers_for(event.as_ref());
        if registered.is_empty() {
            if !event.is_control() {
                info!(event_type = event.type_name(), "No handler registered");
            }
            return Ok(DispatchReport::default());
        }

        let mut units = JoinSet::new();
        for handler in registered {
            let handler = handler.clone();
            let event = event.clone();
            debug!(
                event_type = event.type_name(),
                handler = handler.name(),
                "Spawning handler"
            );
            units.spawn(async move {
                let work = async { handler.invoke(event).await };
                let guarded =
                    tokio::time::timeout(timeout, AssertUnwindSafe(work).catch_unwind()).await;
                (handler, Completion::from_guarded(guarded))
            });
        }

        let mut report = DispatchReport {
            spawned: registered.len(),
            ..DispatchReport::default()
        };
        let mut escalation: Option<ControlSignal> = None;

        while let Some(joined) = units.join_next().await {
            let (handler_name, completion) = match joined {
                Ok((handler, completion)) => (Some(handler.name().to_string()), completion),
                Err(join_error) => (None, Completion::from_join_error(join_error)),
            };
            let handler_name = handler_name.as_deref().unwrap_or("<unknown>");

            let outcome = classify(completion);
            report.record(&outcome);
            match &outcome {
                Outcome::Ok => {
                    debug!(
                        event_type = event.type_name(),
                        handler = handler_name,
                        "Handler completed"
                    );
                }
                Outcome::Timeout => {
                    warn!(
                        event_type = event.type_name(),
                        handler = handler_name,
                        timeout_ms = timeout.as_millis() as u64,
                        "Handler timed out"
                    );
                }
                Outcome::Cancelled => {
                    warn!(
                        event_type = event.type_name(),
                        handler = handler_name,
                        "Handler cancelled"
                    );
                }
                Outcome::EndSignal | Outcome::InterruptSignal => {
                    info!(
                        event_type = event.type_name(),
                        handler = handler_name,
                        outcome = outcome.label(),
                        "Handler escalated a control signal"
                    );
                }
                Outcome::Fault(err) => {
                    error!(
                        event_type = event.type_name(),
                        handler = handler_name,
                        event = ?event,
                        error = ?err,
                        "Error while handling event"
                    );
                }
            }

            if let Some(signal) = outcome.signal() {
                escalation = Some(escalation.map_or(signal, |seen| seen.strongest(signal)));
            }
        }

        match escalation {
            Some(signal) => Err(signal),
            None => Ok(report),
        }
    }
}
