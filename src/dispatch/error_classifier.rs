//! # Error Classifier
//!
//! The single policy that turns the way a unit of work ended into an
//! [`Outcome`]. The dispatcher applies it to every handler invocation and the
//! consumer applies it to every dispatch task, so both sides agree on what is
//! recoverable and what must be escalated.
//!
//! ```text
//! ┌──────────────┐     ┌──────────┐     ┌──────────────────────────────┐
//! │ Completion   │────▶│ classify │────▶│ Ok | Timeout | Cancelled     │
//! │ (how it      │     │          │     │ EndSignal | InterruptSignal  │
//! │  finished)   │     │          │     │ Fault                        │
//! └──────────────┘     └──────────┘     └──────────────────────────────┘
//! ```

use std::any::Any;

use tokio::task::JoinError;
use tokio::time::error::Elapsed;

use super::handler_table::{HandlerError, HandlerResult};

/// Shutdown request escalated from a handler towards the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlSignal {
    End,
    Interrupt,
}

impl ControlSignal {
    /// When several siblings escalate, interrupt takes precedence over end
    pub fn strongest(self, other: Self) -> Self {
        match (self, other) {
            (Self::Interrupt, _) | (_, Self::Interrupt) => Self::Interrupt,
            _ => Self::End,
        }
    }
}

impl From<ControlSignal> for HandlerError {
    fn from(signal: ControlSignal) -> Self {
        match signal {
            ControlSignal::End => HandlerError::End,
            ControlSignal::Interrupt => HandlerError::Interrupt,
        }
    }
}

/// How a unit of work finished, before any policy is applied
#[derive(Debug)]
pub enum Completion {
    /// Ran to completion and returned a result
    Finished(HandlerResult),
    /// Hit its deadline
    DeadlineExceeded,
    /// Was cancelled before finishing
    Cancelled,
    /// Panicked; carries the panic message
    Panicked(String),
}

impl Completion {
    /// From `timeout(deadline, AssertUnwindSafe(work).catch_unwind())`
    pub fn from_guarded(
        result: Result<Result<HandlerResult, Box<dyn Any + Send>>, Elapsed>,
    ) -> Self {
        match result {
            Ok(Ok(handler_result)) => Self::Finished(handler_result),
            Ok(Err(panic)) => Self::Panicked(panic_message(panic.as_ref())),
            Err(_elapsed) => Self::DeadlineExceeded,
        }
    }

    /// From `AssertUnwindSafe(work).catch_unwind()` with no deadline
    pub fn from_unwind(result: Result<HandlerResult, Box<dyn Any + Send>>) -> Self {
        match result {
            Ok(handler_result) => Self::Finished(handler_result),
            Err(panic) => Self::Panicked(panic_message(panic.as_ref())),
        }
    }

    /// From a task whose join failed
    pub fn from_join_error(err: JoinError) -> Self {
        if err.is_cancelled() {
            Self::Cancelled
        } else {
            match err.try_into_panic() {
                Ok(panic) => Self::Panicked(panic_message(panic.as_ref())),
                Err(err) => Self::Panicked(err.to_string()),
            }
        }
    }
}

/// Classified result of one unit of work
#[derive(Debug)]
pub enum Outcome {
    Ok,
    Timeout,
    Cancelled,
    EndSignal,
    InterruptSignal,
    Fault(anyhow::Error),
}

impl Outcome {
    pub fn signal(&self) -> Option<ControlSignal> {
        match self {
            Self::EndSignal => Some(ControlSignal::End),
            Self::InterruptSignal => Some(ControlSignal::Interrupt),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::EndSignal => "end_signal",
            Self::InterruptSignal => "interrupt_signal",
            Self::Fault(_) => "fault",
        }
    }
}

/// Apply the shared policy
pub fn classify(completion: Completion) -> Outcome {
    match completion {
        Completion::Finished(Ok(())) => Outcome::Ok,
        Completion::Finished(Err(HandlerError::End)) => Outcome::EndSignal,
        Completion::Finished(Err(HandlerError::Interrupt)) => Outcome::InterruptSignal,
        Completion::Finished(Err(HandlerError::Fault(err))) => Outcome::Fault(err),
        Completion::DeadlineExceeded => Outcome::Timeout,
        Completion::Cancelled => Outcome::Cancelled,
        Completion::Panicked(message) => Outcome::Fault(anyhow::anyhow!("panicked: {message}")),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
