//! Consumer lifecycle states.
//!
//! ```text
//!            End / stop flag             drained
//! Running ─────────────────▶ DrainingEnd ───────▶ Stopped
//!    │                           │
//!    │ Interrupt                 │ Interrupt
//!    ▼                           ▼
//! DrainingInterrupt ◀────────────┘
//!    │ drained
//!    ▼
//! Stopped
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::dispatch::ControlSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerState {
    /// Polling and spawning dispatch tasks
    Running,
    /// No new reads; in-flight tasks finish and delete their envelopes
    DrainingEnd,
    /// No new reads; the run reports an interrupt once drained
    DrainingInterrupt,
    /// Every task has been observed
    Stopped,
}

impl ConsumerState {
    pub fn is_polling(self) -> bool {
        self == Self::Running
    }

    pub fn is_draining(self) -> bool {
        matches!(self, Self::DrainingEnd | Self::DrainingInterrupt)
    }

    pub fn is_interrupted(self) -> bool {
        self == Self::DrainingInterrupt
    }

    /// State after observing `signal`. Interrupt upgrades an end drain; an
    /// end never downgrades an interrupt.
    pub fn on_signal(self, signal: ControlSignal) -> Self {
        match (self, signal) {
            (Self::Running | Self::DrainingEnd, ControlSignal::Interrupt) => {
                Self::DrainingInterrupt
            }
            (Self::Running, ControlSignal::End) => Self::DrainingEnd,
            (state, _) => state,
        }
    }

    /// The external stop flag behaves like an end signal
    pub fn on_stop_requested(self) -> Self {
        self.on_signal(ControlSignal::End)
    }

    /// Terminal transition once the in-flight set is empty
    pub fn finish(self) -> Self {
        Self::Stopped
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Running, Self::DrainingEnd)
                | (Self::Running, Self::DrainingInterrupt)
                | (Self::DrainingEnd, Self::DrainingInterrupt)
                | (Self::Running, Self::Stopped)
                | (Self::DrainingEnd, Self::Stopped)
                | (Self::DrainingInterrupt, Self::Stopped)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::DrainingEnd => "draining_end",
            Self::DrainingInterrupt => "draining_interrupt",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
