//! # Dispatch
//!
//! Handler registration, the shared outcome policy, and the concurrent
//! broadcast of one event to its handlers.

pub mod dispatcher;
pub mod error_classifier;
pub mod handler_table;

pub use dispatcher::{DispatchReport, Dispatcher};
pub use error_classifier::{classify, Completion, ControlSignal, Outcome};
pub use handler_table::{HandlerError, HandlerResult, HandlerTable, RegisteredHandler};
