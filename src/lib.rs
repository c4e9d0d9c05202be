#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, pgmq in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # pgmq-events
//!
//! Typed events over a lease-based PostgreSQL message queue (pgmq), with
//! concurrent in-process handler dispatch.
//!
//! ## Overview
//!
//! Producers publish typed events through a [`Publisher`]. A [`Consumer`]
//! polls the same queue, decodes each envelope into its registered Rust type
//! and broadcasts it to every handler registered for that exact type. Each
//! handler runs as its own task under a deadline; failures in one handler never
//! affect its siblings. An envelope is deleted only after its dispatch has
//! finished, so lease expiry is the retry mechanism.
//!
//! ## Module Organization
//!
//! - [`events`] - `Event` trait, type registry and wire codec
//! - [`dispatch`] - handler table, error classifier and dispatcher
//! - [`consumer`] - polling loop and drain state machine
//! - [`publisher`] - typed producer and shutdown sentinels
//! - [`messaging`] - `QueueClient` seam with pgmq and in-memory backends
//! - [`config`] - layered configuration
//! - [`logging`] - tracing subscriber setup
//! - [`error`] - crate-level error umbrella
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pgmq_events::{
//!     Consumer, ConsumerConfig, Event, EventRegistry, HandlerResult, HandlerTable, PgmqQueue,
//!     Publisher,
//! };
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct UserRegistered {
//!     email: String,
//! }
//!
//! impl Event for UserRegistered {
//!     const TYPE_NAME: &'static str = "UserRegistered";
//! }
//!
//! async fn send_welcome(event: Arc<UserRegistered>) -> HandlerResult {
//!     tracing::info!(email = %event.email, "Sending welcome mail");
//!     Ok(())
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! pgmq_events::logging::init_structured_logging();
//! let queue = Arc::new(PgmqQueue::new("postgres://localhost/events").await?);
//!
//! let mut registry = EventRegistry::new();
//! registry.register::<UserRegistered>()?;
//! let mut handlers = HandlerTable::new();
//! handlers.on_event(send_welcome);
//!
//! let publisher = Publisher::new(queue.clone(), "users").await?;
//! publisher
//!     .publish_event(&UserRegistered { email: "a@example.com".into() }, None)
//!     .await?;
//! publisher.publish_end(None).await?;
//!
//! let consumer = Consumer::new(
//!     queue,
//!     Arc::new(registry),
//!     Arc::new(handlers),
//!     ConsumerConfig::new("users"),
//! )?;
//! let summary = consumer.run().await?;
//! println!("dispatched {} events", summary.dispatched);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod consumer;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod logging;
pub mod messaging;
pub mod publisher;

pub use crate::config::{ConfigLoader, ConsumerConfig, EventsConfig, QueueConfig};
pub use consumer::{
    Consumer, ConsumerError, ConsumerState, ConsumerSummary, StopFlag, StopReason,
};
pub use dispatch::{
    classify, Completion, ControlSignal, DispatchReport, Dispatcher, HandlerError, HandlerResult,
    HandlerTable, Outcome,
};
pub use error::{EventsError, Result};
pub use events::codec::CodecError;
pub use events::registry::RegistryError;
pub use events::{AnyEvent, DynEvent, EndEvent, Event, EventRegistry, InterruptEvent};
pub use messaging::{Envelope, InMemoryQueue, MessagingError, PgmqQueue, QueueClient};
pub use publisher::{PublishError, Publisher};
