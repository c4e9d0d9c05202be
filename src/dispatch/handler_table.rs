//! # Handler Table
//!
//! Maps an event's concrete type to the handlers registered for it, in
//! registration order. The table is filled through `&mut self` during setup and
//! then shared behind an `Arc`, which makes it read-only for every dispatcher
//! and consumer that holds it.

use std::any::TypeId;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use thiserror::Error;
use tracing::debug;

use crate::events::{AnyEvent, DynEvent, Event};

/// What a handler reports back to the dispatcher.
///
/// `End` and `Interrupt` are control signals, not failures: they ask the
/// consumer to shut down gracefully or immediately. Anything else a handler
/// returns through `?` becomes a `Fault`.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("handler requested a graceful end")]
    End,

    #[error("handler requested an interrupt")]
    Interrupt,

    #[error(transparent)]
    Fault(#[from] anyhow::Error),
}

impl HandlerError {
    pub fn fault(message: impl std::fmt::Display) -> Self {
        Self::Fault(anyhow::Error::msg(message.to_string()))
    }
}

pub type HandlerResult = Result<(), HandlerError>;

type ErasedHandler = Arc<dyn Fn(DynEvent) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// One registered handler with the names used in logs
#[derive(Clone)]
pub struct RegisteredHandler {
    name: Arc<str>,
    event_type: &'static str,
    call: ErasedHandler,
}

impl std::fmt::Debug for RegisteredHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredHandler")
            .field("name", &self.name)
            .field("event_type", &self.event_type)
            .finish()
    }
}

impl RegisteredHandler {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn event_type(&self) -> &'static str {
        self.event_type
    }

    /// Start the handler. The returned future does nothing until polled.
    pub fn invoke(&self, event: DynEvent) -> BoxFuture<'static, HandlerResult> {
        (self.call)(event)
    }
}

/// Exact-type handler lookup table
#[derive(Debug, Default)]
pub struct HandlerTable {
    handlers: HashMap<TypeId, Vec<RegisteredHandler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler` for events of type `E`, named after its Rust type
    pub fn on_event<E, F, Fut>(&mut self, handler: F) -> &mut Self
    where
        E: Event,
        F: Fn(Arc<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.on_event_named(std::any::type_name::<F>(), handler)
    }

    /// Append `handler` for events of type `E` under an explicit name.
    ///
    /// Registering the same handler twice gives it two slots; nothing is
    /// deduplicated.
    pub fn on_event_named<E, F, Fut>(&mut self, name: impl Into<Arc<str>>, handler: F) -> &mut Self
    where
        E: Event,
        F: Fn(Arc<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let call: ErasedHandler = Arc::new(move |event: DynEvent| {
            match event.into_any_arc().downcast::<E>() {
                Ok(typed) => handler(typed).boxed(),
                Err(_) => async move {
                    Err::<(), _>(HandlerError::fault(format!(
                        "handler for {} received an event of another type",
                        E::TYPE_NAME
                    )))
                }
                .boxed(),
            }
        });

        let registered = RegisteredHandler {
            name: name.into(),
            event_type: E::TYPE_NAME,
            call,
        };
        debug!(
            event_type = E::TYPE_NAME,
            handler = %registered.name,
            "Registered event handler"
        );

        self.handlers
            .entry(TypeId::of::<E>())
            .or_default()
            .push(registered);
        self
    }

    /// Handlers for the event's exact runtime type, in registration order
    pub fn handlers_for(&self, event: &dyn AnyEvent) -> &[RegisteredHandler] {
        self.handlers
            .get(&event.event_type_id())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn handler_count<E: Event>(&self) -> usize {
        self.handlers.get(&TypeId::of::<E>()).map_or(0, Vec::len)
    }

    /// Total number of registrations across all event types
    pub fn len(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
