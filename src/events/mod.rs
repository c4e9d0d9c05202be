//! # Events
//!
//! Typed events and their type-erased runtime form.
//!
//! An event is any serde-serializable struct implementing [`Event`]. On the
//! wire it is identified by [`Event::TYPE_NAME`]; at runtime it travels through
//! the dispatcher as a [`DynEvent`] and is matched to handlers by its exact
//! concrete type.
//!
//! ```rust
//! use pgmq_events::events::Event;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
//! struct UserRegistered {
//!     email: String,
//! }
//!
//! impl Event for UserRegistered {
//!     const TYPE_NAME: &'static str = "UserRegistered";
//! }
//! ```

pub mod codec;
pub mod registry;

pub use codec::{decode, encode, TYPE_KEY};
pub use registry::{EventFactory, EventRegistry};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::fmt::Debug;
use std::sync::Arc;

/// A typed, immutable record that can be published to a queue
pub trait Event: Serialize + DeserializeOwned + Debug + Send + Sync + 'static {
    /// Stable name written under the `_type` key
    const TYPE_NAME: &'static str;
}

/// Object-safe view of an [`Event`]
pub trait AnyEvent: Any + Debug + Send + Sync {
    /// Registered wire name of the concrete type
    fn type_name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<E: Event> AnyEvent for E {
    fn type_name(&self) -> &'static str {
        E::TYPE_NAME
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl dyn AnyEvent {
    /// `TypeId` of the concrete event, used for exact-type handler lookup
    pub fn event_type_id(&self) -> TypeId {
        Any::type_id(self.as_any())
    }

    pub fn is<E: Event>(&self) -> bool {
        self.as_any().is::<E>()
    }

    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        self.as_any().downcast_ref::<E>()
    }

    /// Whether this is one of the reserved shutdown sentinels
    pub fn is_control(&self) -> bool {
        self.is::<EndEvent>() || self.is::<InterruptEvent>()
    }
}

/// Shared, type-erased event as it flows through dispatch
pub type DynEvent = Arc<dyn AnyEvent>;

/// Sentinel asking a consumer to stop reading and finish what it has started
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndEvent {
    /// Seconds the publisher allows for the drain; informational
    #[serde(default)]
    pub timeout: Option<f64>,
}

impl EndEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: f64) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

impl Event for EndEvent {
    const TYPE_NAME: &'static str = "EndEvent";
}

/// Sentinel asking a consumer to stop reading immediately and report an interrupt
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterruptEvent {}

impl InterruptEvent {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Event for InterruptEvent {
    const TYPE_NAME: &'static str = "InterruptEvent";
}
