//! # Event Type Registry
//!
//! Maps stable wire names to constructors. Populated explicitly during setup
//! and shared read-only afterwards.
//!
//! Duplicate names are rejected: the first registration wins and every later
//! attempt returns [`RegistryError::DuplicateType`]. The shutdown sentinels
//! [`EndEvent`] and [`InterruptEvent`] are bound in every new registry.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::Error as _;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use super::{DynEvent, EndEvent, Event, InterruptEvent};

/// Builds a runtime event from its wire fields (the payload minus `_type`)
pub type EventFactory =
    Arc<dyn Fn(Map<String, Value>) -> Result<DynEvent, serde_json::Error> + Send + Sync>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Duplicate event type registration: {type_name}")]
    DuplicateType { type_name: String },

    #[error("Unknown event type: {type_name}")]
    UnknownEventType { type_name: String },
}

/// Name to constructor table
pub struct EventRegistry {
    factories: HashMap<String, EventFactory>,
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("EventRegistry")
            .field("types", &names)
            .finish()
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRegistry {
    /// Registry holding only the shutdown sentinels
    pub fn new() -> Self {
        let mut factories = HashMap::new();
        factories.insert(EndEvent::TYPE_NAME.to_string(), typed_factory::<EndEvent>());
        factories.insert(
            InterruptEvent::TYPE_NAME.to_string(),
            typed_factory::<InterruptEvent>(),
        );
        Self { factories }
    }

    /// Register `E` under [`Event::TYPE_NAME`]
    pub fn register<E: Event>(&mut self) -> Result<&mut Self, RegistryError> {
        self.register_factory(E::TYPE_NAME, typed_factory::<E>())
    }

    /// Bind `name` to an arbitrary constructor
    pub fn register_factory(
        &mut self,
        name: impl Into<String>,
        factory: EventFactory,
    ) -> Result<&mut Self, RegistryError> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(RegistryError::DuplicateType { type_name: name });
        }

        debug!(event_type = %name, "Registered event type");
        self.factories.insert(name, factory);
        Ok(self)
    }

    pub fn resolve(&self, name: &str) -> Result<&EventFactory, RegistryError> {
        self.factories
            .get(name)
            .ok_or_else(|| RegistryError::UnknownEventType {
                type_name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

fn typed_factory<E: Event>() -> EventFactory {
    Arc::new(|fields: Map<String, Value>| -> Result<DynEvent, serde_json::Error> {
        let payload = Value::Object(fields);
        let event = E::deserialize(&payload)?;
        reject_unknown_fields(&event, &payload)?;
        Ok(Arc::new(event) as DynEvent)
    })
}

/// Every wire key must be a field of `E`. Serde would otherwise drop extra
/// keys and the envelope would be consumed with data missing.
fn reject_unknown_fields<E: Event>(event: &E, payload: &Value) -> Result<(), serde_json::Error> {
    let (Value::Object(known), Value::Object(fields)) = (serde_json::to_value(event)?, payload)
    else {
        return Ok(());
    };

    let unknown: Vec<&str> = fields
        .keys()
        .filter(|key| !known.contains_key(key.as_str()))
        .map(String::as_str)
        .collect();
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(serde_json::Error::custom(format!(
            "unknown field(s) for {}: {}",
            E::TYPE_NAME,
            unknown.join(", ")
        )))
    }
}
