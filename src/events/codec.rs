//! # Envelope Codec
//!
//! Wire format: a flat JSON object whose `_type` key holds the registered
//! type name; every other key is one of the event's own fields.
//!
//! ```json
//! {"_type": "OrderPlaced", "order_id": 42, "customer": "ada"}
//! ```

use serde_json::{Map, Value};
use thiserror::Error;

use super::registry::{EventRegistry, RegistryError};
use super::{DynEvent, Event};

/// Reserved payload key carrying the event type name
pub const TYPE_KEY: &str = "_type";

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Payload is not a JSON object (found {found})")]
    NotAnObject { found: &'static str },

    #[error("Payload has no string `_type` key")]
    MissingTypeKey,

    #[error("Event field `_type` collides with the reserved type key in {type_name}")]
    ReservedField { type_name: &'static str },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Invalid fields for {type_name}: {source}")]
    Fields {
        type_name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Flatten a typed event into its wire payload
pub fn encode<E: Event>(event: &E) -> Result<Value, CodecError> {
    let mut fields = match serde_json::to_value(event)? {
        Value::Object(fields) => fields,
        other => {
            return Err(CodecError::NotAnObject {
                found: json_kind(&other),
            })
        }
    };

    if fields.contains_key(TYPE_KEY) {
        return Err(CodecError::ReservedField {
            type_name: E::TYPE_NAME,
        });
    }

    fields.insert(TYPE_KEY.to_string(), Value::String(E::TYPE_NAME.to_string()));
    Ok(Value::Object(fields))
}

/// Rebuild a runtime event from a wire payload
pub fn decode(registry: &EventRegistry, payload: &Value) -> Result<DynEvent, CodecError> {
    let Value::Object(object) = payload else {
        return Err(CodecError::NotAnObject {
            found: json_kind(payload),
        });
    };

    let mut fields: Map<String, Value> = object.clone();
    let type_name = match fields.remove(TYPE_KEY) {
        Some(Value::String(name)) => name,
        _ => return Err(CodecError::MissingTypeKey),
    };

    let factory = registry.resolve(&type_name)?;
    factory(fields).map_err(|source| CodecError::Fields { type_name, source })
}
