//! Crate-level error umbrella.
//!
//! Each layer has its own error type; `EventsError` lets applications that
//! wire several layers together use a single `?`.

use thiserror::Error;

use crate::config::ConfigurationError;
use crate::consumer::ConsumerError;
use crate::events::codec::CodecError;
use crate::events::registry::RegistryError;
use crate::messaging::MessagingError;
use crate::publisher::PublishError;

#[derive(Error, Debug)]
pub enum EventsError {
    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Consumer error: {0}")]
    Consumer(#[from] ConsumerError),
}

impl EventsError {
    /// Whether retrying the same call later may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Messaging(err) | Self::Publish(PublishError::Messaging(err)) => err.is_transient(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, EventsError>;
