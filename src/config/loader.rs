//! Configuration Loader
//!
//! Layers defaults, an optional YAML/TOML/JSON file and `PGMQ_EVENTS__*`
//! environment variables (in that order of precedence, lowest first) into an
//! [`EventsConfig`], then validates the result.

use std::env;
use std::path::Path;

use ::config::{Config, Environment, File};
use tracing::debug;

use super::{ConfigResult, EventsConfig};

/// Prefix for environment overrides, e.g. `PGMQ_EVENTS__CONSUMER__BATCH_SIZE=50`
pub const ENV_PREFIX: &str = "PGMQ_EVENTS";

const ENV_SEPARATOR: &str = "__";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from an optional file plus the process environment
    pub fn load(path: Option<&Path>) -> ConfigResult<EventsConfig> {
        Self::load_from_sources(path, Self::environment_source())
    }

    /// Load from explicit sources. Tests pass an [`Environment`] built over a
    /// fixed map so they never touch process-wide variables.
    pub fn load_from_sources(
        path: Option<&Path>,
        environment: Environment,
    ) -> ConfigResult<EventsConfig> {
        let mut builder = Config::builder().add_source(Config::try_from(&EventsConfig::default())?);

        if let Some(path) = path {
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path).required(false));
        }

        let config: EventsConfig = builder
            .add_source(environment)
            .build()?
            .try_deserialize()?;

        config.validate()?;
        debug!(
            queue_name = %config.consumer.queue_name,
            batch_size = config.consumer.batch_size,
            handler_timeout_ms = config.consumer.handler_timeout_ms,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Environment source with the crate prefix and nested-key separator
    pub fn environment_source() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
    }

    /// Deployment environment name, used to pick the log level
    pub fn detect_environment() -> String {
        env::var("PGMQ_EVENTS_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }
}
