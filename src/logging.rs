//! # Structured Logging Module
//!
//! Environment-aware tracing setup for publishers and consumers. Console
//! output by default, JSON lines when `PGMQ_EVENTS_LOG_FORMAT=json`. An
//! explicit `RUST_LOG` always wins over the environment's default level.

use std::sync::OnceLock;

use chrono::Utc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::ConfigLoader;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// Safe to call more than once and safe to call when the host application
/// already installed a global subscriber.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = ConfigLoader::detect_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(log_level(&environment)));
        let json = log_format_is_json();

        let layer = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(true)
                .with_filter(filter)
                .boxed()
        };

        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            json,
            "Structured logging initialized"
        );
    });
}

fn log_format_is_json() -> bool {
    std::env::var("PGMQ_EVENTS_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

fn log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Log one queue-level operation with a timestamp
pub fn log_queue_operation(operation: &str, queue_name: &str, count: usize, status: &str) {
    tracing::info!(
        operation = %operation,
        queue_name = %queue_name,
        count,
        status = %status,
        timestamp = %Utc::now().to_rfc3339(),
        "Queue operation"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_by_environment() {
        assert_eq!(log_level("production"), "info");
        assert_eq!(log_level("test"), "debug");
        assert_eq!(log_level("development"), "debug");
        assert_eq!(log_level("staging"), "debug");
    }

    #[test]
    fn test_init_is_idempotent() {
        init_structured_logging();
        init_structured_logging();
        log_queue_operation("purge", "events", 0, "ok");
    }
}
