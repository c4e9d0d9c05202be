//! # Messaging Error Types
//!
//! Structured errors for queue collaborator operations. Connectivity failures are
//! separated from everything else so the consumer can tell a transient outage
//! (back off and poll again) from a genuine queue fault.

use thiserror::Error;

/// Errors raised by a [`QueueClient`](super::QueueClient) implementation
#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    #[error("Queue operation failed: {queue_name}: {operation}: {message}")]
    QueueOperation {
        queue_name: String,
        operation: String,
        message: String,
    },

    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("Invalid queue name: {queue_name}: {reason}")]
    InvalidQueueName { queue_name: String, reason: String },
}

impl MessagingError {
    /// Create a database connection error
    pub fn database_connection(message: impl Into<String>) -> Self {
        Self::DatabaseConnection {
            message: message.into(),
        }
    }

    /// Create a queue operation error
    pub fn queue_operation(
        queue_name: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::QueueOperation {
            queue_name: queue_name.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a queue not found error
    pub fn queue_not_found(queue_name: impl Into<String>) -> Self {
        Self::QueueNotFound {
            queue_name: queue_name.into(),
        }
    }

    /// Create an invalid queue name error
    pub fn invalid_queue_name(queue_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidQueueName {
            queue_name: queue_name.into(),
            reason: reason.into(),
        }
    }

    /// Whether the failure is a connectivity problem that is expected to clear
    /// on its own. Nothing read under a lease is lost when this happens: the
    /// queue redelivers once the lease expires.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::DatabaseConnection { .. })
    }
}

/// Whether a sqlx error means the database could not be reached at all
pub(crate) fn is_connectivity_error(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_errors_are_transient() {
        assert!(MessagingError::database_connection("refused").is_transient());
        assert!(!MessagingError::queue_not_found("events").is_transient());
        assert!(!MessagingError::queue_operation("events", "read", "boom").is_transient());
    }

    #[test]
    fn test_connectivity_classification() {
        assert!(is_connectivity_error(&sqlx::Error::PoolTimedOut));
        assert!(is_connectivity_error(&sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused"
        ))));
        assert!(!is_connectivity_error(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn test_error_display_includes_context() {
        let err = MessagingError::queue_operation("events", "delete", "no such row");
        assert_eq!(
            err.to_string(),
            "Queue operation failed: events: delete: no such row"
        );
    }
}
