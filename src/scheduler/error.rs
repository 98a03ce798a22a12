//! Error types for scheduling operations.

use std::io;

use thiserror::Error;

use super::config::ConfigError;
use crate::transport::TransportError;

/// Errors from [`Scheduler::add`](super::Scheduler::add).
#[derive(Debug, Error)]
pub enum EnqueueError {
    /// The body destination could not be opened; the request was not enqueued.
    #[error("failed to open response body destination: {source}")]
    Destination {
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Errors that abort a scheduling step.
///
/// Per-request network and HTTP failures are never reported here; they are
/// carried by the request's result.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The transport could not allocate a handle after bounded retries.
    /// The request stays at the head of the pending queue.
    #[error("failed to allocate a transport handle after {attempts} attempts: {source}")]
    HandleCreation {
        /// Attempts made before giving up.
        attempts: u32,
        /// The last transport failure.
        #[source]
        source: TransportError,
    },

    /// A convenience call could not enqueue its request.
    #[error(transparent)]
    Enqueue(#[from] EnqueueError),

    /// A configuration value was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_creation_display() {
        let error = SchedulerError::HandleCreation {
            attempts: 3,
            source: TransportError::Exhausted { in_flight: 2 },
        };
        let message = error.to_string();
        assert!(message.contains("3 attempts"));
        assert!(message.contains("exhausted"));
    }

    #[test]
    fn test_config_error_is_transparent() {
        let error = SchedulerError::from(ConfigError::InvalidQuota);
        assert_eq!(error.to_string(), ConfigError::InvalidQuota.to_string());
    }
}
