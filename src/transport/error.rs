//! Error types for the transport layer.

use std::fmt;

use thiserror::Error;

use super::TransportRequest;

/// Failures of the transport engine itself (not of individual requests).
#[derive(Debug, Error)]
pub enum TransportError {
    /// No more handles can be allocated right now.
    #[error("transport handle pool exhausted ({in_flight} in flight)")]
    Exhausted {
        /// Handles in flight when allocation failed.
        in_flight: usize,
    },

    /// The underlying HTTP client could not be built.
    #[error("failed to build HTTP client: {source}")]
    Client {
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
}

/// A registration the transport refused, handing the request back.
#[derive(Debug)]
pub struct Rejected {
    /// The request that could not be registered.
    pub request: TransportRequest,
    /// Why it was refused.
    pub error: TransportError,
}

/// Classification of a per-request network failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    /// The request could not be built (missing or malformed URL, bad header).
    InvalidRequest,
    /// Connection could not be established (DNS, refused, TLS).
    Connect,
    /// The request timed out.
    Timeout,
    /// Redirect policy violated.
    Redirect,
    /// The response body could not be received or decoded.
    Body,
    /// The response body could not be written to its destination.
    Write,
    /// Anything else.
    Other,
}

impl NetworkErrorKind {
    /// Stable numeric code reported as a result's error code.
    #[must_use]
    pub fn code(self) -> u32 {
        match self {
            Self::InvalidRequest => 3,
            Self::Connect => 7,
            Self::Write => 23,
            Self::Timeout => 28,
            Self::Redirect => 47,
            Self::Body => 56,
            Self::Other => 1000,
        }
    }

    /// Classifies a reqwest error.
    #[must_use]
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_connect() {
            Self::Connect
        } else if error.is_redirect() {
            Self::Redirect
        } else if error.is_body() || error.is_decode() {
            Self::Body
        } else if error.is_builder() {
            Self::InvalidRequest
        } else {
            Self::Other
        }
    }
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::InvalidRequest => "invalid_request",
            Self::Connect => "connect",
            Self::Timeout => "timeout",
            Self::Redirect => "redirect",
            Self::Body => "body",
            Self::Write => "write",
            Self::Other => "other",
        };
        write!(f, "{label}")
    }
}

/// A per-request network failure, reported through the result, never thrown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkError {
    /// Failure class.
    pub kind: NetworkErrorKind,
    /// Human-readable message; never empty.
    pub message: String,
}

impl NetworkError {
    /// Creates a network error, substituting the kind label for an empty message.
    pub fn new(kind: NetworkErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            format!("{kind} error")
        } else {
            message
        };
        Self { kind, message }
    }

    /// Builds a network error from a reqwest error, including its source chain.
    #[must_use]
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        let mut message = error.to_string();
        let mut source = std::error::Error::source(error);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self::new(NetworkErrorKind::from_reqwest(error), message)
    }
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_error_empty_message_gets_label() {
        let error = NetworkError::new(NetworkErrorKind::Connect, "  ");
        assert_eq!(error.message, "connect error");
    }

    #[test]
    fn test_network_error_kind_codes_are_distinct() {
        let kinds = [
            NetworkErrorKind::InvalidRequest,
            NetworkErrorKind::Connect,
            NetworkErrorKind::Timeout,
            NetworkErrorKind::Redirect,
            NetworkErrorKind::Body,
            NetworkErrorKind::Write,
            NetworkErrorKind::Other,
        ];
        let mut codes: Vec<u32> = kinds.iter().map(|kind| kind.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
    }

    #[test]
    fn test_transport_error_display() {
        let error = TransportError::Exhausted { in_flight: 4 };
        assert!(error.to_string().contains("exhausted"));
        assert!(error.to_string().contains('4'));
    }
}
