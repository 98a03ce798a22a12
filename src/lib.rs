//! Batchfetch Core Library
//!
//! This library schedules arbitrary numbers of HTTP requests over a bounded
//! window of concurrent transfers, optionally throttled to a fixed number of
//! admissions per time cycle, and hands results back as a batch, one at a
//! time, or through a streaming callback.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`scheduler`] - Pending queue, active window, rate limiter, result store
//! - [`transport`] - Transport abstraction and the reqwest-backed multiplexer
//! - [`result`] - Result accessor with lazy body and header parsing
//! - [`request`] - Request options and defaults merging
//! - [`body`] - Response body destinations and chunk filters

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod body;
pub mod request;
pub mod result;
pub mod scheduler;
pub mod transport;

// Re-export commonly used types
pub use body::{BodyDestination, BodyFilter};
pub use request::{DEFAULT_REQUEST_TIMEOUT, RequestBody, RequestOptions};
pub use result::{CompletedRequest, ErrorKind, HttpResult, ResponseHeaders, ResultFactory};
pub use scheduler::{
    AsyncSummary, ConfigError, DEFAULT_MAX_CONCURRENT, EnqueueError, RateLimitConfig, RateLimiter,
    ResultKey, ResultSet, Scheduler, SchedulerConfig, SchedulerError, SchedulerState, StreamStep,
};
pub use transport::{
    HandleId, NetworkError, NetworkErrorKind, ReqwestTransport, Transport, TransportError,
};
