//! Transport multiplexer abstraction.
//!
//! A [`Transport`] owns the in-flight request handles. The scheduler registers
//! requests with it, asks it to make progress without blocking, optionally
//! waits a bounded time for any handle to become ready, and drains the handles
//! that completed. [`ReqwestTransport`] is the production implementation.
//!
//! The free function [`advance`] is the thin driver the scheduler runs once per
//! step.

mod driver;
mod error;
mod http;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::body::{BodyCapture, CapturedBody};
use crate::request::RequestOptions;

pub use driver::advance;
pub use error::{NetworkError, NetworkErrorKind, Rejected, TransportError};
pub use http::{ReqwestTransport, ReqwestTransportBuilder};

/// Opaque identifier of a live transport handle.
///
/// Minted by the transport; unique among live handles and never interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    /// Wraps a raw token. Transports use this to mint identifiers.
    #[must_use]
    pub const fn new(token: u64) -> Self {
        Self(token)
    }

    /// Returns the raw token.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A request ready to be registered with a transport.
#[derive(Debug)]
pub struct TransportRequest {
    /// Options already merged over the scheduler defaults.
    pub options: RequestOptions,
    /// Where the response body is written.
    pub body: BodyCapture,
    /// Whether the raw response header block should be captured.
    pub capture_headers: bool,
}

/// What a transport observed for one finished handle.
#[derive(Debug, Default)]
pub struct TransportOutcome {
    /// HTTP status, when a response was received.
    pub status: Option<u16>,
    /// Raw header block (status line, then `Name: Value` lines), when captured.
    pub raw_headers: Option<Vec<u8>>,
    /// Captured response body.
    pub body: CapturedBody,
    /// Network-level failure, if any.
    pub error: Option<NetworkError>,
    /// Final URL after redirects.
    pub effective_url: Option<String>,
    /// Time from registration to completion.
    pub elapsed: Duration,
}

/// A handle that finished since the last drain.
#[derive(Debug)]
pub struct Completion {
    /// The finished handle.
    pub handle: HandleId,
    /// What happened to it.
    pub outcome: TransportOutcome,
}

/// Engine multiplexing many concurrent requests.
///
/// All methods are called from the single controlling task; implementations
/// need no internal locking.
#[async_trait]
pub trait Transport: Send {
    /// Allocates a handle for `request` and starts it.
    ///
    /// # Errors
    ///
    /// Returns the request back together with the failure when no handle can
    /// be allocated, so the caller can retry or requeue it.
    fn register(&mut self, request: TransportRequest) -> Result<HandleId, Box<Rejected>>;

    /// Releases a handle. Unknown handles are ignored.
    fn remove(&mut self, handle: HandleId);

    /// Makes non-blocking progress. Returns `true` if anything advanced, in
    /// which case the caller should call it again.
    fn perform(&mut self) -> bool;

    /// Waits up to `timeout` for any handle to become ready. Returns `true`
    /// if one did.
    async fn wait(&mut self, timeout: Duration) -> bool;

    /// Removes and returns the handles that completed since the last call.
    fn take_completed(&mut self) -> Vec<Completion>;

    /// Number of registered, unfinished handles.
    fn in_flight(&self) -> usize;

    /// Reshapes the connection limit, if the engine supports one.
    fn set_connection_limit(&mut self, _limit: usize) {}
}
