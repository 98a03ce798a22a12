//! Caller-facing results of completed requests.
//!
//! When a handle completes, the scheduler pairs the transport outcome with the
//! original request metadata in a [`CompletedRequest`] and hands it to the
//! configured result factory. The default factory builds an [`HttpResult`],
//! which parses headers and reads the body lazily on first access.
//!
//! # Example
//!
//! ```no_run
//! use batchfetch_core::{ErrorKind, Scheduler};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut scheduler = Scheduler::new()?;
//! if let Some(result) = scheduler.get("https://example.com/").await? {
//!     match result.error_kind() {
//!         None => println!("{}", result.body_text()?),
//!         Some(ErrorKind::Http) => println!("HTTP {}", result.error_code().unwrap_or(0)),
//!         Some(ErrorKind::Network) => println!("failed: {}", result.error_message().unwrap_or_default()),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod headers;

use std::cell::OnceCell;
use std::fmt;
use std::io::{self, Read};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::request::RequestOptions;
use crate::transport::{HandleId, TransportOutcome};

pub use headers::{ResponseHeaders, STATUS_LINE_KEY};

/// Classification of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The transport failed (connect, timeout, malformed request, ...).
    Network,
    /// A response arrived with status 400 or above.
    Http,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => f.write_str("network"),
            Self::Http => f.write_str("http"),
        }
    }
}

/// A finished request as handed to the result factory.
#[derive(Debug)]
pub struct CompletedRequest {
    /// Caller-supplied identifier, if any.
    pub id: Option<String>,
    /// Options the request was sent with (merged over scheduler defaults).
    pub options: RequestOptions,
    /// Caller-supplied parameters bound to the request.
    pub params: Value,
    /// The transport handle the request ran on (already released).
    pub handle: HandleId,
    /// What the transport observed.
    pub outcome: TransportOutcome,
}

/// Factory turning a completed request into the caller's result type.
pub type ResultFactory<R> = Box<dyn Fn(CompletedRequest) -> R + Send + Sync>;

/// Default result type with lazy accessors.
pub struct HttpResult {
    request: CompletedRequest,
    headers: OnceCell<Option<ResponseHeaders>>,
}

impl fmt::Debug for HttpResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResult")
            .field("id", &self.request.id)
            .field("url", &self.request.options.url)
            .field("status", &self.request.outcome.status)
            .field("error", &self.request.outcome.error)
            .finish_non_exhaustive()
    }
}

impl From<CompletedRequest> for HttpResult {
    fn from(request: CompletedRequest) -> Self {
        Self {
            request,
            headers: OnceCell::new(),
        }
    }
}

impl HttpResult {
    /// Caller-supplied identifier, if any.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.request.id.as_deref()
    }

    /// HTTP status, or `None` when no response arrived.
    #[must_use]
    pub fn http_status(&self) -> Option<u16> {
        self.request.outcome.status
    }

    /// Reads the whole body from its destination.
    ///
    /// # Errors
    ///
    /// Returns an IO error if a file-backed body cannot be read.
    pub fn body(&self) -> io::Result<Vec<u8>> {
        self.request.outcome.body.read_all()
    }

    /// Streams the body without reading a file-backed body into memory.
    ///
    /// # Errors
    ///
    /// Returns an IO error if a file-backed body cannot be rewound.
    pub fn body_reader(&self) -> io::Result<Box<dyn Read + Send + '_>> {
        self.request.outcome.body.reader()
    }

    /// Reads the body as (lossy) UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns an IO error if a file-backed body cannot be read.
    pub fn body_text(&self) -> io::Result<String> {
        Ok(String::from_utf8_lossy(&self.body()?).into_owned())
    }

    /// Decodes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the body cannot be read or is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        let body = self.body().map_err(serde_json::Error::io)?;
        serde_json::from_slice(&body)
    }

    /// Parsed response headers, when header capture was enabled.
    #[must_use]
    pub fn headers(&self) -> Option<&ResponseHeaders> {
        self.headers
            .get_or_init(|| {
                self.request
                    .outcome
                    .raw_headers
                    .as_deref()
                    .map(ResponseHeaders::parse)
            })
            .as_ref()
    }

    /// Convenience lookup of one header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers()?.get(name)
    }

    /// Parameters bound to the request.
    #[must_use]
    pub fn params(&self) -> &Value {
        &self.request.params
    }

    /// One named parameter, when the parameters are an object.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.request.params.get(name)
    }

    /// Options the request was sent with.
    #[must_use]
    pub fn options(&self) -> &RequestOptions {
        &self.request.options
    }

    /// Final URL after redirects, when a response arrived.
    #[must_use]
    pub fn effective_url(&self) -> Option<&str> {
        self.request.outcome.effective_url.as_deref()
    }

    /// Time from admission to completion.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.request.outcome.elapsed
    }

    /// The transport handle the request ran on.
    #[must_use]
    pub fn handle(&self) -> HandleId {
        self.request.handle
    }

    /// `Network` for transport failures, `Http` for status >= 400, else `None`.
    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        if self.request.outcome.error.is_some() {
            return Some(ErrorKind::Network);
        }
        match self.request.outcome.status {
            Some(status) if status >= 400 => Some(ErrorKind::Http),
            _ => None,
        }
    }

    /// Whether the request failed; with `Some(kind)`, whether it failed that way.
    #[must_use]
    pub fn has_error(&self, kind: Option<ErrorKind>) -> bool {
        match (self.error_kind(), kind) {
            (Some(actual), Some(wanted)) => actual == wanted,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Human-readable failure description.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        match self.error_kind()? {
            ErrorKind::Network => self
                .request
                .outcome
                .error
                .as_ref()
                .map(|error| error.message.clone()),
            ErrorKind::Http => self.http_status().map(|status| format!("http error {status}")),
        }
    }

    /// Failure code: the network error code, or the HTTP status.
    #[must_use]
    pub fn error_code(&self) -> Option<u32> {
        match self.error_kind()? {
            ErrorKind::Network => self
                .request
                .outcome
                .error
                .as_ref()
                .map(|error| error.kind.code()),
            ErrorKind::Http => self.http_status().map(u32::from),
        }
    }

    /// Dumps the result (error, headers, body, options, params) as JSON.
    #[must_use]
    pub fn summary(&self) -> Value {
        let error = self.error_kind().map(|kind| {
            json!({
                "type": kind.to_string(),
                "code": self.error_code(),
                "message": self.error_message(),
            })
        });
        let body = match self.body_text() {
            Ok(text) => Value::String(text),
            Err(error) => json!({ "unreadable": error.to_string() }),
        };
        json!({
            "id": self.id(),
            "status": self.http_status(),
            "error": error,
            "headers": self.headers().map(ResponseHeaders::to_json),
            "body": body,
            "options": serde_json::to_value(self.options()).unwrap_or(Value::Null),
            "params": self.params(),
        })
    }
}
