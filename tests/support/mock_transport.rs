//! Deterministic in-process transport for scheduler tests.
//!
//! Replies come from a caller-supplied responder keyed on the request
//! options. A reply may carry a delay; it completes once that much
//! (tokio) time has passed since registration, so tests running on paused
//! time see exact admission and completion instants.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use batchfetch_core::body::CapturedBody;
use batchfetch_core::transport::{Completion, Rejected, TransportOutcome, TransportRequest};
use batchfetch_core::{
    HandleId, NetworkError, NetworkErrorKind, RequestOptions, Transport, TransportError,
};
use tokio::time::Instant;

/// What the mock answers for one request.
#[derive(Debug, Clone)]
pub struct MockReply {
    status: Option<u16>,
    body: Vec<u8>,
    headers: Vec<(String, String)>,
    error: Option<NetworkError>,
    delay: Duration,
}

impl MockReply {
    /// `200` with `body`.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::status(200, body)
    }

    /// Any HTTP status with `body`.
    pub fn status(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: Some(status),
            body: body.into(),
            headers: Vec::new(),
            error: None,
            delay: Duration::ZERO,
        }
    }

    /// Network-level failure with no response.
    pub fn network(kind: NetworkErrorKind, message: &str) -> Self {
        Self {
            status: None,
            body: Vec::new(),
            headers: Vec::new(),
            error: Some(NetworkError::new(kind, message)),
            delay: Duration::ZERO,
        }
    }

    /// Completes `delay` after registration.
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Adds a response header (only visible when header capture is on).
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// One successful registration.
#[derive(Debug, Clone)]
pub struct Admission {
    pub handle: HandleId,
    pub url: Option<String>,
    pub options: RequestOptions,
    pub at: Instant,
}

struct InFlight {
    request: TransportRequest,
    reply: MockReply,
    registered_at: Instant,
    ready_at: Instant,
}

type Responder = Box<dyn Fn(&RequestOptions) -> MockReply + Send>;

pub struct MockTransport {
    responder: Responder,
    next_token: u64,
    in_flight: BTreeMap<HandleId, InFlight>,
    completed: Vec<Completion>,
    admissions: Vec<Admission>,
    removed: Vec<HandleId>,
    max_in_flight: usize,
    failing_registrations: u32,
    connection_limit: Option<usize>,
}

impl MockTransport {
    /// Transport answering every request with `responder`.
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&RequestOptions) -> MockReply + Send + 'static,
    {
        Self {
            responder: Box::new(responder),
            next_token: 0,
            in_flight: BTreeMap::new(),
            completed: Vec::new(),
            admissions: Vec::new(),
            removed: Vec::new(),
            max_in_flight: 0,
            failing_registrations: 0,
            connection_limit: None,
        }
    }

    /// Transport answering `200 "ok"` to everything, immediately.
    pub fn ok() -> Self {
        Self::new(|_| MockReply::ok("ok"))
    }

    /// Transport answering `200` with the request URL as body after `delay`.
    pub fn echo_url_after(delay: Duration) -> Self {
        Self::new(move |options| {
            MockReply::ok(options.url.clone().unwrap_or_default()).after(delay)
        })
    }

    /// Refuses the next `count` registrations.
    pub fn fail_next_registrations(&mut self, count: u32) {
        self.failing_registrations = count;
    }

    pub fn admissions(&self) -> &[Admission] {
        &self.admissions
    }

    /// Highest number of simultaneously registered handles seen.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    pub fn removed(&self) -> &[HandleId] {
        &self.removed
    }

    pub fn connection_limit(&self) -> Option<usize> {
        self.connection_limit
    }

    fn finish(&mut self, handle: HandleId, entry: InFlight, now: Instant) {
        let InFlight {
            request,
            reply,
            registered_at,
            ..
        } = entry;

        let raw_headers = (request.capture_headers && reply.status.is_some()).then(|| {
            let mut raw = format!("HTTP/1.1 {} MOCK\r\n", reply.status.unwrap_or_default());
            for (name, value) in &reply.headers {
                raw.push_str(&format!("{name}: {value}\r\n"));
            }
            raw.push_str("\r\n");
            raw.into_bytes()
        });

        self.completed.push(Completion {
            handle,
            outcome: TransportOutcome {
                status: reply.status,
                raw_headers,
                body: CapturedBody::Memory(reply.body),
                error: reply.error,
                effective_url: request.options.url.clone(),
                elapsed: now.duration_since(registered_at),
            },
        });
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn register(&mut self, request: TransportRequest) -> Result<HandleId, Box<Rejected>> {
        if self.failing_registrations > 0 {
            self.failing_registrations -= 1;
            return Err(Box::new(Rejected {
                request,
                error: TransportError::Exhausted {
                    in_flight: self.in_flight.len(),
                },
            }));
        }

        self.next_token += 1;
        let handle = HandleId::new(self.next_token);
        let now = Instant::now();
        let reply = (self.responder)(&request.options);
        self.admissions.push(Admission {
            handle,
            url: request.options.url.clone(),
            options: request.options.clone(),
            at: now,
        });
        self.in_flight.insert(
            handle,
            InFlight {
                ready_at: now + reply.delay,
                request,
                reply,
                registered_at: now,
            },
        );
        self.max_in_flight = self.max_in_flight.max(self.in_flight.len());
        Ok(handle)
    }

    fn remove(&mut self, handle: HandleId) {
        self.removed.push(handle);
    }

    fn perform(&mut self) -> bool {
        let now = Instant::now();
        let mut due: Vec<(Instant, HandleId)> = self
            .in_flight
            .iter()
            .filter(|(_, entry)| entry.ready_at <= now)
            .map(|(handle, entry)| (entry.ready_at, *handle))
            .collect();
        if due.is_empty() {
            return false;
        }
        due.sort();
        for (_, handle) in due {
            if let Some(entry) = self.in_flight.remove(&handle) {
                self.finish(handle, entry, now);
            }
        }
        true
    }

    async fn wait(&mut self, timeout: Duration) -> bool {
        let Some(earliest) = self.in_flight.values().map(|entry| entry.ready_at).min() else {
            return false;
        };
        let deadline = Instant::now() + timeout;
        if earliest <= deadline {
            tokio::time::sleep_until(earliest).await;
            true
        } else {
            tokio::time::sleep_until(deadline).await;
            false
        }
    }

    fn take_completed(&mut self) -> Vec<Completion> {
        std::mem::take(&mut self.completed)
    }

    fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn set_connection_limit(&mut self, limit: usize) {
        self.connection_limit = Some(limit);
    }
}
