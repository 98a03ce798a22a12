//! The bounded set of requests registered with the transport.

use std::collections::HashMap;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::error::SchedulerError;
use super::queue::PendingRequest;
use crate::request::RequestOptions;
use crate::transport::{HandleId, Rejected, Transport, TransportRequest};

/// Handle allocation attempts before admission fails.
pub const MAX_HANDLE_ATTEMPTS: u32 = 3;

/// A request currently in flight.
#[derive(Debug)]
pub struct ActiveRequest {
    /// Caller-supplied identifier.
    pub id: Option<String>,
    /// Options as sent, merged over the defaults.
    pub options: RequestOptions,
    /// Caller parameters bound to the request.
    pub params: Value,
    /// When the request was admitted.
    pub admitted_at: Instant,
}

/// Admission failure, handing the request back for requeueing.
#[derive(Debug)]
pub struct AdmitError {
    /// The request that could not be admitted, options unmerged.
    pub request: PendingRequest,
    /// Why admission failed.
    pub error: SchedulerError,
}

/// Active requests keyed by transport handle.
#[derive(Debug)]
pub struct ActiveWindow {
    capacity: usize,
    entries: HashMap<HandleId, ActiveRequest>,
}

impl ActiveWindow {
    /// Creates an empty window holding at most `capacity` requests.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
        }
    }

    /// Maximum number of active requests.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Changes the capacity. Requests already active above the new capacity
    /// finish normally; no new ones are admitted until there is room.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }

    /// Number of active requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Room left before the window is full.
    #[must_use]
    pub fn free_slots(&self) -> usize {
        self.capacity.saturating_sub(self.entries.len())
    }

    /// Registers `pending` with `transport`, merging its options over
    /// `defaults`, and tracks it under the handle the transport mints.
    ///
    /// Registration is attempted up to [`MAX_HANDLE_ATTEMPTS`] times.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::HandleCreation`] together with the request,
    /// options unmerged, when every attempt fails.
    pub fn admit<T>(
        &mut self,
        pending: PendingRequest,
        defaults: &RequestOptions,
        transport: &mut T,
    ) -> Result<HandleId, Box<AdmitError>>
    where
        T: Transport + ?Sized,
    {
        let PendingRequest {
            id,
            options,
            params,
            body,
            capture_headers,
        } = pending;

        let merged = options.merged_over(defaults);
        let mut request = TransportRequest {
            options: merged.clone(),
            body,
            capture_headers,
        };

        let mut attempt = 1;
        loop {
            match transport.register(request) {
                Ok(handle) => {
                    debug!(handle = %handle, id = ?id, url = ?merged.url, attempt, "admitted");
                    self.entries.insert(
                        handle,
                        ActiveRequest {
                            id,
                            options: merged,
                            params,
                            admitted_at: Instant::now(),
                        },
                    );
                    return Ok(handle);
                }
                Err(rejected) if attempt < MAX_HANDLE_ATTEMPTS => {
                    debug!(attempt, error = %rejected.error, "handle allocation failed, retrying");
                    attempt += 1;
                    request = rejected.request;
                }
                Err(rejected) => {
                    warn!(attempts = attempt, error = %rejected.error, "handle allocation failed");
                    let Rejected { request, error } = *rejected;
                    return Err(Box::new(AdmitError {
                        request: PendingRequest {
                            id,
                            options,
                            params,
                            body: request.body,
                            capture_headers: request.capture_headers,
                        },
                        error: SchedulerError::HandleCreation {
                            attempts: attempt,
                            source: error,
                        },
                    }));
                }
            }
        }
    }

    /// Stops tracking `handle` and releases it from `transport`.
    pub fn remove<T>(&mut self, handle: HandleId, transport: &mut T) -> Option<ActiveRequest>
    where
        T: Transport + ?Sized,
    {
        let entry = self.entries.remove(&handle)?;
        transport.remove(handle);
        Some(entry)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::body::BodyCapture;
    use crate::transport::{Completion, TransportError};

    /// Transport that refuses the first `failures` registrations.
    #[derive(Default)]
    struct FlakyTransport {
        failures: u32,
        attempts: u32,
        next: u64,
        registered: Vec<TransportRequest>,
        removed: Vec<HandleId>,
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        fn register(&mut self, request: TransportRequest) -> Result<HandleId, Box<Rejected>> {
            self.attempts += 1;
            if self.failures > 0 {
                self.failures -= 1;
                return Err(Box::new(Rejected {
                    request,
                    error: TransportError::Exhausted { in_flight: 0 },
                }));
            }
            self.next += 1;
            self.registered.push(request);
            Ok(HandleId::new(self.next))
        }

        fn remove(&mut self, handle: HandleId) {
            self.removed.push(handle);
        }

        fn perform(&mut self) -> bool {
            false
        }

        async fn wait(&mut self, _timeout: Duration) -> bool {
            false
        }

        fn take_completed(&mut self) -> Vec<Completion> {
            Vec::new()
        }

        fn in_flight(&self) -> usize {
            self.registered.len()
        }
    }

    fn pending(url: &str) -> PendingRequest {
        PendingRequest {
            id: Some("x".to_string()),
            options: RequestOptions::get(url).with_header("X-Caller", "1"),
            params: Value::Null,
            body: BodyCapture::memory(),
            capture_headers: true,
        }
    }

    #[test]
    fn test_admit_merges_options_over_defaults() {
        let mut window = ActiveWindow::new(2);
        let mut transport = FlakyTransport::default();
        let defaults = RequestOptions::default()
            .with_timeout(Duration::from_secs(60))
            .with_header("X-Default", "d");

        let handle = window
            .admit(pending("https://example.com"), &defaults, &mut transport)
            .unwrap();

        assert_eq!(window.len(), 1);
        assert_eq!(window.free_slots(), 1);
        let sent = &transport.registered[0].options;
        assert_eq!(sent.timeout, Some(Duration::from_secs(60)));
        assert_eq!(sent.header("x-default"), Some("d"));
        assert_eq!(sent.header("x-caller"), Some("1"));
        assert!(transport.registered[0].capture_headers);

        let active = window.remove(handle, &mut transport).unwrap();
        assert_eq!(active.id.as_deref(), Some("x"));
        assert_eq!(transport.removed, vec![handle]);
        assert!(window.is_empty());
    }

    #[test]
    fn test_admit_retries_transient_failures() {
        let mut window = ActiveWindow::new(1);
        let mut transport = FlakyTransport {
            failures: 2,
            ..FlakyTransport::default()
        };

        window
            .admit(
                pending("https://example.com"),
                &RequestOptions::default(),
                &mut transport,
            )
            .unwrap();

        assert_eq!(transport.attempts, 3);
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_admit_gives_up_after_max_attempts() {
        let mut window = ActiveWindow::new(1);
        let mut transport = FlakyTransport {
            failures: 5,
            ..FlakyTransport::default()
        };

        let failure = window
            .admit(
                pending("https://example.com"),
                &RequestOptions::default(),
                &mut transport,
            )
            .unwrap_err();

        assert_eq!(transport.attempts, MAX_HANDLE_ATTEMPTS);
        assert!(matches!(
            failure.error,
            SchedulerError::HandleCreation { attempts: 3, .. }
        ));
        assert_eq!(failure.request.id.as_deref(), Some("x"));
        assert_eq!(failure.request.options.timeout, None);
        assert!(window.is_empty());
    }

    #[test]
    fn test_remove_unknown_handle_is_none() {
        let mut window = ActiveWindow::new(1);
        let mut transport = FlakyTransport::default();
        assert!(window.remove(HandleId::new(42), &mut transport).is_none());
        assert!(transport.removed.is_empty());
    }

    #[test]
    fn test_free_slots_saturates_after_shrink() {
        let mut window = ActiveWindow::new(2);
        let mut transport = FlakyTransport::default();
        let defaults = RequestOptions::default();
        window.admit(pending("https://a"), &defaults, &mut transport).unwrap();
        window.admit(pending("https://b"), &defaults, &mut transport).unwrap();

        window.set_capacity(1);
        assert_eq!(window.free_slots(), 0);
        assert_eq!(window.capacity(), 1);
        assert_eq!(window.len(), 2);
    }
}
