//! FIFO holding area for requests not yet admitted.

use std::collections::VecDeque;

use serde_json::Value;

use crate::body::BodyCapture;
use crate::request::RequestOptions;

/// A request waiting for admission.
#[derive(Debug)]
pub struct PendingRequest {
    /// Caller-supplied identifier.
    pub id: Option<String>,
    /// Caller options, not yet merged with defaults.
    pub options: RequestOptions,
    /// Caller parameters bound to the request.
    pub params: Value,
    /// Body destination, opened when the request was added.
    pub body: BodyCapture,
    /// Whether raw headers are captured for this request.
    pub capture_headers: bool,
}

/// Unbounded FIFO queue of pending requests.
#[derive(Debug, Default)]
pub struct PendingQueue {
    items: VecDeque<PendingRequest>,
}

impl PendingQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a request at the back.
    pub fn enqueue(&mut self, request: PendingRequest) {
        self.items.push_back(request);
    }

    /// Removes the oldest request.
    pub fn dequeue_oldest(&mut self) -> Option<PendingRequest> {
        self.items.pop_front()
    }

    /// Puts a request back at the head after a failed admission.
    pub fn requeue_front(&mut self, request: PendingRequest) {
        self.items.push_front(request);
    }

    /// Number of queued requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
