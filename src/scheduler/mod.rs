//! Request scheduler: pending queue, active window, rate limit and results.
//!
//! A [`Scheduler`] accepts any number of requests through [`Scheduler::add`]
//! and executes them through a [`Transport`] with at most `max_concurrent`
//! in flight, optionally throttled to a fixed number of admissions per cycle.
//!
//! # Overview
//!
//! Every scheduling step ([`Scheduler::run`]) does three things:
//!
//! 1. **Fill**: admits the oldest pending requests into free window slots,
//!    capped by the rate limit allowance.
//! 2. **Drive**: advances the transport, waiting briefly for readiness
//!    unless that is disabled.
//! 3. **Drain**: turns completed handles into results through the result
//!    factory and stores them.
//!
//! Results are consumed in one of three ways: all at once ([`Scheduler::all`]),
//! one at a time ([`Scheduler::next`]), or streamed through a callback
//! ([`Scheduler::run_async`], [`Scheduler::all_async`]).
//!
//! # Example
//!
//! ```no_run
//! use batchfetch_core::{RequestOptions, Scheduler};
//! use serde_json::Value;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut scheduler = Scheduler::new()?;
//! scheduler.set_max_concurrent(20)?;
//!
//! for page in 1..=50 {
//!     let options = RequestOptions::get(format!("https://example.com/?page={page}"));
//!     scheduler.add(options, Value::Null, Some(format!("page-{page}")))?;
//! }
//!
//! let results = scheduler.all().await?;
//! println!("page 7: {:?}", results.get("page-7").and_then(|r| r.http_status()));
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod queue;
mod rate_limiter;
mod store;
mod window;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::body::{BodyCapture, BodyDestination, BodyFilter};
use crate::request::{RequestBody, RequestOptions};
use crate::result::{CompletedRequest, HttpResult, ResultFactory};
use crate::transport::{self, Completion, ReqwestTransport, Transport, TransportError};

pub use config::{
    ConfigError, DEFAULT_MAX_CONCURRENT, DEFAULT_PACING_COEFFICIENT, DEFAULT_READINESS_WAIT,
    MAX_CONCURRENT, MIN_CONCURRENT, PacingConfig, RateLimitConfig, SchedulerConfig,
};
pub use error::{EnqueueError, SchedulerError};
pub use queue::{PendingQueue, PendingRequest};
pub use rate_limiter::RateLimiter;
pub use store::{ResultKey, ResultSet, ResultStore};
pub use window::{ActiveRequest, ActiveWindow, AdmitError, MAX_HANDLE_ATTEMPTS};

/// Phase of the scheduling state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No session in progress.
    Idle,
    /// Admitting pending requests.
    Filling,
    /// Advancing the transport.
    Driving,
    /// Turning completions into results.
    Draining,
}

/// Outcome of one [`Scheduler::run_async`] step.
#[derive(Debug)]
pub enum StreamStep<R> {
    /// Work remains; nothing to hand back yet.
    Continue,
    /// A batch of delivered results: a full chunk, or the final partial one.
    Chunk(Vec<R>),
    /// Nothing pending, nothing active, no chunk left.
    Done,
}

impl<R> StreamStep<R> {
    /// Returns `true` for [`StreamStep::Done`].
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

/// What [`Scheduler::all_async`] processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AsyncSummary {
    /// Results handed to the callback.
    pub delivered: usize,
    /// Chunks released (always zero without a chunk size).
    pub chunks: usize,
}

/// Asynchronous HTTP request scheduler.
///
/// Generic over the transport `T` and the result type `R` produced by the
/// result factory. The defaults are [`ReqwestTransport`] and [`HttpResult`].
pub struct Scheduler<T = ReqwestTransport, R = HttpResult> {
    transport: T,
    config: SchedulerConfig,
    factory: ResultFactory<R>,
    queue: PendingQueue,
    window: ActiveWindow,
    limiter: Option<RateLimiter>,
    store: ResultStore<R>,
    state: SchedulerState,
    total_added: usize,
    total_completed: usize,
    drained: usize,
    session_completed: usize,
    session_started_at: Option<Instant>,
    session_finished_at: Option<Instant>,
}

impl<T, R> fmt::Debug for Scheduler<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("state", &self.state)
            .field("max_concurrent", &self.config.max_concurrent)
            .field("pending", &self.queue.len())
            .field("active", &self.window.len())
            .field("results", &self.store.len())
            .field("total_added", &self.total_added)
            .field("total_completed", &self.total_completed)
            .finish_non_exhaustive()
    }
}

impl Scheduler<ReqwestTransport, HttpResult> {
    /// Creates a scheduler over a default [`ReqwestTransport`].
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Client`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self, TransportError> {
        let transport = ReqwestTransport::builder()
            .connection_limit(DEFAULT_MAX_CONCURRENT)
            .build()?;
        Ok(Self::with_transport(transport))
    }
}

impl<T: Transport> Scheduler<T, HttpResult> {
    /// Creates a scheduler over `transport` producing [`HttpResult`]s.
    #[must_use]
    pub fn with_transport(transport: T) -> Self {
        Self::with_factory(transport, HttpResult::from)
    }
}

impl<T: Transport, R> Scheduler<T, R> {
    /// Creates a scheduler over `transport` with a custom result factory.
    #[must_use]
    pub fn with_factory<F>(transport: T, factory: F) -> Self
    where
        F: Fn(CompletedRequest) -> R + Send + Sync + 'static,
    {
        let config = SchedulerConfig::default();
        Self {
            transport,
            window: ActiveWindow::new(config.max_concurrent),
            config,
            factory: Box::new(factory),
            queue: PendingQueue::new(),
            limiter: None,
            store: ResultStore::new(),
            state: SchedulerState::Idle,
            total_added: 0,
            total_completed: 0,
            drained: 0,
            session_completed: 0,
            session_started_at: None,
            session_finished_at: None,
        }
    }

    /// Creates a scheduler from a complete configuration.
    ///
    /// # Errors
    ///
    /// Returns the first invalid configuration field.
    pub fn from_config<F>(
        mut transport: T,
        config: SchedulerConfig,
        factory: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(CompletedRequest) -> R + Send + Sync + 'static,
    {
        config.validate()?;
        transport.set_connection_limit(config.max_concurrent);
        let mut scheduler = Self::with_factory(transport, factory);
        scheduler.window.set_capacity(config.max_concurrent);
        scheduler.limiter = config.rate_limit.map(RateLimiter::new);
        scheduler.config = config;
        Ok(scheduler)
    }

    // ==================== Enqueueing ====================

    /// Enqueues one request.
    ///
    /// A relative URL is joined onto the base URL. The body destination is
    /// opened now, so a destination failure is reported here.
    ///
    /// # Errors
    ///
    /// Returns [`EnqueueError::Destination`] if the body destination cannot
    /// be opened; the request is not enqueued.
    pub fn add(
        &mut self,
        mut options: RequestOptions,
        params: Value,
        id: Option<String>,
    ) -> Result<(), EnqueueError> {
        if let Some(url) = options.url.take() {
            options.url = Some(self.config.resolve_url(&url));
        }

        let body = BodyCapture::open(
            self.config.body_destination,
            Arc::clone(&self.config.body_filters),
        )
        .map_err(|source| EnqueueError::Destination { source })?;

        debug!(id = ?id, url = ?options.url, "request enqueued");
        self.queue.enqueue(PendingRequest {
            id,
            options,
            params,
            body,
            capture_headers: self.config.capture_headers,
        });
        self.total_added += 1;
        Ok(())
    }

    /// Enqueues a `GET` of `url` and waits for the next result.
    ///
    /// # Errors
    ///
    /// Returns an error if enqueueing fails or a scheduling step fails.
    pub async fn get(&mut self, url: impl Into<String>) -> Result<Option<R>, SchedulerError> {
        self.add(RequestOptions::get(url), Value::Null, None)?;
        self.next().await
    }

    /// Enqueues a `GET` of every URL and waits for all results, keyed by
    /// each URL's position in `urls` (`"0"`, `"1"`, ...).
    ///
    /// # Errors
    ///
    /// Returns an error if enqueueing fails or a scheduling step fails.
    pub async fn get_all<I, S>(&mut self, urls: I) -> Result<ResultSet<R>, SchedulerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for (position, url) in urls.into_iter().enumerate() {
            self.add(
                RequestOptions::get(url),
                Value::Null,
                Some(position.to_string()),
            )?;
        }
        self.all().await
    }

    /// Enqueues a `POST` of `body` to `url` and waits for the next result.
    ///
    /// # Errors
    ///
    /// Returns an error if enqueueing fails or a scheduling step fails.
    pub async fn post(
        &mut self,
        url: impl Into<String>,
        body: impl Into<RequestBody>,
    ) -> Result<Option<R>, SchedulerError> {
        self.add(RequestOptions::post(url, body), Value::Null, None)?;
        self.next().await
    }

    /// Enqueues a `POST` of `body` to every URL and waits for all results,
    /// keyed by position like [`get_all`](Self::get_all).
    ///
    /// # Errors
    ///
    /// Returns an error if enqueueing fails or a scheduling step fails.
    pub async fn post_all<I, S>(
        &mut self,
        urls: I,
        body: impl Into<RequestBody>,
    ) -> Result<ResultSet<R>, SchedulerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let body = body.into();
        for (position, url) in urls.into_iter().enumerate() {
            self.add(
                RequestOptions::post(url, body.clone()),
                Value::Null,
                Some(position.to_string()),
            )?;
        }
        self.all().await
    }

    // ==================== Scheduling ====================

    /// Performs one fill, drive and drain cycle.
    ///
    /// Returns `true` while requests are still pending or active.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::HandleCreation`] if the transport cannot
    /// allocate a handle; the request stays queued.
    pub async fn run(&mut self) -> Result<bool, SchedulerError> {
        if !self.has_work() {
            self.finish_session();
            return Ok(false);
        }
        self.begin_session();

        self.refill().await?;

        self.state = SchedulerState::Driving;
        let readiness_wait = self
            .config
            .wait_for_readiness
            .then_some(self.config.readiness_wait);
        let completions = transport::advance(&mut self.transport, readiness_wait).await;

        self.state = SchedulerState::Draining;
        self.drain(completions).await;

        if self.has_work() {
            self.state = SchedulerState::Filling;
            Ok(true)
        } else {
            self.finish_session();
            Ok(false)
        }
    }

    /// Runs until nothing is pending or active, then returns and clears
    /// every stored result.
    ///
    /// # Errors
    ///
    /// Returns the first scheduling error; results gathered so far stay stored.
    #[instrument(level = "debug", skip(self), fields(pending = self.queue.len()))]
    pub async fn all(&mut self) -> Result<ResultSet<R>, SchedulerError> {
        while self.run().await? {
            self.await_admission().await;
        }
        let results = self.store.take_all();
        self.drained += results.len();
        debug!(results = results.len(), "all results collected");
        Ok(results)
    }

    /// Runs until a result is available or all work is done, then removes
    /// and returns the oldest stored result.
    ///
    /// # Errors
    ///
    /// Returns the first scheduling error.
    #[instrument(level = "debug", skip(self))]
    pub async fn next(&mut self) -> Result<Option<R>, SchedulerError> {
        while self.store.is_empty() && self.run().await? {
            self.await_admission().await;
        }
        let next = self.store.pop_front().map(|(_, result)| result);
        if next.is_some() {
            self.drained += 1;
        }
        Ok(next)
    }

    /// Performs one scheduling step and hands every newly stored result to
    /// `callback` exactly once.
    ///
    /// Without `chunk_size`, delivered results are dropped immediately. With
    /// it, they are kept and released as a [`StreamStep::Chunk`] of exactly
    /// `chunk_size` once that many have accumulated; whatever is left when
    /// the work runs out comes back as a final, smaller chunk.
    ///
    /// # Errors
    ///
    /// Returns the first scheduling error.
    pub async fn run_async<F>(
        &mut self,
        mut callback: F,
        chunk_size: Option<usize>,
    ) -> Result<StreamStep<R>, SchedulerError>
    where
        F: FnMut(&R),
    {
        let more = self.run().await?;
        self.store.deliver_pending(&mut callback);

        match chunk_size.map(|size| size.max(1)) {
            None => {
                self.drained += self.store.discard_delivered();
            }
            Some(size) => {
                if self.store.delivered_count() >= size {
                    return Ok(StreamStep::Chunk(self.take_chunk(size)));
                }
                if !more && self.store.delivered_count() > 0 {
                    return Ok(StreamStep::Chunk(self.take_chunk(size)));
                }
            }
        }

        Ok(if more {
            StreamStep::Continue
        } else {
            StreamStep::Done
        })
    }

    /// Loops [`run_async`](Self::run_async) until [`StreamStep::Done`].
    ///
    /// Chunks are released and dropped as they fill, keeping memory bounded.
    ///
    /// # Errors
    ///
    /// Returns the first scheduling error.
    #[instrument(level = "debug", skip_all, fields(pending = self.queue.len(), chunk_size = ?chunk_size))]
    pub async fn all_async<F>(
        &mut self,
        mut callback: F,
        chunk_size: Option<usize>,
    ) -> Result<AsyncSummary, SchedulerError>
    where
        F: FnMut(&R),
    {
        let mut summary = AsyncSummary::default();
        loop {
            let step = self
                .run_async(
                    |result: &R| {
                        summary.delivered += 1;
                        callback(result);
                    },
                    chunk_size,
                )
                .await?;
            match step {
                StreamStep::Continue => {}
                StreamStep::Chunk(chunk) => {
                    summary.chunks += 1;
                    debug!(size = chunk.len(), "chunk released");
                }
                StreamStep::Done => break,
            }
            self.await_admission().await;
        }
        Ok(summary)
    }

    /// Returns `true` if any result is stored.
    #[must_use]
    pub fn has(&self) -> bool {
        !self.store.is_empty()
    }

    /// Drops every stored result. Pending and active requests are untouched.
    pub fn clear(&mut self) {
        let dropped = self.store.clear();
        self.drained += dropped;
        if dropped > 0 {
            debug!(dropped, "results cleared");
        }
    }

    fn has_work(&self) -> bool {
        !self.queue.is_empty() || !self.window.is_empty()
    }

    fn begin_session(&mut self) {
        if self.state != SchedulerState::Idle {
            return;
        }
        self.session_started_at = Some(Instant::now());
        self.session_finished_at = None;
        self.session_completed = 0;
        if let Some(limiter) = &mut self.limiter {
            limiter.reset();
        }
        self.state = SchedulerState::Filling;
        info!(
            pending = self.queue.len(),
            max_concurrent = self.config.max_concurrent,
            rate_limited = self.limiter.is_some(),
            "scheduling session started"
        );
    }

    fn finish_session(&mut self) {
        if self.state == SchedulerState::Idle {
            return;
        }
        self.state = SchedulerState::Idle;
        self.session_finished_at = Some(Instant::now());
        info!(
            completed = self.session_completed,
            elapsed_ms = self.session_elapsed().unwrap_or_default().as_millis(),
            "scheduling session finished"
        );
    }

    async fn refill(&mut self) -> Result<usize, SchedulerError> {
        self.state = SchedulerState::Filling;

        let mut count = self.queue.len().min(self.window.free_slots());
        if count == 0 {
            return Ok(0);
        }
        if let Some(limiter) = &mut self.limiter {
            count = count.min(limiter.admission_allowance().await);
        }

        let mut admitted = 0;
        let mut failure = None;
        while admitted < count {
            let Some(pending) = self.queue.dequeue_oldest() else {
                break;
            };
            match self
                .window
                .admit(pending, &self.config.default_options, &mut self.transport)
            {
                Ok(_) => admitted += 1,
                Err(rejected) => {
                    let AdmitError { request, error } = *rejected;
                    self.queue.requeue_front(request);
                    failure = Some(error);
                    break;
                }
            }
        }

        if let Some(limiter) = &mut self.limiter {
            limiter.record_admissions(admitted);
        }
        if admitted > 0 {
            debug!(
                admitted,
                pending = self.queue.len(),
                active = self.window.len(),
                "window refilled"
            );
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(admitted),
        }
    }

    async fn drain(&mut self, completions: Vec<Completion>) {
        for Completion { handle, outcome } in completions {
            let Some(active) = self.window.remove(handle, &mut self.transport) else {
                warn!(handle = %handle, "completion for unknown handle ignored");
                continue;
            };

            debug!(
                handle = %handle,
                id = ?active.id,
                status = ?outcome.status,
                error = ?outcome.error.as_ref().map(|error| error.kind),
                elapsed_ms = active.admitted_at.elapsed().as_millis(),
                "request completed"
            );

            let id = active.id.clone();
            let result = (self.factory)(CompletedRequest {
                id: active.id,
                options: active.options,
                params: active.params,
                handle,
                outcome,
            });
            if self.store.insert(id.clone(), result).is_some() {
                warn!(id = ?id, "duplicate result id, earlier result replaced");
                self.drained += 1;
            }
            self.total_completed += 1;
            self.session_completed += 1;

            if let Some(limiter) = &mut self.limiter {
                limiter.pace_after_completion().await;
            }
        }
    }

    /// Sleeps out a spent non-blocking rate limit cycle when requests are
    /// pending and nothing is in flight. Single steps never sleep here.
    async fn await_admission(&mut self) {
        if self.queue.is_empty() || !self.window.is_empty() {
            return;
        }
        if let Some(wait) = self.limiter.as_ref().and_then(RateLimiter::deferral) {
            debug!(
                wait_ms = wait.as_millis(),
                pending = self.queue.len(),
                "quota spent with nothing in flight, sleeping until next cycle"
            );
            tokio::time::sleep(wait).await;
        }
    }

    fn take_chunk(&mut self, size: usize) -> Vec<R> {
        let chunk = self.store.take_delivered(size);
        self.drained += chunk.len();
        chunk
    }

    // ==================== Configuration ====================

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Sets how many requests may be in flight at once and reshapes the
    /// transport's connection limit to match.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidConcurrency`] outside
    /// `MIN_CONCURRENT..=MAX_CONCURRENT`.
    pub fn set_max_concurrent(&mut self, max: usize) -> Result<(), ConfigError> {
        config::validate_concurrency(max)?;
        self.config.max_concurrent = max;
        self.window.set_capacity(max);
        self.transport.set_connection_limit(max);
        Ok(())
    }

    /// Throttles admissions to `limit`.
    ///
    /// Replacing an existing limit keeps its open cycle, so admissions
    /// already made in it count against the new quota.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field of `limit`.
    pub fn set_rate_limit(&mut self, limit: RateLimitConfig) -> Result<(), ConfigError> {
        limit.validate()?;
        self.config.rate_limit = Some(limit);
        if let Some(limiter) = &mut self.limiter {
            limiter.reconfigure(limit);
        } else {
            self.limiter = Some(RateLimiter::new(limit));
        }
        Ok(())
    }

    /// Removes the rate limit.
    pub fn clear_rate_limit(&mut self) {
        self.config.rate_limit = None;
        self.limiter = None;
    }

    /// Enables the per-completion pacing pause. `None` uses the default
    /// coefficient.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::PacingWithoutRateLimit`] when no rate limit is
    /// set, or [`ConfigError::InvalidPacingCoefficient`].
    pub fn enable_adaptive_pacing(&mut self, coefficient: Option<f64>) -> Result<(), ConfigError> {
        let coefficient = coefficient.unwrap_or(DEFAULT_PACING_COEFFICIENT);
        config::validate_coefficient(coefficient)?;
        self.set_pacing(PacingConfig {
            enabled: true,
            coefficient,
        })
    }

    /// Disables the per-completion pacing pause.
    pub fn disable_adaptive_pacing(&mut self) {
        let coefficient = self
            .config
            .rate_limit
            .map_or(DEFAULT_PACING_COEFFICIENT, |limit| limit.pacing.coefficient);
        // Only fails without a rate limit, in which case pacing is already off.
        let _ = self.set_pacing(PacingConfig {
            enabled: false,
            coefficient,
        });
    }

    fn set_pacing(&mut self, pacing: PacingConfig) -> Result<(), ConfigError> {
        let Some(limit) = self.config.rate_limit.as_mut() else {
            return Err(ConfigError::PacingWithoutRateLimit);
        };
        limit.pacing = pacing;
        if let Some(limiter) = &mut self.limiter {
            limiter.set_pacing(pacing);
        }
        Ok(())
    }

    /// Sets the string prepended to relative request URLs at `add` time.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] if `base_url` is not an
    /// absolute URL.
    pub fn set_base_url(&mut self, base_url: impl Into<String>) -> Result<(), ConfigError> {
        let base_url = base_url.into();
        config::validate_base_url(&base_url)?;
        self.config.base_url = Some(base_url);
        Ok(())
    }

    /// Removes the base URL.
    pub fn clear_base_url(&mut self) {
        self.config.base_url = None;
    }

    /// Selects where response bodies of subsequently added requests go.
    pub fn set_body_destination(&mut self, destination: BodyDestination) {
        self.config.body_destination = destination;
    }

    /// Sets the filters applied to response bodies of subsequently added
    /// requests.
    pub fn set_body_filters(&mut self, filters: Vec<BodyFilter>) {
        self.config.body_filters = Arc::from(filters);
    }

    /// Enables raw header capture for subsequently added requests.
    pub fn enable_headers(&mut self, enable: bool) {
        self.config.capture_headers = enable;
    }

    /// Replaces the result factory.
    pub fn set_result_factory<F>(&mut self, factory: F)
    where
        F: Fn(CompletedRequest) -> R + Send + Sync + 'static,
    {
        self.factory = Box::new(factory);
    }

    /// Enables or disables the bounded readiness wait in each step.
    pub fn set_wait_for_readiness(&mut self, wait: bool) {
        self.config.wait_for_readiness = wait;
    }

    /// Sets the bound on one readiness wait.
    pub fn set_readiness_wait(&mut self, wait: Duration) {
        self.config.readiness_wait = wait;
    }

    /// Replaces the options every request is merged over.
    pub fn set_default_options(&mut self, options: RequestOptions) {
        self.config.default_options = options;
    }

    /// Mutable access to the default options.
    pub fn default_options_mut(&mut self) -> &mut RequestOptions {
        &mut self.config.default_options
    }

    // ==================== Accessors ====================

    /// Requests waiting for admission.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Requests in flight.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.window.len()
    }

    /// Results stored and not yet handed over.
    #[must_use]
    pub fn results_available(&self) -> usize {
        self.store.len()
    }

    /// Results handed over, discarded or replaced so far.
    #[must_use]
    pub fn drained_count(&self) -> usize {
        self.drained
    }

    /// Requests completed over the scheduler's lifetime.
    #[must_use]
    pub fn total_completed(&self) -> usize {
        self.total_completed
    }

    /// Requests ever added.
    #[must_use]
    pub fn total_added(&self) -> usize {
        self.total_added
    }

    /// Current phase of the state machine.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Start of the current (or last) session.
    #[must_use]
    pub fn session_started_at(&self) -> Option<Instant> {
        self.session_started_at
    }

    /// Length of the current session so far, or of the last one.
    #[must_use]
    pub fn session_elapsed(&self) -> Option<Duration> {
        let start = self.session_started_at?;
        Some(
            self.session_finished_at
                .map_or_else(|| start.elapsed(), |end| end.duration_since(start)),
        )
    }

    /// Completions per second over the current (or last) session.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn requests_per_second(&self) -> f64 {
        match self.session_elapsed() {
            Some(elapsed) if !elapsed.is_zero() => {
                self.session_completed as f64 / elapsed.as_secs_f64()
            }
            _ => 0.0,
        }
    }

    /// The transport.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
