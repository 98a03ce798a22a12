//! reqwest-backed transport.
//!
//! Every registered request becomes a future in a [`FuturesUnordered`] set
//! sharing one pooled [`reqwest::Client`]. The futures only advance when the
//! scheduler drives the transport, so all in-flight requests are multiplexed
//! from the single controlling task.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use futures_util::{FutureExt, StreamExt};
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, redirect};
use tokio::time::Instant;
use tracing::{debug, instrument, trace, warn};
use url::Url;

use super::{
    Completion, HandleId, NetworkError, NetworkErrorKind, Rejected, Transport, TransportError,
    TransportOutcome, TransportRequest,
};
use crate::body::BodyCapture;
use crate::request::RequestOptions;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum number of redirects followed when redirects are enabled.
const MAX_REDIRECTS: usize = 10;

/// Default `User-Agent` sent when a request does not set one.
pub const DEFAULT_USER_AGENT: &str = concat!("batchfetch/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
struct ClientSettings {
    connect_timeout: Duration,
    follow_redirects: bool,
    cookie_store: bool,
    user_agent: String,
    connection_limit: Option<usize>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            follow_redirects: true,
            cookie_store: false,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connection_limit: None,
        }
    }
}

impl ClientSettings {
    fn build(&self) -> Result<Client, TransportError> {
        let policy = if self.follow_redirects {
            redirect::Policy::limited(MAX_REDIRECTS)
        } else {
            redirect::Policy::none()
        };
        let mut builder = Client::builder()
            .connect_timeout(self.connect_timeout)
            .redirect(policy)
            .gzip(true)
            .cookie_store(self.cookie_store)
            .user_agent(self.user_agent.clone());
        if let Some(limit) = self.connection_limit {
            builder = builder.pool_max_idle_per_host(limit);
        }
        builder
            .build()
            .map_err(|source| TransportError::Client { source })
    }
}

/// Builder for [`ReqwestTransport`].
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransportBuilder {
    settings: ClientSettings,
    max_handles: Option<usize>,
}

impl ReqwestTransportBuilder {
    /// Sets the connect timeout (default 30 seconds).
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.settings.connect_timeout = timeout;
        self
    }

    /// Enables or disables following redirects (default enabled, up to 10 hops).
    #[must_use]
    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.settings.follow_redirects = follow;
        self
    }

    /// Enables a shared in-memory cookie store (default disabled).
    #[must_use]
    pub fn cookie_store(mut self, enabled: bool) -> Self {
        self.settings.cookie_store = enabled;
        self
    }

    /// Sets the default `User-Agent`.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.settings.user_agent = user_agent.into();
        self
    }

    /// Caps idle pooled connections per host.
    #[must_use]
    pub fn connection_limit(mut self, limit: usize) -> Self {
        self.settings.connection_limit = Some(limit);
        self
    }

    /// Caps the number of simultaneously registered handles. Registrations
    /// beyond the cap fail with [`TransportError::Exhausted`].
    #[must_use]
    pub fn max_handles(mut self, max: usize) -> Self {
        self.max_handles = Some(max);
        self
    }

    /// Builds the transport.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Client`] if the HTTP client cannot be built.
    pub fn build(self) -> Result<ReqwestTransport, TransportError> {
        let client = self.settings.build()?;
        debug!(
            connect_timeout_ms = self.settings.connect_timeout.as_millis(),
            follow_redirects = self.settings.follow_redirects,
            max_handles = ?self.max_handles,
            "creating reqwest transport"
        );
        Ok(ReqwestTransport {
            client,
            settings: self.settings,
            max_handles: self.max_handles,
            in_flight: FuturesUnordered::new(),
            live: HashSet::new(),
            completed: Vec::new(),
            next_token: 0,
        })
    }
}

/// Transport multiplexing requests over one pooled reqwest client.
pub struct ReqwestTransport {
    client: Client,
    settings: ClientSettings,
    max_handles: Option<usize>,
    in_flight: FuturesUnordered<BoxFuture<'static, Completion>>,
    live: HashSet<HandleId>,
    completed: Vec<Completion>,
    next_token: u64,
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("settings", &self.settings)
            .field("max_handles", &self.max_handles)
            .field("in_flight", &self.in_flight.len())
            .field("live", &self.live.len())
            .field("completed", &self.completed.len())
            .finish_non_exhaustive()
    }
}

impl ReqwestTransport {
    /// Creates a transport with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Client`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self, TransportError> {
        Self::builder().build()
    }

    /// Returns a builder.
    #[must_use]
    pub fn builder() -> ReqwestTransportBuilder {
        ReqwestTransportBuilder::default()
    }

    fn accept(&mut self, completion: Completion) {
        if self.live.contains(&completion.handle) {
            self.completed.push(completion);
        } else {
            trace!(handle = %completion.handle, "dropping completion for released handle");
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    fn register(&mut self, request: TransportRequest) -> Result<HandleId, Box<Rejected>> {
        if let Some(max) = self.max_handles
            && self.live.len() >= max
        {
            return Err(Box::new(Rejected {
                request,
                error: TransportError::Exhausted {
                    in_flight: self.live.len(),
                },
            }));
        }

        self.next_token += 1;
        let handle = HandleId::new(self.next_token);
        self.live.insert(handle);
        self.in_flight
            .push(execute(self.client.clone(), handle, request).boxed());
        trace!(%handle, "registered handle");
        Ok(handle)
    }

    fn remove(&mut self, handle: HandleId) {
        self.live.remove(&handle);
    }

    fn perform(&mut self) -> bool {
        match self.in_flight.next().now_or_never() {
            Some(Some(completion)) => {
                self.accept(completion);
                true
            }
            _ => false,
        }
    }

    async fn wait(&mut self, timeout: Duration) -> bool {
        if self.in_flight.is_empty() {
            return false;
        }
        match tokio::time::timeout(timeout, self.in_flight.next()).await {
            Ok(Some(completion)) => {
                self.accept(completion);
                true
            }
            _ => false,
        }
    }

    fn take_completed(&mut self) -> Vec<Completion> {
        std::mem::take(&mut self.completed)
    }

    fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    #[instrument(skip(self))]
    fn set_connection_limit(&mut self, limit: usize) {
        let mut settings = self.settings.clone();
        settings.connection_limit = Some(limit);
        match settings.build() {
            Ok(client) => {
                self.client = client;
                self.settings = settings;
                debug!("rebuilt HTTP client with new connection limit");
            }
            Err(error) => {
                warn!(%error, "keeping previous HTTP client; rebuild failed");
            }
        }
    }
}

/// Runs one request to completion. Never fails: every problem becomes part
/// of the outcome.
async fn execute(client: Client, handle: HandleId, request: TransportRequest) -> Completion {
    let started = Instant::now();
    let TransportRequest {
        options,
        mut body,
        capture_headers,
    } = request;
    let mut outcome = TransportOutcome::default();

    match send(&client, &options).await {
        Ok(response) => {
            outcome.status = Some(response.status().as_u16());
            outcome.effective_url = Some(response.url().to_string());
            if capture_headers {
                outcome.raw_headers = Some(raw_header_block(&response));
            }
            if let Err(error) = stream_body(response, &mut body).await {
                outcome.error = Some(error);
            }
        }
        Err(error) => {
            debug!(%handle, url = ?options.url, error = %error, "request failed");
            outcome.error = Some(error);
        }
    }

    match body.finish().await {
        Ok(captured) => outcome.body = captured,
        Err(error) => {
            if outcome.error.is_none() {
                outcome.error = Some(NetworkError::new(
                    NetworkErrorKind::Write,
                    format!("failed to finish body: {error}"),
                ));
            }
        }
    }

    outcome.elapsed = started.elapsed();
    Completion { handle, outcome }
}

async fn send(client: &Client, options: &RequestOptions) -> Result<reqwest::Response, NetworkError> {
    let request = build_request(client, options)?;
    request
        .send()
        .await
        .map_err(|error| NetworkError::from_reqwest(&error))
}

fn build_request(
    client: &Client,
    options: &RequestOptions,
) -> Result<reqwest::RequestBuilder, NetworkError> {
    let Some(raw_url) = options.url.as_deref() else {
        return Err(NetworkError::new(
            NetworkErrorKind::InvalidRequest,
            "no URL set",
        ));
    };
    let url = Url::parse(raw_url).map_err(|error| {
        NetworkError::new(
            NetworkErrorKind::InvalidRequest,
            format!("malformed URL {raw_url}: {error}"),
        )
    })?;

    let mut request = client.request(options.effective_method(), url);
    for (name, value) in &options.headers {
        request = request.header(name.as_str(), value.as_str());
    }
    if let Some(user_agent) = &options.user_agent {
        request = request.header(USER_AGENT, user_agent.as_str());
    }
    if let Some(timeout) = options.timeout {
        request = request.timeout(timeout);
    }
    if let Some(body) = &options.body {
        let (bytes, content_type) = body.encode().map_err(|error| {
            NetworkError::new(
                NetworkErrorKind::InvalidRequest,
                format!("failed to encode body: {error}"),
            )
        })?;
        if let Some(content_type) = content_type
            && options.header(CONTENT_TYPE.as_str()).is_none()
        {
            request = request.header(CONTENT_TYPE, content_type);
        }
        request = request.body(bytes);
    }
    Ok(request)
}

async fn stream_body(
    response: reqwest::Response,
    body: &mut BodyCapture,
) -> Result<(), NetworkError> {
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|error| NetworkError::from_reqwest(&error))?;
        body.write(&chunk).await.map_err(|error| {
            NetworkError::new(
                NetworkErrorKind::Write,
                format!("failed to write body: {error}"),
            )
        })?;
    }
    Ok(())
}

/// Renders the response head the way it appeared on the wire: status line,
/// then one `name: value` line per header.
fn raw_header_block(response: &reqwest::Response) -> Vec<u8> {
    let mut block = format!("{:?} {}\r\n", response.version(), response.status());
    for (name, value) in response.headers() {
        block.push_str(name.as_str());
        block.push_str(": ");
        block.push_str(&String::from_utf8_lossy(value.as_bytes()));
        block.push_str("\r\n");
    }
    block.into_bytes()
}
