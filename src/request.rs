//! Request options carried by every scheduled request.
//!
//! A [`RequestOptions`] value describes one outbound HTTP request. The
//! scheduler keeps a set of default options and merges each caller-supplied
//! set over it at admission time: any field the caller sets wins, headers are
//! merged by (case-insensitive) name with the caller's value winning.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use batchfetch_core::RequestOptions;
//!
//! let defaults = RequestOptions::default().with_timeout(Duration::from_secs(60));
//! let options = RequestOptions::get("https://example.com/a").with_header("Accept", "text/plain");
//!
//! let merged = options.merged_over(&defaults);
//! assert_eq!(merged.timeout, Some(Duration::from_secs(60)));
//! assert_eq!(merged.url.as_deref(), Some("https://example.com/a"));
//! ```

use std::time::Duration;

use reqwest::Method;
use serde::Serialize;

/// Default per-request timeout applied by the scheduler (60 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Request payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RequestBody {
    /// Raw bytes sent as-is.
    Bytes(Vec<u8>),
    /// UTF-8 text sent as-is.
    Text(String),
    /// `application/x-www-form-urlencoded` fields.
    Form(Vec<(String, String)>),
    /// JSON document, sent with `content-type: application/json`.
    Json(serde_json::Value),
}

impl RequestBody {
    /// Encodes the body and returns it with the content type it implies, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if a JSON body cannot be serialized.
    pub fn encode(&self) -> Result<(Vec<u8>, Option<&'static str>), serde_json::Error> {
        match self {
            Self::Bytes(bytes) => Ok((bytes.clone(), None)),
            Self::Text(text) => Ok((text.clone().into_bytes(), None)),
            Self::Form(fields) => {
                let encoded = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(fields.iter())
                    .finish();
                Ok((
                    encoded.into_bytes(),
                    Some("application/x-www-form-urlencoded"),
                ))
            }
            Self::Json(value) => Ok((serde_json::to_vec(value)?, Some("application/json"))),
        }
    }
}

impl From<&str> for RequestBody {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RequestBody {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<serde_json::Value> for RequestBody {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

/// Options describing one HTTP request.
///
/// Every field is optional so that a partial set can be layered over the
/// scheduler defaults with [`merged_over`](Self::merged_over).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestOptions {
    /// Target URL. Relative paths are allowed when the scheduler has a base URL.
    pub url: Option<String>,
    /// HTTP method; `GET` when unset.
    #[serde(serialize_with = "serialize_method")]
    pub method: Option<Method>,
    /// Extra request headers, in insertion order.
    pub headers: Vec<(String, String)>,
    /// Request payload.
    pub body: Option<RequestBody>,
    /// Whole-request timeout.
    pub timeout: Option<Duration>,
    /// `User-Agent` override.
    pub user_agent: Option<String>,
}

#[allow(clippy::ref_option)]
fn serialize_method<S: serde::Serializer>(
    method: &Option<Method>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match method {
        Some(method) => serializer.serialize_some(method.as_str()),
        None => serializer.serialize_none(),
    }
}

impl RequestOptions {
    /// Creates options for a `GET` of `url`.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            method: Some(Method::GET),
            ..Self::default()
        }
    }

    /// Creates options for a `POST` of `body` to `url`.
    #[must_use]
    pub fn post(url: impl Into<String>, body: impl Into<RequestBody>) -> Self {
        Self {
            url: Some(url.into()),
            method: Some(Method::POST),
            body: Some(body.into()),
            ..Self::default()
        }
    }

    /// Sets the URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the method.
    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Appends a header, replacing any earlier header with the same name.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the `User-Agent` override.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Inserts or replaces a header by case-insensitive name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(slot) = self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            slot.1 = value;
        } else {
            self.headers.push((name, value));
        }
    }

    /// Returns the value of a header by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns the effective method (`GET` when unset).
    #[must_use]
    pub fn effective_method(&self) -> Method {
        self.method.clone().unwrap_or(Method::GET)
    }

    /// Layers `self` over `defaults`: fields set here win.
    #[must_use]
    pub fn merged_over(&self, defaults: &RequestOptions) -> RequestOptions {
        let mut headers = defaults.clone();
        for (name, value) in &self.headers {
            headers.set_header(name.clone(), value.clone());
        }

        RequestOptions {
            url: self.url.clone().or_else(|| defaults.url.clone()),
            method: self.method.clone().or_else(|| defaults.method.clone()),
            headers: headers.headers,
            body: self.body.clone().or_else(|| defaults.body.clone()),
            timeout: self.timeout.or(defaults.timeout),
            user_agent: self
                .user_agent
                .clone()
                .or_else(|| defaults.user_agent.clone()),
        }
    }
}
