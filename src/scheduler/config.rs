//! Scheduler configuration and its validation.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::body::{BodyDestination, BodyFilter};
use crate::request::{DEFAULT_REQUEST_TIMEOUT, RequestOptions};

/// Default number of requests in flight at once.
pub const DEFAULT_MAX_CONCURRENT: usize = 10;

/// Minimum allowed concurrency.
pub const MIN_CONCURRENT: usize = 1;

/// Maximum allowed concurrency.
pub const MAX_CONCURRENT: usize = 1000;

/// How long one scheduling step waits for a handle to become ready.
pub const DEFAULT_READINESS_WAIT: Duration = Duration::from_millis(10);

/// Default adaptive pacing coefficient.
pub const DEFAULT_PACING_COEFFICIENT: f64 = 1.0;

/// Errors raised when configuring a scheduler.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// Concurrency outside `MIN_CONCURRENT..=MAX_CONCURRENT`.
    #[error("concurrency must be between {MIN_CONCURRENT} and {MAX_CONCURRENT}, got {value}")]
    InvalidConcurrency {
        /// The rejected value.
        value: usize,
    },

    /// Rate-limit quota of zero.
    #[error("rate limit quota must be at least 1 request per cycle")]
    InvalidQuota,

    /// Rate-limit cycle of zero length.
    #[error("rate limit cycle must be longer than zero")]
    ZeroCycle,

    /// Pacing coefficient that is negative or not finite.
    #[error("pacing coefficient must be a finite, non-negative number, got {value}")]
    InvalidPacingCoefficient {
        /// The rejected value.
        value: f64,
    },

    /// Pacing requested while no rate limit is configured.
    #[error("adaptive pacing requires a rate limit")]
    PacingWithoutRateLimit,

    /// Base URL that does not parse as an absolute URL.
    #[error("invalid base URL '{value}': {reason}")]
    InvalidBaseUrl {
        /// The rejected value.
        value: String,
        /// Parser message.
        reason: String,
    },
}

/// Per-completion pacing settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacingConfig {
    /// Whether a pause follows each completion.
    pub enabled: bool,
    /// Scales the computed pause.
    pub coefficient: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            coefficient: DEFAULT_PACING_COEFFICIENT,
        }
    }
}

/// Admission throttle: at most `quota` admissions per `cycle`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitConfig {
    /// Admissions allowed per cycle.
    pub quota: usize,
    /// Cycle length.
    pub cycle: Duration,
    /// Sleep out the rest of a spent cycle instead of deferring admissions.
    pub blocking: bool,
    /// Optional per-completion pacing.
    pub pacing: PacingConfig,
}

impl RateLimitConfig {
    /// Creates a rate limit with pacing disabled.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidQuota`] for a zero quota and
    /// [`ConfigError::ZeroCycle`] for a zero-length cycle.
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use batchfetch_core::RateLimitConfig;
    ///
    /// let limit = RateLimitConfig::new(5, Duration::from_secs(1), true).unwrap();
    /// assert_eq!(limit.quota, 5);
    /// assert!(RateLimitConfig::new(0, Duration::from_secs(1), true).is_err());
    /// ```
    pub fn new(quota: usize, cycle: Duration, blocking: bool) -> Result<Self, ConfigError> {
        let config = Self {
            quota,
            cycle,
            blocking,
            pacing: PacingConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Enables pacing with `coefficient`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPacingCoefficient`] for a negative or
    /// non-finite coefficient.
    pub fn with_pacing(mut self, coefficient: f64) -> Result<Self, ConfigError> {
        validate_coefficient(coefficient)?;
        self.pacing = PacingConfig {
            enabled: true,
            coefficient,
        };
        Ok(self)
    }

    /// Checks quota, cycle and coefficient.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.quota == 0 {
            return Err(ConfigError::InvalidQuota);
        }
        if self.cycle.is_zero() {
            return Err(ConfigError::ZeroCycle);
        }
        validate_coefficient(self.pacing.coefficient)
    }
}

pub(crate) fn validate_coefficient(value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidPacingCoefficient { value })
    }
}

pub(crate) fn validate_concurrency(value: usize) -> Result<(), ConfigError> {
    if (MIN_CONCURRENT..=MAX_CONCURRENT).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidConcurrency { value })
    }
}

/// Everything a scheduler reads while running.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Size of the active window.
    pub max_concurrent: usize,
    /// Optional admission throttle.
    pub rate_limit: Option<RateLimitConfig>,
    /// Prefix joined onto request URLs at `add` time.
    pub base_url: Option<String>,
    /// Options every request is merged over.
    pub default_options: RequestOptions,
    /// Where response bodies are buffered.
    pub body_destination: BodyDestination,
    /// Chunk filters applied to every response body.
    pub body_filters: Arc<[BodyFilter]>,
    /// Capture raw response headers.
    pub capture_headers: bool,
    /// Wait for readiness between non-blocking progress passes.
    pub wait_for_readiness: bool,
    /// Bound on one readiness wait.
    pub readiness_wait: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            rate_limit: None,
            base_url: None,
            default_options: RequestOptions::default().with_timeout(DEFAULT_REQUEST_TIMEOUT),
            body_destination: BodyDestination::Memory,
            body_filters: Arc::from(Vec::new()),
            capture_headers: false,
            wait_for_readiness: true,
            readiness_wait: DEFAULT_READINESS_WAIT,
        }
    }
}

impl SchedulerConfig {
    /// Validates every field.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_concurrency(self.max_concurrent)?;
        if let Some(limit) = &self.rate_limit {
            limit.validate()?;
        }
        if let Some(base) = &self.base_url {
            validate_base_url(base)?;
        }
        Ok(())
    }

    /// Prefixes `url` with the base URL, if one is set.
    ///
    /// The base is a plain string prefix, so it may end in a partial path or
    /// an open query (`https://host/items?id=`). Absolute URLs pass through
    /// untouched.
    #[must_use]
    pub fn resolve_url(&self, url: &str) -> String {
        match &self.base_url {
            Some(base) if !is_absolute(url) => format!("{base}{url}"),
            _ => url.to_string(),
        }
    }
}

pub(crate) fn validate_base_url(value: &str) -> Result<(), ConfigError> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|error| ConfigError::InvalidBaseUrl {
            value: value.to_string(),
            reason: error.to_string(),
        })
}

fn is_absolute(url: &str) -> bool {
    url.split_once("://").is_some_and(|(scheme, _)| {
        !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}
