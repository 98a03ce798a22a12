//! Per-cycle admission throttling.
//!
//! The [`RateLimiter`] bounds how many requests are admitted during each fixed
//! cycle, independent of how many may be in flight at once. A scheduler
//! asks it for an allowance before every refill and reports how many requests
//! it actually admitted.
//!
//! # Overview
//!
//! * The first allowance request opens a cycle.
//! * A cycle that has run its full length rolls over; unused quota is lost.
//! * Once the quota is spent, a blocking limiter sleeps out the rest of the
//!   cycle and rolls over; a non-blocking one grants nothing until a later
//!   call finds the cycle elapsed.
//! * Reconfiguring keeps the open cycle: admissions already counted in it
//!   count against the new quota.
//! * With pacing enabled, every completion is followed by a short pause of
//!   `remaining / quota * coefficient`, computed once per cycle.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use batchfetch_core::{RateLimitConfig, RateLimiter};
//!
//! # async fn example() {
//! let config = RateLimitConfig::new(5, Duration::from_secs(1), true).unwrap();
//! let mut limiter = RateLimiter::new(config);
//!
//! let allowed = limiter.admission_allowance().await;
//! assert_eq!(allowed, 5);
//! limiter.record_admissions(allowed);
//!
//! // The quota is spent: this sleeps until the cycle ends.
//! assert_eq!(limiter.admission_allowance().await, 5);
//! # }
//! ```

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use super::config::{PacingConfig, RateLimitConfig};

/// Warning threshold for cumulative blocking waits within one session.
const CUMULATIVE_WAIT_WARNING_THRESHOLD: Duration = Duration::from_secs(30);

/// Mutable cycle state of a rate limit.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,

    /// Start of the current cycle. `None` until the first allowance request.
    cycle_start: Option<Instant>,

    /// Admissions recorded in the current cycle.
    processed: usize,

    /// Pacing pause for the current cycle, computed on first use.
    pacing_delay: Option<Duration>,

    /// Total time spent in blocking cycle waits since the last reset.
    cumulative_wait: Duration,
}

impl RateLimiter {
    /// Creates a limiter with no cycle open.
    #[must_use]
    #[instrument(skip_all, fields(quota = config.quota, cycle_ms = config.cycle.as_millis()))]
    pub fn new(config: RateLimitConfig) -> Self {
        debug!("creating rate limiter");
        Self {
            config,
            cycle_start: None,
            processed: 0,
            pacing_delay: None,
            cumulative_wait: Duration::ZERO,
        }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Admissions recorded in the current cycle.
    #[must_use]
    pub fn processed_this_cycle(&self) -> usize {
        self.processed
    }

    /// Start of the current cycle, if one is open.
    #[must_use]
    pub fn cycle_start(&self) -> Option<Instant> {
        self.cycle_start
    }

    /// Applies `config` without closing the open cycle.
    pub fn reconfigure(&mut self, config: RateLimitConfig) {
        if config.quota != self.config.quota || config.pacing != self.config.pacing {
            self.pacing_delay = None;
        }
        debug!(
            quota = config.quota,
            processed = self.processed,
            "rate limit reconfigured within cycle"
        );
        self.config = config;
    }

    /// How long a spent non-blocking limiter keeps deferring admissions.
    ///
    /// `None` while quota remains, for blocking limiters, and once the
    /// cycle has run its length.
    #[must_use]
    pub fn deferral(&self) -> Option<Duration> {
        if self.config.blocking || self.processed < self.config.quota {
            return None;
        }
        let remaining = self
            .config
            .cycle
            .saturating_sub(self.cycle_start?.elapsed());
        (!remaining.is_zero()).then_some(remaining)
    }

    /// Forgets all cycle state. Called at the start of each session.
    pub fn reset(&mut self) {
        self.cycle_start = None;
        self.processed = 0;
        self.pacing_delay = None;
        self.cumulative_wait = Duration::ZERO;
    }

    /// Returns how many requests may be admitted now.
    ///
    /// Opens or rolls over the cycle as needed. When the quota is spent, a
    /// blocking limiter sleeps for the rest of the cycle first; a
    /// non-blocking limiter returns `0`.
    pub async fn admission_allowance(&mut self) -> usize {
        let now = Instant::now();
        let start = match self.cycle_start {
            Some(start) if now.duration_since(start) >= self.config.cycle => {
                self.roll_over(now);
                now
            }
            Some(start) => start,
            None => {
                self.roll_over(now);
                now
            }
        };

        if self.processed < self.config.quota {
            return self.config.quota - self.processed;
        }

        if !self.config.blocking {
            debug!(processed = self.processed, "quota spent, deferring admissions");
            return 0;
        }

        let remaining = self.config.cycle.saturating_sub(now.duration_since(start));
        if !remaining.is_zero() {
            debug!(wait_ms = remaining.as_millis(), "quota spent, waiting for next cycle");
            tokio::time::sleep(remaining).await;
            self.cumulative_wait += remaining;
            if self.cumulative_wait > CUMULATIVE_WAIT_WARNING_THRESHOLD {
                warn!(
                    cumulative_wait_secs = self.cumulative_wait.as_secs(),
                    "rate limit has delayed admissions for a long time"
                );
                self.cumulative_wait = Duration::ZERO;
            }
        }
        self.roll_over(Instant::now());
        self.config.quota
    }

    /// Replaces the pacing settings; the pause is recomputed on next use.
    pub fn set_pacing(&mut self, pacing: PacingConfig) {
        self.config.pacing = pacing;
        self.pacing_delay = None;
    }

    /// Counts `count` admissions against the current cycle.
    pub fn record_admissions(&mut self, count: usize) {
        self.processed += count;
    }

    /// The pacing pause for the current cycle, or `None` when pacing is off.
    ///
    /// Computed on first use after each roll-over as the time left in the
    /// cycle divided by the quota, scaled by the coefficient.
    pub fn pacing_delay(&mut self) -> Option<Duration> {
        if !self.config.pacing.enabled {
            return None;
        }
        if let Some(delay) = self.pacing_delay {
            return Some(delay);
        }

        let elapsed = self
            .cycle_start
            .map_or(Duration::ZERO, |start| start.elapsed());
        let remaining = self.config.cycle.saturating_sub(elapsed);
        let per_request = remaining.as_secs_f64() / quota_as_f64(self.config.quota);
        let delay = Duration::try_from_secs_f64(per_request * self.config.pacing.coefficient)
            .unwrap_or(Duration::ZERO);
        debug!(delay_ms = delay.as_millis(), "computed pacing delay");
        self.pacing_delay = Some(delay);
        Some(delay)
    }

    /// Sleeps for the pacing pause, if pacing is on.
    pub async fn pace_after_completion(&mut self) {
        match self.pacing_delay() {
            Some(delay) if !delay.is_zero() => tokio::time::sleep(delay).await,
            _ => {}
        }
    }

    fn roll_over(&mut self, now: Instant) {
        if self.cycle_start.is_some() {
            debug!(processed = self.processed, "rate limit cycle rolled over");
        }
        self.cycle_start = Some(now);
        self.processed = 0;
        self.pacing_delay = None;
    }
}

#[allow(clippy::cast_precision_loss)]
fn quota_as_f64(quota: usize) -> f64 {
    quota.max(1) as f64
}
