//! Per-backend request quotas.
//!
//! Each backend in a resolver chain owns one [`RateLimiter`]. The limiter
//! combines a per-minute token bucket, which allows short bursts, with a
//! per-day fixed window matching the way routing services bill their free
//! tiers. Both limits are optional.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::clock::Clock;

const MINUTE: Duration = Duration::from_secs(60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Request allowance for one backend.
///
/// # Examples
///
/// ```
/// use rundinner_core::QuotaConfig;
///
/// let quota = QuotaConfig::per_minute(40).with_per_day(2_000);
/// assert_eq!(quota.per_day, Some(2_000));
/// assert!(QuotaConfig::unlimited().is_unlimited());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotaConfig {
    /// Sustained requests per minute; also the burst size.
    pub per_minute: Option<u32>,
    /// Requests per 24-hour window.
    pub per_day: Option<u32>,
}

impl QuotaConfig {
    /// No limits.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            per_minute: None,
            per_day: None,
        }
    }

    /// Limit to `requests` per minute.
    #[must_use]
    pub const fn per_minute(requests: u32) -> Self {
        Self {
            per_minute: Some(requests),
            per_day: None,
        }
    }

    /// Add a daily limit.
    #[must_use]
    pub const fn with_per_day(mut self, requests: u32) -> Self {
        self.per_day = Some(requests);
        self
    }

    /// Whether neither limit is set.
    #[must_use]
    pub const fn is_unlimited(&self) -> bool {
        self.per_minute.is_none() && self.per_day.is_none()
    }
}

/// Outcome of [`RateLimiter::try_acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// A request may be sent now.
    Allowed,
    /// The quota is exhausted.
    Limited {
        /// Time until the next request would be allowed.
        retry_after: Duration,
    },
}

impl RateDecision {
    /// Whether the request may proceed.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

#[derive(Debug)]
struct LimiterState {
    tokens: f64,
    last_refill: Instant,
    day_started: Instant,
    day_count: u32,
}

/// Token bucket plus daily window, driven by an injectable [`Clock`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use rundinner_core::{ManualClock, QuotaConfig, RateLimiter};
///
/// let clock = Arc::new(ManualClock::new());
/// let limiter = RateLimiter::new(QuotaConfig::per_minute(2), clock.clone());
/// assert!(limiter.try_acquire().is_allowed());
/// assert!(limiter.try_acquire().is_allowed());
/// assert!(!limiter.try_acquire().is_allowed());
///
/// clock.advance(Duration::from_secs(30));
/// assert!(limiter.try_acquire().is_allowed());
/// ```
pub struct RateLimiter {
    config: QuotaConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<LimiterState>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Create a limiter with a full bucket and an empty daily window.
    pub fn new(config: QuotaConfig, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        let tokens = config.per_minute.map_or(0.0, f64::from);
        Self {
            config,
            clock,
            state: Mutex::new(LimiterState {
                tokens,
                last_refill: now,
                day_started: now,
                day_count: 0,
            }),
        }
    }

    /// Configured quota.
    #[must_use]
    pub const fn config(&self) -> QuotaConfig {
        self.config
    }

    /// Take one request from the quota if available.
    ///
    /// A limited call consumes nothing.
    pub fn try_acquire(&self) -> RateDecision {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if now.duration_since(state.day_started) >= DAY {
            state.day_started = now;
            state.day_count = 0;
        }
        if let Some(per_day) = self.config.per_day
            && state.day_count >= per_day
        {
            let elapsed = now.duration_since(state.day_started);
            return RateDecision::Limited {
                retry_after: DAY.saturating_sub(elapsed),
            };
        }

        if let Some(per_minute) = self.config.per_minute {
            let capacity = f64::from(per_minute);
            let rate = capacity / MINUTE.as_secs_f64();
            let elapsed = now.duration_since(state.last_refill).as_secs_f64();
            state.tokens = (state.tokens + elapsed * rate).min(capacity);
            state.last_refill = now;
            if state.tokens < 1.0 {
                let retry_after = if rate > 0.0 {
                    Duration::from_secs_f64((1.0 - state.tokens) / rate)
                } else {
                    MINUTE
                };
                return RateDecision::Limited { retry_after };
            }
            state.tokens -= 1.0;
        }

        state.day_count = state.day_count.saturating_add(1);
        RateDecision::Allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use rstest::{fixture, rstest};

    #[fixture]
    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new())
    }

    #[rstest]
    fn unlimited_never_blocks(clock: Arc<ManualClock>) {
        let limiter = RateLimiter::new(QuotaConfig::unlimited(), clock);
        assert!((0..1_000).all(|_| limiter.try_acquire().is_allowed()));
    }

    #[rstest]
    fn minute_bucket_refills_gradually(clock: Arc<ManualClock>) {
        let limiter = RateLimiter::new(QuotaConfig::per_minute(60), clock.clone());
        for _ in 0..60 {
            assert!(limiter.try_acquire().is_allowed());
        }
        let RateDecision::Limited { retry_after } = limiter.try_acquire() else {
            panic!("bucket should be empty");
        };
        assert!(retry_after <= Duration::from_secs(1));

        clock.advance(Duration::from_secs(1));
        assert!(limiter.try_acquire().is_allowed());
        assert!(!limiter.try_acquire().is_allowed());
    }

    #[rstest]
    fn daily_window_resets_after_24_hours(clock: Arc<ManualClock>) {
        let limiter = RateLimiter::new(QuotaConfig::unlimited().with_per_day(3), clock.clone());
        for _ in 0..3 {
            assert!(limiter.try_acquire().is_allowed());
        }
        clock.advance(Duration::from_secs(60 * 60));
        assert_eq!(
            limiter.try_acquire(),
            RateDecision::Limited {
                retry_after: Duration::from_secs(23 * 60 * 60)
            }
        );
        clock.advance(Duration::from_secs(23 * 60 * 60));
        assert!(limiter.try_acquire().is_allowed());
    }

    #[rstest]
    fn limited_calls_do_not_consume_the_daily_quota(clock: Arc<ManualClock>) {
        let limiter = RateLimiter::new(QuotaConfig::per_minute(1).with_per_day(2), clock.clone());
        assert!(limiter.try_acquire().is_allowed());
        assert!(!limiter.try_acquire().is_allowed());
        clock.advance(MINUTE);
        assert!(limiter.try_acquire().is_allowed());
        clock.advance(MINUTE);
        assert!(!limiter.try_acquire().is_allowed());
    }

    #[rstest]
    fn zero_quota_is_always_limited(clock: Arc<ManualClock>) {
        let limiter = RateLimiter::new(QuotaConfig::per_minute(0), clock);
        assert_eq!(
            limiter.try_acquire(),
            RateDecision::Limited {
                retry_after: MINUTE
            }
        );
    }
}
