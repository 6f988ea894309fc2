//! Retry scheduling for transient upload failures.

use crate::config::SyncConfig;
use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;
use tokio::time::Instant;

/// Exponential backoff with symmetric jitter, never above `max`.
///
/// The base delay for retry `n` is `min(max, initial * multiplier^(n-1))`;
/// the jittered delay lies within `base * (1 ± randomization_factor)` and is
/// then clamped to `max`.
///
/// ```
/// use stockroom_controller::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(60), 2.0, 0.0);
/// assert_eq!(policy.base_delay(1), Duration::from_secs(1));
/// assert_eq!(policy.base_delay(3), Duration::from_secs(4));
/// assert_eq!(policy.base_delay(10), Duration::from_secs(60));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    randomization_factor: f64,
}

impl RetryPolicy {
    pub fn new(
        initial: Duration,
        max: Duration,
        multiplier: f64,
        randomization_factor: f64,
    ) -> Self {
        Self {
            initial,
            max,
            multiplier,
            randomization_factor,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(
            config.initial_backoff,
            config.max_backoff,
            config.backoff_multiplier,
            config.jitter_ratio,
        )
    }

    /// Schedule positioned at retry number `attempt` (1-based).
    fn schedule_at(&self, attempt: u32) -> ExponentialBackoff {
        let mut schedule = ExponentialBackoff {
            current_interval: self.initial,
            initial_interval: self.initial,
            randomization_factor: self.randomization_factor,
            multiplier: self.multiplier,
            max_interval: self.max,
            max_elapsed_time: None,
            ..Default::default()
        };

        for _ in 1..attempt {
            if schedule.current_interval >= self.max {
                break;
            }
            schedule.next_backoff();
        }
        schedule
    }

    /// Delay before retry number `attempt` (1-based), without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        self.schedule_at(attempt).current_interval.min(self.max)
    }

    /// Delay before retry number `attempt`, jitter included.
    pub fn delay(&self, attempt: u32) -> Duration {
        if self.randomization_factor <= 0.0 {
            return self.base_delay(attempt);
        }
        self.schedule_at(attempt)
            .next_backoff()
            .unwrap_or(self.max)
            .min(self.max)
    }
}

/// Wall-clock time derived from Tokio's monotonic clock.
///
/// Retry deadlines are stored as UTC timestamps. Deriving "now" from
/// [`tokio::time::Instant`] keeps those deadlines consistent with Tokio
/// timers, including under a paused test clock.
#[derive(Debug, Clone, Copy)]
pub struct SyncClock {
    origin_utc: DateTime<Utc>,
    origin: Instant,
}

impl SyncClock {
    pub fn new() -> Self {
        Self {
            origin_utc: Utc::now(),
            origin: Instant::now(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        let elapsed = TimeDelta::from_std(self.origin.elapsed()).unwrap_or(TimeDelta::zero());
        self.origin_utc + elapsed
    }

    /// `now() + delay`, saturating on overflow.
    pub fn after(&self, delay: Duration) -> DateTime<Utc> {
        let now = self.now();
        TimeDelta::from_std(delay)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl Default for SyncClock {
    fn default() -> Self {
        Self::new()
    }
}
