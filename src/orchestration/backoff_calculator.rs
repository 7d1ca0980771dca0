//! # Backoff Calculator
//!
//! Retry delays for jobs that failed at the job level.
//!
//! ## Overview
//!
//! Delay for attempt `n` (1-based) is `base_delay * multiplier^(n-1)`, capped at `max_delay`.
//! With jitter enabled a random share of up to `jitter_max_percentage` of the delay is added
//! so that jobs that failed together do not all come back together.

use crate::config::BackoffConfig;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;

#[derive(Debug, Clone)]
pub struct BackoffCalculator {
    config: BackoffConfig,
}

impl BackoffCalculator {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Delay before the next attempt, without jitter
    pub fn base_delay_ms(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay = self.config.base_delay_ms as f64 * self.config.backoff_multiplier.powi(exponent);
        if !delay.is_finite() || delay >= self.config.max_delay_ms as f64 {
            self.config.max_delay_ms
        } else {
            delay as u64
        }
    }

    /// Delay before the next attempt, jitter applied when enabled
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let delay = self.base_delay_ms(attempt);
        if !self.config.jitter_enabled || delay == 0 || self.config.jitter_max_percentage <= 0.0 {
            return delay;
        }

        let max_jitter = (delay as f64 * self.config.jitter_max_percentage) as u64;
        if max_jitter == 0 {
            return delay;
        }
        let jitter = rand::thread_rng().gen_range(0..=max_jitter);
        delay.saturating_add(jitter)
    }

    /// Due time of the next attempt after a failure at `now`
    pub fn next_due_at(&self, attempt: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        let delay = i64::try_from(self.delay_ms(attempt)).unwrap_or(i64::MAX);
        now + Duration::milliseconds(delay)
    }
}

impl Default for BackoffCalculator {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}
