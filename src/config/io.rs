//! Receptor/emitter supervision configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Restart policy for supervised receptors and emitters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay before the first restart.
    pub initial_backoff_ms: u64,
    /// Cap for the exponential growth.
    pub max_backoff_ms: u64,
    /// Growth factor per consecutive failure.
    pub multiplier: f64,
    /// Consecutive failures tolerated before the worker enters ERROR.
    pub max_retries: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 10,
            max_backoff_ms: 5_000,
            multiplier: 2.0,
            max_retries: 8,
        }
    }
}

impl BackoffConfig {
    /// Delay before restart attempt `attempt` (0-indexed).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        #[allow(clippy::cast_precision_loss)]
        let base = self.initial_backoff_ms as f64;
        #[allow(clippy::cast_precision_loss)]
        let cap = self.max_backoff_ms as f64;
        let delay_ms = (base * self.multiplier.powi(exp)).min(cap).max(0.0);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let micros = (delay_ms * 1_000.0).round() as u64;
        Duration::from_micros(micros)
    }

    /// Whether `failures` consecutive failures exhaust the retry budget.
    #[must_use]
    pub const fn is_exhausted(&self, failures: u32) -> bool {
        failures > self.max_retries
    }

    /// Validate backoff values.
    pub fn validate(&self) -> Result<(), String> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err("multiplier must be a finite value >= 1.0".into());
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err("max_backoff_ms must be >= initial_backoff_ms".into());
        }
        Ok(())
    }
}

/// Settings shared by all receptors and emitters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Restart policy.
    pub backoff: BackoffConfig,
    /// Sleep when a step moved no rows, in milliseconds.
    pub idle_delay_ms: u64,
    /// Maximum rows a receptor polls per step.
    pub batch_size: usize,
    /// Bounded wait for basket locks in milliseconds.
    pub lock_timeout_ms: u64,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffConfig::default(),
            idle_delay_ms: 5,
            batch_size: 1_024,
            lock_timeout_ms: 50,
        }
    }
}

impl IoConfig {
    /// Idle delay as a duration.
    #[must_use]
    pub const fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }

    /// Basket lock wait as a duration.
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Validate I/O settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("batch_size must be greater than 0".into());
        }
        if self.lock_timeout_ms == 0 {
            return Err("lock_timeout_ms must be greater than 0".into());
        }
        self.backoff.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let b = BackoffConfig {
            initial_backoff_ms: 10,
            max_backoff_ms: 50,
            multiplier: 2.0,
            max_retries: 3,
        };
        assert_eq!(b.delay(0), Duration::from_millis(10));
        assert_eq!(b.delay(1), Duration::from_millis(20));
        assert_eq!(b.delay(10), Duration::from_millis(50));
        assert!(!b.is_exhausted(3));
        assert!(b.is_exhausted(4));
    }
}
