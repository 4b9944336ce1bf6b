//! Scheduler, basket and engine configuration structures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::io::IoConfig;
use crate::core::column::ColumnDef;

/// Environment variable overriding [`SchedulerConfig::cycle_delay_ms`].
pub const ENV_CYCLE_DELAY_MS: &str = "PETRINET_CYCLE_DELAY_MS";
/// Environment variable overriding [`SchedulerConfig::stop_poll_limit`].
pub const ENV_STOP_POLL_LIMIT: &str = "PETRINET_STOP_POLL_LIMIT";
/// Environment variable overriding [`SchedulerConfig::lock_timeout_ms`].
pub const ENV_LOCK_TIMEOUT_MS: &str = "PETRINET_LOCK_TIMEOUT_MS";
/// Environment variable overriding [`SchedulerConfig::auto_start`].
pub const ENV_AUTO_START: &str = "PETRINET_AUTO_START";

/// Control loop configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Sleep between rounds in milliseconds.
    pub cycle_delay_ms: u64,
    /// Number of polls `stop_scheduler` waits for the loop to reach INIT.
    pub stop_poll_limit: u32,
    /// Bounded wait for basket locks in milliseconds.
    pub lock_timeout_ms: u64,
    /// Start the control loop on the first successful registration.
    pub auto_start: bool,
    /// Entries kept in each basket's error log.
    pub error_log_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cycle_delay_ms: 1,
            stop_poll_limit: 100,
            lock_timeout_ms: 50,
            auto_start: true,
            error_log_capacity: 32,
        }
    }
}

impl SchedulerConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the inter-round delay.
    #[must_use]
    pub const fn with_cycle_delay_ms(mut self, ms: u64) -> Self {
        self.cycle_delay_ms = ms;
        self
    }

    /// Set the stop poll budget.
    #[must_use]
    pub const fn with_stop_poll_limit(mut self, polls: u32) -> Self {
        self.stop_poll_limit = polls;
        self
    }

    /// Set the basket lock wait.
    #[must_use]
    pub const fn with_lock_timeout_ms(mut self, ms: u64) -> Self {
        self.lock_timeout_ms = ms;
        self
    }

    /// Enable or disable starting the loop on first registration.
    #[must_use]
    pub const fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    /// Inter-round delay as a duration.
    #[must_use]
    pub const fn cycle_delay(&self) -> Duration {
        Duration::from_millis(self.cycle_delay_ms)
    }

    /// Basket lock wait as a duration.
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.stop_poll_limit == 0 {
            return Err("stop_poll_limit must be greater than 0".into());
        }
        if self.lock_timeout_ms == 0 {
            return Err("lock_timeout_ms must be greater than 0".into());
        }
        Ok(())
    }

    /// Load defaults overridden by `PETRINET_*` environment variables.
    ///
    /// A `.env` file in the working directory is loaded first when present.
    pub fn from_env() -> Result<Self, String> {
        // Missing .env is not an error.
        let _ = dotenvy::dotenv();
        let cfg = Self::from_lookup(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let mut cfg = Self::default();
        if let Some(v) = lookup(ENV_CYCLE_DELAY_MS) {
            cfg.cycle_delay_ms = parse_var(ENV_CYCLE_DELAY_MS, &v)?;
        }
        if let Some(v) = lookup(ENV_STOP_POLL_LIMIT) {
            cfg.stop_poll_limit = parse_var(ENV_STOP_POLL_LIMIT, &v)?;
        }
        if let Some(v) = lookup(ENV_LOCK_TIMEOUT_MS) {
            cfg.lock_timeout_ms = parse_var(ENV_LOCK_TIMEOUT_MS, &v)?;
        }
        if let Some(v) = lookup(ENV_AUTO_START) {
            cfg.auto_start = parse_var(ENV_AUTO_START, &v)?;
        }
        Ok(cfg)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| format!("{key}={value}: {e}"))
}

/// Declarative basket definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasketConfig {
    /// Basket name, optionally schema-qualified.
    pub name: String,
    /// Column schema.
    pub columns: Vec<ColumnDef>,
    /// Minimum rows before the basket enables its transition.
    #[serde(default)]
    pub threshold: usize,
    /// Sliding window size in rows.
    #[serde(default)]
    pub window: usize,
    /// Window stride in rows (defaults to the window size).
    #[serde(default)]
    pub stride: Option<usize>,
    /// Temporal window size in milliseconds.
    #[serde(default)]
    pub time_slice_ms: u64,
    /// Temporal window stride in milliseconds.
    #[serde(default)]
    pub time_stride_ms: u64,
    /// Maximum staleness in milliseconds.
    #[serde(default)]
    pub beat_ms: u64,
}

impl BasketConfig {
    /// Validate basket definition values.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("basket name must not be empty".into());
        }
        if self.columns.is_empty() {
            return Err("at least one column must be defined".into());
        }
        if let Some(stride) = self.stride {
            if self.window > 0 && stride > self.window {
                return Err(format!("stride {stride} exceeds window {}", self.window));
            }
        }
        Ok(())
    }
}

/// Root configuration for a complete engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Control loop settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Baskets created at startup.
    #[serde(default)]
    pub baskets: Vec<BasketConfig>,
    /// Receptor/emitter supervision settings.
    #[serde(default)]
    pub io: IoConfig,
}

impl EngineConfig {
    /// Validate all sections.
    pub fn validate(&self) -> Result<(), String> {
        self.scheduler
            .validate()
            .map_err(|e| format!("scheduler invalid: {e}"))?;
        for basket in &self.baskets {
            basket
                .validate()
                .map_err(|e| format!("basket `{}` invalid: {e}", basket.name))?;
        }
        self.io.validate().map_err(|e| format!("io invalid: {e}"))?;
        Ok(())
    }

    /// Parse engine configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_overrides_defaults() {
        let cfg = SchedulerConfig::from_lookup(|k| match k {
            ENV_CYCLE_DELAY_MS => Some("5".into()),
            ENV_AUTO_START => Some("false".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(cfg.cycle_delay_ms, 5);
        assert!(!cfg.auto_start);
        assert_eq!(cfg.stop_poll_limit, 100);
    }

    #[test]
    fn test_lookup_rejects_garbage() {
        let err = SchedulerConfig::from_lookup(|k| {
            (k == ENV_STOP_POLL_LIMIT).then(|| "many".to_string())
        })
        .unwrap_err();
        assert!(err.contains(ENV_STOP_POLL_LIMIT));
    }
}
