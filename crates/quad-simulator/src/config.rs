//! # Simulator Configuration
//!
//! Environment-based configuration for the simulation runtime.

use std::env;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;

use quad_telemetry::DEFAULT_CHANNEL_CAPACITY;

use crate::clock::{ClockConfig, DEFAULT_TICK_PERIOD};
use crate::error::{Result, SimulationError};
use crate::integrator::StepSize;

/// Runtime configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Wall-clock tick period in milliseconds
    pub tick_ms: u64,

    /// Integration step per tick in seconds
    pub step_s: f64,

    /// Maximum retained simulation frames (unbounded when unset)
    pub history_limit: Option<usize>,

    /// Observer broadcast capacity
    pub channel_capacity: usize,

    /// Logging level
    pub log_level: String,

    /// Emit JSON log lines
    pub log_json: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup. Unparseable values fall back
    /// to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            tick_ms: parse(lookup("SIM_TICK_MS")).unwrap_or(defaults.tick_ms),
            step_s: parse(lookup("SIM_STEP_S")).unwrap_or(defaults.step_s),
            history_limit: parse(lookup("SIM_HISTORY_LIMIT")),
            channel_capacity: parse(lookup("CHANNEL_CAPACITY")).unwrap_or(defaults.channel_capacity),
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_json: lookup("LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json")),
        }
    }

    /// Build the clock settings, validating period, step and history limit.
    ///
    /// # Errors
    ///
    /// Zero tick period, a non-positive step or a history limit of 0.
    pub fn clock_config(&self) -> Result<ClockConfig> {
        let step = StepSize::new(self.step_s)?;
        let history_limit = self
            .history_limit
            .map(|limit| NonZeroUsize::new(limit).ok_or(SimulationError::InvalidHistoryLimit))
            .transpose()?;
        Ok(ClockConfig::new(Duration::from_millis(self.tick_ms), step)?
            .with_history_limit(history_limit))
    }
}

fn parse<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_ms: u64::try_from(DEFAULT_TICK_PERIOD.as_millis()).unwrap_or(30),
            step_s: StepSize::default().seconds(),
            history_limit: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}
