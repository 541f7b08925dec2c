//! Throttle configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::ThrottleError;

/// Throttle configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ThrottleConfig {
    /// Max work items admitted per interval
    #[serde(default = "default_max_per_interval")]
    pub max_per_interval: u32,

    /// Interval length in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Spread admissions evenly across the interval instead of bursting
    #[serde(default)]
    pub evenly_spaced: bool,
}

fn default_max_per_interval() -> u32 {
    10
}

fn default_interval_ms() -> u64 {
    1000
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_per_interval: 10,
            interval_ms: 1000,
            evenly_spaced: false,
        }
    }
}

/// Effective admission limits after even-spacing normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_per_interval: usize,
    pub interval: Duration,
}

impl ThrottleConfig {
    /// Build a config from the three raw knobs
    pub fn new(max_per_interval: u32, interval_ms: u64, evenly_spaced: bool) -> Self {
        Self {
            max_per_interval,
            interval_ms,
            evenly_spaced,
        }
    }

    /// Get the configured interval as a Duration
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Validate and normalize into the limits the throttle enforces.
    ///
    /// With even spacing, "N per T" becomes "1 per T/N". The division is
    /// exact to the nanosecond; anything below truncates.
    pub fn limits(&self) -> Result<Limits, ThrottleError> {
        debug!(?self, "ThrottleConfig::limits: called");
        if self.max_per_interval == 0 {
            return Err(ThrottleError::ZeroCapacity);
        }

        let limits = if self.evenly_spaced {
            Limits {
                max_per_interval: 1,
                interval: self.interval() / self.max_per_interval,
            }
        } else {
            Limits {
                max_per_interval: self.max_per_interval as usize,
                interval: self.interval(),
            }
        };

        if limits.interval.is_zero() {
            return Err(ThrottleError::ZeroInterval {
                interval_ms: self.interval_ms,
            });
        }
        Ok(limits)
    }
}
