//! Configuration sections.
//!
//! Every field has a default so a partial TOML file (or none at all) yields a
//! usable configuration.

use crate::error::{NeurochainError, Result};
use crate::pipeline::nodes::LimitsMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default tick rate in Hz
pub const DEFAULT_TICK_RATE_HZ: u32 = 10;

/// Default interval between scheduler stats events in milliseconds
pub const DEFAULT_STATS_INTERVAL_MS: u64 = 500;

/// Default busy-wait window at the end of each tick period, in microseconds
pub const DEFAULT_SPIN_THRESHOLD_US: u64 = 1000;

/// Default log filter when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "info,neurochain=debug";

// ==================== Scheduler ====================

/// Fixed-rate scheduler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Target ticks per second.
    pub tick_rate_hz: u32,
    pub stats_interval_ms: u64,
    /// The final part of each wait is spent spinning instead of sleeping.
    pub spin_threshold_us: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: DEFAULT_TICK_RATE_HZ,
            stats_interval_ms: DEFAULT_STATS_INTERVAL_MS,
            spin_threshold_us: DEFAULT_SPIN_THRESHOLD_US,
        }
    }
}

impl SchedulerConfig {
    pub fn with_tick_rate(mut self, hz: u32) -> Self {
        self.tick_rate_hz = hz;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_rate_hz == 0 {
            return Err(NeurochainError::Config(
                "tick_rate_hz must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Target period between tick starts.
    pub fn period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.tick_rate_hz.max(1)))
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }

    pub fn spin_threshold(&self) -> Duration {
        Duration::from_micros(self.spin_threshold_us)
    }
}

// ==================== Logging ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, used when `RUST_LOG` is not set.
    pub filter: String,
    /// Directory for daily rolling log files. Console only when `None`.
    pub log_dir: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            log_dir: None,
            file_prefix: "neurochain.log".to_string(),
        }
    }
}

// ==================== Source ====================

/// Settings for the synthetic demo source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub source_name: String,
    pub channel_count: usize,
    pub sampling_rate: f64,
    /// Samples per channel emitted each tick.
    pub chunk_size: usize,
    pub frequency_hz: f64,
    pub amplitude: f64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            source_name: "synthetic".to_string(),
            channel_count: 8,
            sampling_rate: 500.0,
            chunk_size: 50,
            frequency_hz: 10.0,
            amplitude: 1.0,
        }
    }
}

// ==================== Limits ====================

/// Settings for the windowed-limits output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub mode: LimitsMode,
    /// Window length in seconds.
    pub buffer_length: f64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            mode: LimitsMode::Global,
            buffer_length: 6.0,
        }
    }
}
