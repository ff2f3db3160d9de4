//! WindowedLimits node: colormap limits over a sliding window.
//!
//! Keeps per-column minimum and maximum of the incoming chunks in a 2-row
//! ring buffer spanning `buffer_length` seconds, and derives a `[lower, upper]`
//! pair from it according to `limits_mode`. Each update writes the last
//! sample of the input, normalized to those limits, into the output chunk
//! (`channels × 1`).

use crate::pipeline::attribute::{layout_fingerprint, names};
use crate::pipeline::chunk::Chunk;
use crate::pipeline::contract::StageContract;
use crate::pipeline::error::{StageError, StageResult};
use crate::pipeline::node::{InitContext, NodeRole, Stage, UpdateContext};
use crate::pipeline::param::ParamValue;
use crate::pipeline::ring_buffer::{RingBuffer, MAX_ELEMENTS};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How limits are derived from the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitsMode {
    /// 5th percentile of the buffered minimums, 95th of the maximums.
    Global,
    /// Min and max of the most recent sample only.
    #[default]
    Local,
    /// Limits are set by the host through `lower` / `upper`.
    Manual,
}

impl LimitsMode {
    pub fn as_str(self) -> &'static str {
        match self {
            LimitsMode::Global => "global",
            LimitsMode::Local => "local",
            LimitsMode::Manual => "manual",
        }
    }
}

impl fmt::Display for LimitsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LimitsMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "global" => Ok(LimitsMode::Global),
            "local" => Ok(LimitsMode::Local),
            "manual" => Ok(LimitsMode::Manual),
            other => Err(format!("unknown limits mode '{other}'")),
        }
    }
}

/// Longest window accepted through `buffer_length`, in seconds.
pub const MAX_BUFFER_LENGTH_S: f64 = 3600.0;

/// Current colormap limits. `None` until the first chunk (or manual value).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ColormapLimits {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

pub struct WindowedLimits {
    limits_mode: LimitsMode,
    /// Window length in seconds.
    buffer_length: f64,
    take_abs: bool,
    limits: ColormapLimits,
    /// Sampling rate resolved at initialization.
    sampling_rate: f64,
    buffer: RingBuffer,
    contract: StageContract,
}

impl WindowedLimits {
    pub fn new(limits_mode: LimitsMode, buffer_length: f64) -> Self {
        let contract = StageContract::builder()
            .resets_on(&["buffer_length", "take_abs"])
            .observes(names::CHANNEL_LAYOUT, layout_fingerprint)
            .finish();
        Self {
            limits_mode,
            buffer_length,
            take_abs: true,
            limits: ColormapLimits::default(),
            sampling_rate: 0.0,
            buffer: RingBuffer::empty(2),
            contract,
        }
    }

    pub fn with_take_abs(mut self, take_abs: bool) -> Self {
        self.take_abs = take_abs;
        self
    }

    pub fn limits(&self) -> ColormapLimits {
        self.limits
    }

    pub fn limits_mode(&self) -> LimitsMode {
        self.limits_mode
    }

    /// The min/max window.
    pub fn buffer(&self) -> &RingBuffer {
        &self.buffer
    }

    /// Map `values` into `[0, 1]` using the current limits.
    ///
    /// All zeros when `lower == upper` or when no limits are known yet.
    pub fn normalize(&self, values: &[f64]) -> Vec<f64> {
        match (self.limits.lower, self.limits.upper) {
            (Some(lower), Some(upper)) if lower != upper => values
                .iter()
                .map(|v| (v - lower) / (upper - lower))
                .collect(),
            _ => vec![0.0; values.len()],
        }
    }

    /// Window columns for `buffer_length` seconds. Saturates on overflow, so
    /// oversized windows are caught by `RingBuffer::new`.
    fn window_capacity(&self, buffer_length: f64) -> usize {
        (buffer_length * self.sampling_rate).max(0.0) as usize
    }

    fn update_limits(&mut self, sources: &Chunk) -> StageResult<()> {
        let columns = sources.columns();
        let mut block = Chunk::zeros(2, columns);
        for j in 0..columns {
            let (lo, hi) = sources
                .column(j)
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                    (lo.min(v), hi.max(v))
                });
            block.set(0, j, lo);
            block.set(1, j, hi);
        }
        self.buffer.extend(&block)?;

        match self.limits_mode {
            LimitsMode::Global => {
                if !self.buffer.is_empty() {
                    self.limits.lower = percentile(&self.buffer.row(0), 5.0);
                    self.limits.upper = percentile(&self.buffer.row(1), 95.0);
                }
            }
            LimitsMode::Local => {
                if columns > 0 {
                    self.limits.lower = Some(block.row(0)[columns - 1]);
                    self.limits.upper = Some(block.row(1)[columns - 1]);
                }
            }
            LimitsMode::Manual => {}
        }
        Ok(())
    }
}

/// Percentile with linear interpolation between closest ranks.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let below = rank.floor() as usize;
    let above = rank.ceil() as usize;
    let frac = rank - below as f64;
    Some(sorted[below] + (sorted[above] - sorted[below]) * frac)
}

impl Stage for WindowedLimits {
    fn name(&self) -> &str {
        "WindowedLimits"
    }

    fn role(&self) -> NodeRole {
        NodeRole::Output
    }

    fn contract(&self) -> &StageContract {
        &self.contract
    }

    fn parameter(&self, name: &str) -> Option<ParamValue> {
        match name {
            "limits_mode" => Some(ParamValue::String(self.limits_mode.to_string())),
            "buffer_length" => Some(ParamValue::Float(self.buffer_length)),
            "take_abs" => Some(ParamValue::Bool(self.take_abs)),
            "lower" => Some(ParamValue::Float(self.limits.lower.unwrap_or(f64::NAN))),
            "upper" => Some(ParamValue::Float(self.limits.upper.unwrap_or(f64::NAN))),
            _ => None,
        }
    }

    fn validate_parameter(&self, name: &str, value: &ParamValue) -> Result<(), String> {
        match name {
            "limits_mode" => value
                .as_str()
                .ok_or_else(|| "limits mode must be a string".to_string())
                .and_then(|s| s.parse::<LimitsMode>().map(|_| ())),
            "buffer_length" => match value.as_float() {
                Some(v) if v > 0.0 && v <= MAX_BUFFER_LENGTH_S => {
                    // rows × columns must fit once the rate is known
                    if self.window_capacity(v) > MAX_ELEMENTS / 2 {
                        Err(format!(
                            "{v} s at {} Hz exceeds {} buffered columns",
                            self.sampling_rate,
                            MAX_ELEMENTS / 2
                        ))
                    } else {
                        Ok(())
                    }
                }
                _ => Err(format!(
                    "buffer length must be in (0, {MAX_BUFFER_LENGTH_S}] seconds"
                )),
            },
            "take_abs" => value
                .as_bool()
                .map(|_| ())
                .ok_or_else(|| "take_abs must be a boolean".to_string()),
            "lower" | "upper" => {
                if self.limits_mode != LimitsMode::Manual {
                    return Err(format!("'{name}' can only be set in manual mode"));
                }
                match value.as_float() {
                    Some(v) if v.is_finite() => Ok(()),
                    _ => Err(format!("'{name}' must be a finite number")),
                }
            }
            _ => Ok(()),
        }
    }

    fn apply_parameter(&mut self, name: &str, value: ParamValue) {
        match name {
            "limits_mode" => {
                if let Some(mode) = value.as_str().and_then(|s| s.parse().ok()) {
                    self.limits_mode = mode;
                }
            }
            "buffer_length" => {
                if let Some(v) = value.as_float() {
                    self.buffer_length = v;
                }
            }
            "take_abs" => {
                if let Some(v) = value.as_bool() {
                    self.take_abs = v;
                }
            }
            "lower" => self.limits.lower = value.as_float(),
            "upper" => self.limits.upper = value.as_float(),
            _ => {}
        }
    }

    fn initialize(&mut self, ctx: &InitContext) -> StageResult<()> {
        let layout = ctx.resolve(names::CHANNEL_LAYOUT)?;
        self.sampling_rate = layout
            .as_layout()
            .map(|l| l.sampling_rate)
            .ok_or_else(|| StageError::compute("channel_layout is not a layout"))?;
        self.buffer = RingBuffer::new(2, self.window_capacity(self.buffer_length))?;
        tracing::debug!(
            "WindowedLimits: {} mode, window of {} columns",
            self.limits_mode,
            self.buffer.capacity()
        );
        Ok(())
    }

    fn reset(&mut self) -> StageResult<()> {
        // buffer_length may have changed; the sampling rate cannot have.
        self.buffer = RingBuffer::new(2, self.window_capacity(self.buffer_length))?;
        Ok(())
    }

    fn update(&mut self, ctx: &mut UpdateContext) -> StageResult<()> {
        let input = ctx.require_input()?;
        if input.is_empty() {
            return Ok(());
        }

        let mut sources = input.clone();
        if self.take_abs {
            sources.map_in_place(f64::abs);
        }
        self.update_limits(&sources)?;

        let last = sources.columns() - 1;
        let last_sample: Vec<f64> = sources.iter_rows().map(|row| row[last]).collect();
        let normalized = self.normalize(&last_sample);

        ctx.output.resize(normalized.len(), 1);
        for (channel, v) in normalized.into_iter().enumerate() {
            ctx.output.set(channel, 0, v);
        }
        Ok(())
    }

    fn on_input_history_invalidation(&mut self) {
        self.buffer.clear();
    }
}
