//! SyntheticSource: sine-wave multichannel source.
//!
//! Stands in for file or stream ingestion. Every tick it emits one
//! `channel_count × chunk_size` chunk continuing the waveform from the
//! previous one. Once initialized it publishes the attributes downstream
//! stages resolve: `source_name`, `sampling_rate`, `channel_layout` and `dtype`.

use crate::config::SourceConfig;
use crate::pipeline::attribute::{names, AttributeValue, ChannelLayout};
use crate::pipeline::contract::StageContract;
use crate::pipeline::error::StageResult;
use crate::pipeline::node::{InitContext, NodeRole, Stage, UpdateContext};
use crate::pipeline::param::ParamValue;
use std::f64::consts::TAU;
use std::sync::Arc;

/// Upper bound on channels accepted through `channel_count`.
pub const MAX_CHANNELS: i64 = 4096;

/// Upper bound on `channel_count × chunk_size` for one emitted chunk.
pub const MAX_CHUNK_SAMPLES: i64 = 1 << 22;

/// Upper bound on `sampling_rate`, in Hz.
pub const MAX_SAMPLING_RATE: f64 = 1.0e7;

/// Synthetic source node.
pub struct SyntheticSource {
    source_name: String,
    sampling_rate: f64,
    channel_count: usize,
    chunk_size: usize,
    frequency_hz: f64,
    amplitude: f64,
    /// Published layout, rebuilt whenever rate or channel count change.
    layout: Arc<ChannelLayout>,
    /// Samples emitted since the last (re)initialization.
    position: u64,
    /// Attributes are only published after the first initialization.
    initialized: bool,
    contract: StageContract,
}

impl SyntheticSource {
    pub fn new(
        source_name: impl Into<String>,
        channel_count: usize,
        sampling_rate: f64,
        chunk_size: usize,
    ) -> Self {
        let contract = StageContract::builder()
            .resets_on(&[
                "sampling_rate",
                "channel_count",
                "chunk_size",
                "frequency_hz",
                "amplitude",
            ])
            .finish();

        Self {
            source_name: source_name.into(),
            sampling_rate,
            channel_count,
            chunk_size,
            frequency_hz: 10.0,
            amplitude: 1.0,
            layout: Arc::new(ChannelLayout::uniform(sampling_rate, channel_count)),
            position: 0,
            initialized: false,
            contract,
        }
    }

    pub fn from_config(config: &SourceConfig) -> Self {
        let mut source = Self::new(
            config.source_name.clone(),
            config.channel_count,
            config.sampling_rate,
            config.chunk_size,
        );
        source.frequency_hz = config.frequency_hz;
        source.amplitude = config.amplitude;
        source
    }

    pub fn with_frequency(mut self, frequency_hz: f64) -> Self {
        self.frequency_hz = frequency_hz;
        self
    }

    pub fn with_amplitude(mut self, amplitude: f64) -> Self {
        self.amplitude = amplitude;
        self
    }

    pub fn layout(&self) -> &ChannelLayout {
        &self.layout
    }

    /// Samples emitted since the last reset.
    pub fn position(&self) -> u64 {
        self.position
    }

    fn rebuild_layout(&mut self) {
        self.layout = Arc::new(ChannelLayout::uniform(self.sampling_rate, self.channel_count));
    }
}

fn check_chunk_samples(channels: i64, chunk_size: i64) -> Result<(), String> {
    match channels.checked_mul(chunk_size) {
        Some(n) if n <= MAX_CHUNK_SAMPLES => Ok(()),
        _ => Err(format!(
            "{channels} channels x {chunk_size} samples exceeds {MAX_CHUNK_SAMPLES} samples per chunk"
        )),
    }
}

impl Stage for SyntheticSource {
    fn name(&self) -> &str {
        "SyntheticSource"
    }

    fn role(&self) -> NodeRole {
        NodeRole::Source
    }

    fn contract(&self) -> &StageContract {
        &self.contract
    }

    fn attribute(&self, name: &str) -> Option<AttributeValue> {
        if !self.initialized {
            return None;
        }
        match name {
            names::SOURCE_NAME => Some(AttributeValue::Text(self.source_name.clone())),
            names::SAMPLING_RATE => Some(AttributeValue::Float(self.sampling_rate)),
            names::CHANNEL_LAYOUT => Some(AttributeValue::Layout(Arc::clone(&self.layout))),
            names::DTYPE => Some(AttributeValue::Text("f64".to_string())),
            _ => None,
        }
    }

    fn parameter(&self, name: &str) -> Option<ParamValue> {
        match name {
            "sampling_rate" => Some(ParamValue::Float(self.sampling_rate)),
            "channel_count" => Some(ParamValue::Int(self.channel_count as i64)),
            "chunk_size" => Some(ParamValue::Int(self.chunk_size as i64)),
            "frequency_hz" => Some(ParamValue::Float(self.frequency_hz)),
            "amplitude" => Some(ParamValue::Float(self.amplitude)),
            _ => None,
        }
    }

    fn validate_parameter(&self, name: &str, value: &ParamValue) -> Result<(), String> {
        match name {
            "sampling_rate" => match value.as_float() {
                Some(v) if v > 0.0 && v <= MAX_SAMPLING_RATE => Ok(()),
                _ => Err(format!(
                    "sampling rate must be in (0, {MAX_SAMPLING_RATE}] Hz"
                )),
            },
            "channel_count" => match value.as_int() {
                Some(v) if (1..=MAX_CHANNELS).contains(&v) => {
                    check_chunk_samples(v, self.chunk_size as i64)
                }
                _ => Err(format!("channel count must be in 1..={MAX_CHANNELS}")),
            },
            "chunk_size" => match value.as_int() {
                Some(v) if v >= 1 => check_chunk_samples(self.channel_count as i64, v),
                _ => Err("chunk size must be at least 1".to_string()),
            },
            "frequency_hz" => match value.as_float() {
                Some(v) if v.is_finite() && v >= 0.0 => Ok(()),
                _ => Err("frequency must be a non-negative number".to_string()),
            },
            "amplitude" => match value.as_float() {
                Some(v) if v.is_finite() => Ok(()),
                _ => Err("amplitude must be a finite number".to_string()),
            },
            _ => Ok(()),
        }
    }

    fn apply_parameter(&mut self, name: &str, value: ParamValue) {
        match name {
            "sampling_rate" => {
                if let Some(v) = value.as_float() {
                    self.sampling_rate = v;
                    self.rebuild_layout();
                }
            }
            "channel_count" => {
                if let Some(v) = value.as_int() {
                    self.channel_count = v as usize;
                    self.rebuild_layout();
                }
            }
            "chunk_size" => {
                if let Some(v) = value.as_int() {
                    self.chunk_size = v as usize;
                }
            }
            "frequency_hz" => {
                if let Some(v) = value.as_float() {
                    self.frequency_hz = v;
                }
            }
            "amplitude" => {
                if let Some(v) = value.as_float() {
                    self.amplitude = v;
                }
            }
            _ => {}
        }
    }

    fn initialize(&mut self, _ctx: &InitContext) -> StageResult<()> {
        self.position = 0;
        self.initialized = true;
        tracing::debug!(
            "SyntheticSource '{}': {} ch @ {} Hz, {} samples/chunk",
            self.source_name,
            self.channel_count,
            self.sampling_rate,
            self.chunk_size
        );
        Ok(())
    }

    fn reset(&mut self) -> StageResult<()> {
        self.position = 0;
        Ok(())
    }

    fn update(&mut self, ctx: &mut UpdateContext) -> StageResult<()> {
        let (channels, columns) = (self.channel_count, self.chunk_size);
        ctx.output.resize(channels, columns);

        let step = TAU * self.frequency_hz / self.sampling_rate;
        for channel in 0..channels {
            // Spread channels over a quarter period so they are distinguishable.
            let phase = channel as f64 * TAU / (4.0 * channels.max(1) as f64);
            let row = ctx.output.row_mut(channel);
            for (j, sample) in row.iter_mut().enumerate() {
                let n = (self.position + j as u64) as f64;
                *sample = self.amplitude * (step * n + phase).sin();
            }
        }
        self.position += columns as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::chunk::Chunk;
    use crate::pipeline::id::NodeId;
    use std::time::Duration;

    fn run_update(source: &mut SyntheticSource, out: &mut Chunk) {
        let mut ctx = UpdateContext {
            input: None,
            output: out,
            timestamp: Duration::ZERO,
            dt: Duration::ZERO,
            tick: 0,
        };
        source.update(&mut ctx).unwrap();
    }

    fn initialize(source: &mut SyntheticSource) {
        let ctx = InitContext {
            node: NodeId(0),
            upstream: None,
            ancestors: &[],
        };
        source.initialize(&ctx).unwrap();
    }

    #[test]
    fn test_chunk_shape() {
        let mut source = SyntheticSource::new("sine", 3, 250.0, 25);
        let mut out = Chunk::new();
        run_update(&mut source, &mut out);
        assert_eq!(out.shape(), (3, 25));
        assert_eq!(source.position(), 25);
    }

    #[test]
    fn test_consecutive_chunks_are_continuous() {
        let mut a = SyntheticSource::new("sine", 1, 100.0, 10);
        let mut b = SyntheticSource::new("sine", 1, 100.0, 20);
        let (mut first, mut second, mut whole) = (Chunk::new(), Chunk::new(), Chunk::new());
        run_update(&mut a, &mut first);
        run_update(&mut a, &mut second);
        run_update(&mut b, &mut whole);

        let joined: Vec<f64> = first.row(0).iter().chain(second.row(0)).copied().collect();
        for (x, y) in joined.iter().zip(whole.row(0)) {
            assert!((x - y).abs() < 1e-12);
        }
    }

    #[test]
    fn test_attributes_published_after_initialize() {
        let mut source = SyntheticSource::new("sine", 2, 100.0, 10);
        assert!(source.attribute(names::SAMPLING_RATE).is_none());
        initialize(&mut source);
        assert_eq!(
            source.attribute(names::SAMPLING_RATE),
            Some(AttributeValue::Float(100.0))
        );
        assert_eq!(
            source.attribute(names::DTYPE),
            Some(AttributeValue::Text("f64".into()))
        );
    }

    #[test]
    fn test_layout_follows_parameters() {
        let mut source = SyntheticSource::new("sine", 2, 100.0, 10);
        initialize(&mut source);
        source.apply_parameter("channel_count", ParamValue::Int(5));
        let layout = source.attribute(names::CHANNEL_LAYOUT).unwrap();
        assert_eq!(layout.as_layout().unwrap().channel_count(), 5);
    }

    #[test]
    fn test_validation() {
        let source = SyntheticSource::new("sine", 2, 100.0, 10);
        assert!(source
            .validate_parameter("sampling_rate", &ParamValue::Float(0.0))
            .is_err());
        assert!(source
            .validate_parameter("channel_count", &ParamValue::Int(0))
            .is_err());
        assert!(source
            .validate_parameter("amplitude", &ParamValue::Float(f64::NAN))
            .is_err());
        assert!(source
            .validate_parameter("frequency_hz", &ParamValue::Int(12))
            .is_ok());
    }

    #[test]
    fn test_chunk_size_is_bounded_by_channel_count() {
        let source = SyntheticSource::new("sine", 4, 100.0, 10);
        assert!(source
            .validate_parameter("chunk_size", &ParamValue::Int(i64::MAX))
            .is_err());
        assert!(source
            .validate_parameter("chunk_size", &ParamValue::Int(MAX_CHUNK_SAMPLES / 4))
            .is_ok());
        assert!(source
            .validate_parameter("chunk_size", &ParamValue::Int(MAX_CHUNK_SAMPLES / 4 + 1))
            .is_err());

        let wide = SyntheticSource::new("sine", 1, 100.0, MAX_CHUNK_SAMPLES as usize);
        assert!(wide
            .validate_parameter("channel_count", &ParamValue::Int(2))
            .is_err());
        assert!(source
            .validate_parameter("sampling_rate", &ParamValue::Float(1e300))
            .is_err());
    }
}
