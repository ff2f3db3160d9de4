//! ChannelSink node: forwards chunks to the host over a bounded channel.
//!
//! The host keeps the `Receiver` returned by [`ChannelSink::new`]. Sending
//! never blocks the tick: when the channel is full the chunk is dropped and
//! counted.

use crate::pipeline::attribute::{
    layout_fingerprint, names, scalar_fingerprint, AttributeValue, ChannelLayout,
};
use crate::pipeline::chunk::Chunk;
use crate::pipeline::contract::StageContract;
use crate::pipeline::error::{StageError, StageResult};
use crate::pipeline::node::{InitContext, NodeRole, Stage, UpdateContext};
use crate::pipeline::param::ParamValue;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::Arc;
use std::time::Duration;

/// One chunk as delivered to the host.
#[derive(Debug, Clone)]
pub struct SinkChunk {
    pub stream_name: Arc<str>,
    pub layout: Arc<ChannelLayout>,
    pub dtype: Arc<str>,
    pub tick: u64,
    pub timestamp: Duration,
    pub data: Chunk,
}

pub struct ChannelSink {
    tx: Sender<SinkChunk>,
    /// Host-provided name; empty means `<source_name>_output`.
    requested_name: String,
    stream_name: Arc<str>,
    source_name: String,
    layout: Arc<ChannelLayout>,
    dtype: Arc<str>,
    sent: u64,
    dropped: u64,
    contract: StageContract,
}

impl ChannelSink {
    /// Create a sink with a channel holding at most `capacity` chunks.
    pub fn new(capacity: usize) -> (Self, Receiver<SinkChunk>) {
        let (tx, rx) = bounded(capacity);
        (Self::with_sender(tx), rx)
    }

    pub fn with_sender(tx: Sender<SinkChunk>) -> Self {
        let contract = StageContract::builder()
            .resets_on(&["stream_name"])
            .observes(names::SOURCE_NAME, scalar_fingerprint)
            .observes(names::CHANNEL_LAYOUT, layout_fingerprint)
            .observes(names::DTYPE, scalar_fingerprint)
            .finish();
        Self {
            tx,
            requested_name: String::new(),
            stream_name: Arc::from(""),
            source_name: String::new(),
            layout: Arc::new(ChannelLayout::uniform(0.0, 0)),
            dtype: Arc::from(""),
            sent: 0,
            dropped: 0,
            contract,
        }
    }

    pub fn with_stream_name(mut self, name: impl Into<String>) -> Self {
        self.requested_name = name.into();
        self
    }

    /// Effective stream name. Empty before initialization.
    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn refresh_stream_name(&mut self) {
        let name = if self.requested_name.is_empty() {
            format!("{}_output", self.source_name)
        } else {
            self.requested_name.clone()
        };
        self.stream_name = Arc::from(name);
    }
}

impl Stage for ChannelSink {
    fn name(&self) -> &str {
        "ChannelSink"
    }

    fn role(&self) -> NodeRole {
        NodeRole::Output
    }

    fn contract(&self) -> &StageContract {
        &self.contract
    }

    fn parameter(&self, name: &str) -> Option<ParamValue> {
        match name {
            "stream_name" => Some(ParamValue::String(self.requested_name.clone())),
            _ => None,
        }
    }

    fn validate_parameter(&self, name: &str, value: &ParamValue) -> Result<(), String> {
        match name {
            "stream_name" => value
                .as_str()
                .map(|_| ())
                .ok_or_else(|| "stream name must be a string".to_string()),
            _ => Ok(()),
        }
    }

    fn apply_parameter(&mut self, name: &str, value: ParamValue) {
        if name == "stream_name" {
            if let Some(s) = value.as_str() {
                self.requested_name = s.to_string();
            }
        }
    }

    fn initialize(&mut self, ctx: &InitContext) -> StageResult<()> {
        self.source_name = ctx.resolve_text(names::SOURCE_NAME)?;
        self.layout = match ctx.resolve(names::CHANNEL_LAYOUT)? {
            AttributeValue::Layout(layout) => layout,
            _ => return Err(StageError::compute("channel_layout is not a layout")),
        };
        self.dtype = Arc::from(ctx.resolve_text(names::DTYPE)?);
        self.refresh_stream_name();
        tracing::debug!(
            "ChannelSink '{}': {} channels, dtype {}",
            self.stream_name,
            self.layout.channel_count(),
            self.dtype
        );
        Ok(())
    }

    fn reset(&mut self) -> StageResult<()> {
        self.refresh_stream_name();
        Ok(())
    }

    fn update(&mut self, ctx: &mut UpdateContext) -> StageResult<()> {
        let input = ctx.require_input()?;
        let chunk = SinkChunk {
            stream_name: Arc::clone(&self.stream_name),
            layout: Arc::clone(&self.layout),
            dtype: Arc::clone(&self.dtype),
            tick: ctx.tick,
            timestamp: ctx.timestamp,
            data: input.clone(),
        };
        match self.tx.try_send(chunk) {
            Ok(()) => self.sent += 1,
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                if self.dropped.is_power_of_two() {
                    tracing::warn!(
                        "ChannelSink '{}' dropped {} chunks due to backpressure",
                        self.stream_name,
                        self.dropped
                    );
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                return Err(StageError::compute(format!(
                    "receiver for '{}' was dropped",
                    self.stream_name
                )));
            }
        }
        ctx.output.copy_from(input);
        Ok(())
    }
}
