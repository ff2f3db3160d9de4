//! Built-in pipeline stages.

pub mod channel_sink;
pub mod gain;
pub mod synthetic_source;
pub mod windowed_limits;

pub use channel_sink::{ChannelSink, SinkChunk};
pub use gain::Gain;
pub use synthetic_source::SyntheticSource;
pub use windowed_limits::{percentile, ColormapLimits, LimitsMode, WindowedLimits};
