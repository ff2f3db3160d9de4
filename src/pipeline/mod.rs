//! Chunked multichannel dataflow engine.
//!
//! A linear chain of nodes (one source, then processors) with output nodes
//! branching off any earlier node. The scheduler drives the orchestrator once
//! per tick; the orchestrator updates nodes in topological order.
//!
//! # Architecture
//!
//! ```text
//! [SyntheticSource] ──► [Gain] ──► [WindowedLimits]
//!                              └──► [ChannelSink] ──► host
//! ```
//!
//! # Design
//!
//! - **Node arena**: flat `Vec<NodeSlot>` with `NodeId` as index; upstream
//!   links always point backwards, so arena order is topological.
//! - **Declarative contracts**: each stage declares its local-reset parameters
//!   and the upstream attributes it observes, each with a fingerprint function.
//! - **Pure resolver**: attribute lookup walks upstream links over the arena.
//! - **Synchronous messages**: a reinitialization reaches every descendant
//!   before any of them updates again.
//! - **Enum dispatch on hot path**: `BuiltinStage` for built-in stages,
//!   trait objects for plugins.
//! - **Dedicated thread**: the scheduler owns one worker; ticks never overlap.

pub mod attribute;
pub mod chunk;
pub mod contract;
pub mod error;
pub mod executor;
pub mod id;
pub mod message;
pub mod node;
pub mod nodes;
pub mod param;
pub mod resolver;
pub mod ring_buffer;
pub mod scheduler;
pub mod slot;

pub use attribute::{
    channel_labels_fingerprint, layout_fingerprint, names, scalar_fingerprint, AttributeValue,
    ChannelKind, ChannelLayout, Fingerprint, FingerprintFn, FingerprintPart,
};
pub use chunk::Chunk;
pub use contract::{ObservedAttribute, StageContract, StageContractBuilder};
pub use error::{PipelineError, PipelineResult, StageError, StageResult, StuckNode};
pub use executor::{
    NodeSnapshot, Pipeline, PipelineBuilder, PipelineNodeIds, PipelineSnapshot, TickReport,
};
pub use id::NodeId;
pub use message::Message;
pub use node::{AnyStage, BuiltinStage, InitContext, NodeRole, NodeState, Stage, UpdateContext};
pub use nodes::{
    percentile, ChannelSink, Gain, LimitsMode, SinkChunk, SyntheticSource, WindowedLimits,
};
pub use param::ParamValue;
pub use resolver::Resolved;
pub use ring_buffer::RingBuffer;
pub use scheduler::{Scheduler, SchedulerEvent, SchedulerStats};
pub use slot::{NodeFailure, NodeSlot, NodeStats};
