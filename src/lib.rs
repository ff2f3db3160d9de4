//! # Neurochain: real-time multichannel signal pipeline
//!
//! A dataflow engine for streaming biosignal data. A chain of nodes (one
//! source, a sequence of processors and a fan-out of outputs) pulls
//! fixed-size chunks at a steady tick rate and pushes transformed output to
//! sinks.
//!
//! ## Architecture
//!
//! - **Stages**: sources, processors and outputs implement the `Stage` trait and
//!   declare what they react to in a `StageContract`
//! - **Orchestrator**: `Pipeline` owns the node arena, resolves upstream
//!   attributes, drives resets/reinitializations and propagates messages
//! - **Scheduler**: runs `Pipeline::tick` at a fixed rate on one worker thread
//! - **Communication**: crossbeam channels carry output chunks and scheduler
//!   events to the host
//!
//! ## Configuration
//!
//! A TOML file under the platform data directory (`neurochain/neurochain.toml`)
//! holds the scheduler, logging, source and limits sections.
//!
//! ## Example
//!
//! ```ignore
//! use neurochain::{
//!     config::PipelineConfig,
//!     pipeline::{PipelineBuilder, Scheduler},
//! };
//!
//! let config = PipelineConfig::default();
//! let (mut pipeline, ids, chunks) = PipelineBuilder::new(config.clone()).gain(2.0).build()?;
//! pipeline.initialize_all()?;
//!
//! let mut scheduler = Scheduler::new(pipeline, config.scheduler)?;
//! scheduler.start()?;
//! scheduler.with_pipeline(|p| p.set_parameter(ids.gain, "gain", 4.0))??;
//! let chunk = chunks.recv()?;
//! scheduler.stop()?;
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use error::{NeurochainError, Result, ResultExt};
pub use pipeline::{
    NodeId, ParamValue, Pipeline, PipelineBuilder, PipelineError, Scheduler, Stage, TickReport,
};
