//! Pipeline orchestrator: owns the node arena and drives one tick.
//!
//! Nodes live in a flat `Vec<NodeSlot>` indexed by `NodeId`. Every node's
//! upstream link points at a node inserted earlier, so arena order is already
//! a topological order and no sort is ever needed. Each tick:
//! 1. Check every node's observed upstream attributes against its snapshot.
//! 2. Drive pending reset / reinitialization; deliver the resulting message
//!    to every descendant before anything downstream updates.
//! 3. Call `update()`, reading the upstream node's output of this tick.
//!
//! A failing node is marked `Error` and its descendants are skipped for the
//! tick. Sibling branches keep running.

use crate::config::PipelineConfig;
use crate::pipeline::attribute::AttributeValue;
use crate::pipeline::chunk::Chunk;
use crate::pipeline::error::{PipelineError, PipelineResult, StuckNode};
use crate::pipeline::id::NodeId;
use crate::pipeline::message::Message;
use crate::pipeline::node::{AnyStage, DetachedStage, NodeRole, NodeState, UpdateContext};
use crate::pipeline::nodes::{ChannelSink, Gain, SinkChunk, SyntheticSource, WindowedLimits};
use crate::pipeline::param::ParamValue;
use crate::pipeline::resolver;
use crate::pipeline::slot::{NodeFailure, NodeSlot, NodeStats};
use crossbeam_channel::Receiver;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Outcome of one `Pipeline::tick`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickReport {
    pub tick: u64,
    /// Nodes whose `update()` succeeded, in execution order.
    pub updated: Vec<NodeId>,
    /// Nodes not updated: not initialized, failed earlier, or downstream of
    /// a node that failed or was skipped this tick.
    pub skipped: Vec<NodeId>,
    pub failures: Vec<NodeFailure>,
    pub messages_delivered: u64,
    pub duration: Duration,
}

impl TickReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Serializable view of one node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub name: String,
    pub role: NodeRole,
    pub state: NodeState,
    pub upstream: Option<NodeId>,
    pub receivers: Vec<NodeId>,
    pub output_shape: (usize, usize),
    pub stats: NodeStats,
    pub last_failure: Option<NodeFailure>,
}

/// Serializable view of the whole pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSnapshot {
    pub tick: u64,
    pub nodes: Vec<NodeSnapshot>,
}

/// The node chain plus its output branches.
#[derive(Default)]
pub struct Pipeline {
    nodes: Vec<NodeSlot>,
    source: Option<NodeId>,
    /// Last node of the main chain (source or last processor).
    tail: Option<NodeId>,
    tick: u64,
    start_time: Option<Instant>,
    last_tick_time: Option<Instant>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Graph building ──

    /// Install the source. A pipeline has exactly one and it cannot be replaced.
    pub fn set_source(&mut self, stage: impl Into<AnyStage>) -> PipelineResult<NodeId> {
        if self.source.is_some() {
            return Err(PipelineError::SourceAlreadySet);
        }
        let stage = stage.into();
        check_attachable(&stage, NodeRole::Source)?;
        let id = self.insert(stage, None);
        self.source = Some(id);
        self.tail = Some(id);
        tracing::info!("Source {} '{}' set", id, self.nodes[id.index()].stage.name());
        Ok(id)
    }

    /// Append a processor to the end of the main chain.
    pub fn add_processor(&mut self, stage: impl Into<AnyStage>) -> PipelineResult<NodeId> {
        let tail = self.tail.ok_or(PipelineError::NoSource)?;
        let stage = stage.into();
        check_attachable(&stage, NodeRole::Processor)?;
        let id = self.insert(stage, Some(tail));
        self.tail = Some(id);
        tracing::info!(
            "Processor {} '{}' attached to {}",
            id,
            self.nodes[id.index()].stage.name(),
            tail
        );
        Ok(id)
    }

    /// Attach an output to `attach_to`, or to the chain tail when `None`.
    pub fn add_output(
        &mut self,
        stage: impl Into<AnyStage>,
        attach_to: Option<NodeId>,
    ) -> PipelineResult<NodeId> {
        let tail = self.tail.ok_or(PipelineError::NoSource)?;
        let upstream = attach_to.unwrap_or(tail);
        self.node(upstream)?;
        let stage = stage.into();
        check_attachable(&stage, NodeRole::Output)?;
        let id = self.insert(stage, Some(upstream));
        tracing::info!(
            "Output {} '{}' attached to {}",
            id,
            self.nodes[id.index()].stage.name(),
            upstream
        );
        Ok(id)
    }

    /// Detach an output node. The stage is dropped and the slot kept as a
    /// tombstone; ids are never reused.
    pub fn detach_output(&mut self, id: NodeId) -> PipelineResult<()> {
        let slot = self.node(id)?;
        if slot.role != NodeRole::Output {
            return Err(PipelineError::InvalidAttachment(format!(
                "{id} is a {:?}, only outputs can be detached",
                slot.role
            )));
        }
        if !slot.receivers.is_empty() {
            return Err(PipelineError::InvalidAttachment(format!(
                "{id} still has {} output(s) attached",
                slot.receivers.len()
            )));
        }
        if let Some(upstream) = slot.upstream {
            self.nodes[upstream.index()].receivers.retain(|r| *r != id);
        }
        let slot = &mut self.nodes[id.index()];
        let tombstone = AnyStage::plugin(DetachedStage::new(slot.stage.name()));
        let stage = std::mem::replace(&mut slot.stage, tombstone);
        slot.detached = true;
        slot.output.clear();
        tracing::info!("Output {} '{}' detached", id, stage.name());
        Ok(())
    }

    fn insert(&mut self, stage: AnyStage, upstream: Option<NodeId>) -> NodeId {
        let id = NodeId::from_index(self.nodes.len());
        if let Some(up) = upstream {
            self.nodes[up.index()].receivers.push(id);
        }
        self.nodes.push(NodeSlot::new(stage, upstream));
        id
    }

    /// Run the stage's own validation over its current values of `params`.
    ///
    /// Used for values that were set through a constructor rather than
    /// `set_parameter`.
    fn check_parameters(&self, id: NodeId, params: &[&str]) -> PipelineResult<()> {
        for name in params {
            let value = self.parameter(id, name)?;
            self.node(id)?
                .stage
                .as_stage()
                .validate_parameter(name, &value)
                .map_err(|reason| PipelineError::Validation {
                    node: id,
                    parameter: name.to_string(),
                    reason,
                })?;
        }
        Ok(())
    }

    // ── Queries ──

    /// Slot of a live (not detached) node.
    pub fn node(&self, id: NodeId) -> PipelineResult<&NodeSlot> {
        self.nodes
            .get(id.index())
            .filter(|slot| !slot.detached)
            .ok_or(PipelineError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> PipelineResult<&mut NodeSlot> {
        self.nodes
            .get_mut(id.index())
            .filter(|slot| !slot.detached)
            .ok_or(PipelineError::UnknownNode(id))
    }

    /// Live nodes in topological order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &NodeSlot)> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, slot)| !slot.detached)
            .map(|(i, slot)| (NodeId::from_index(i), slot))
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn source(&self) -> Option<NodeId> {
        self.source
    }

    pub fn tail(&self) -> Option<NodeId> {
        self.tail
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn state(&self, id: NodeId) -> PipelineResult<NodeState> {
        Ok(self.node(id)?.state)
    }

    pub fn node_stats(&self, id: NodeId) -> PipelineResult<&NodeStats> {
        Ok(&self.node(id)?.stats)
    }

    pub fn last_failure(&self, id: NodeId) -> PipelineResult<Option<&NodeFailure>> {
        Ok(self.node(id)?.last_failure.as_ref())
    }

    /// Last chunk produced by `id`.
    pub fn output(&self, id: NodeId) -> PipelineResult<&Chunk> {
        Ok(&self.node(id)?.output)
    }

    /// Resolve `attribute` for `id` from its ancestors.
    pub fn resolve(&self, id: NodeId, attribute: &str) -> PipelineResult<AttributeValue> {
        self.node(id)?;
        resolver::resolve(&self.nodes, id, attribute).map(|r| r.value)
    }

    // ── Parameters ──

    /// Validate and apply a parameter. Returns whether the value changed.
    pub fn set_parameter(
        &mut self,
        id: NodeId,
        name: &str,
        value: impl Into<ParamValue>,
    ) -> PipelineResult<bool> {
        self.node_mut(id)?.set_parameter(id, name, value.into())
    }

    pub fn parameter(&self, id: NodeId, name: &str) -> PipelineResult<ParamValue> {
        self.node(id)?
            .stage
            .as_stage()
            .parameter(name)
            .ok_or_else(|| PipelineError::UnknownParameter {
                node: id,
                name: name.to_string(),
            })
    }

    // ── Lifecycle ──

    /// Initialize every uninitialized node in topological order.
    ///
    /// A node is attempted once its upstream is active. Passes repeat while
    /// the previous one made progress; whatever is still not active after
    /// that is reported in `InitializationIncomplete`. Nodes that are already
    /// active are left alone, so this can be called again after attaching
    /// new outputs.
    pub fn initialize_all(&mut self) -> PipelineResult<()> {
        if self.source.is_none() {
            return Err(PipelineError::NoSource);
        }

        let mut passes = 0;
        let mut initialized = 0;
        let mut reasons: Vec<Option<String>> = vec![None; self.nodes.len()];
        loop {
            passes += 1;
            let mut progress = false;

            for i in 0..self.nodes.len() {
                let (ancestors, rest) = self.nodes.split_at_mut(i);
                let slot = &mut rest[0];
                if slot.detached || slot.state != NodeState::Uninitialized {
                    continue;
                }
                let id = NodeId::from_index(i);
                if let Some(up) = slot.upstream {
                    let up_state = ancestors[up.index()].state;
                    if !up_state.is_active() {
                        reasons[i] = Some(format!("upstream {up} is {up_state}"));
                        continue;
                    }
                }

                match slot.initialize(id, ancestors) {
                    Ok(()) => {
                        progress = true;
                        initialized += 1;
                        reasons[i] = None;
                        tracing::debug!("{} '{}' initialized", id, slot.stage.name());
                    }
                    Err(e) if e.is_retryable() => {
                        reasons[i] = Some(e.to_string());
                    }
                    Err(e) => {
                        tracing::warn!("{} '{}' failed to initialize: {}", id, slot.stage.name(), e);
                        slot.record_failure(id, &e, self.tick);
                        reasons[i] = Some(e.to_string());
                    }
                }
            }

            if !progress {
                break;
            }
        }

        let stuck: Vec<StuckNode> = self
            .nodes()
            .filter(|(_, slot)| !slot.state.is_active())
            .map(|(id, slot)| StuckNode {
                node: id,
                name: slot.stage.name().to_string(),
                reason: reasons[id.index()]
                    .clone()
                    .unwrap_or_else(|| slot.state.to_string()),
            })
            .collect();

        if stuck.is_empty() {
            tracing::info!("Initialized {} node(s) in {} pass(es)", initialized, passes);
            Ok(())
        } else {
            tracing::warn!("Initialization incomplete: {} node(s) stuck", stuck.len());
            Err(PipelineError::InitializationIncomplete { stuck })
        }
    }

    /// Ask for a full reinitialization of `id` on the next tick.
    ///
    /// This is the only way out of `Error`.
    pub fn request_reinitialization(&mut self, id: NodeId) -> PipelineResult<()> {
        let slot = self.node_mut(id)?;
        match slot.state {
            NodeState::Uninitialized | NodeState::Initializing => Err(PipelineError::NotReady {
                node: id,
                state: slot.state.to_string(),
            }),
            _ => {
                tracing::debug!("{} '{}': reinitialization requested", id, slot.stage.name());
                slot.state = NodeState::NeedsReinitialization;
                slot.descendants_notified = false;
                Ok(())
            }
        }
    }

    /// Report a discontinuity in `id`'s output. Every descendant is told
    /// before its next update. Returns the number of deliveries.
    pub fn notify_discontinuity(&mut self, id: NodeId) -> PipelineResult<u64> {
        self.node(id)?;
        tracing::debug!("{}: output discontinuity", id);
        Ok(self.propagate(Message::discontinuity(id)))
    }

    /// Deliver `message` from its origin to every reachable descendant,
    /// hop by hop. Each receiver handles it once and passes it on.
    fn propagate(&mut self, message: Message) -> u64 {
        let mut delivered = 0;
        let mut pending: Vec<(NodeId, Message)> = self.nodes[message.origin.index()]
            .receivers
            .iter()
            .rev()
            .map(|r| (*r, message.forwarded()))
            .collect();

        while let Some((id, message)) = pending.pop() {
            let (ancestors, rest) = self.nodes.split_at_mut(id.index());
            let slot = &mut rest[0];
            let next = slot.receive_message(id, &message, ancestors);
            delivered += 1;
            tracing::trace!("{} received message from {} ({} hops)", id, message.origin, message.hops);
            pending.extend(slot.receivers.iter().rev().map(|r| (*r, next)));
        }
        delivered
    }

    // ── Tick execution ──

    /// Run every node once, in topological order.
    pub fn tick(&mut self) -> TickReport {
        let started = Instant::now();
        let start = *self.start_time.get_or_insert(started);
        let timestamp = started.duration_since(start);
        let dt = self
            .last_tick_time
            .map(|t| started.duration_since(t))
            .unwrap_or(Duration::ZERO);
        self.last_tick_time = Some(started);

        let tick = self.tick;
        let mut report = TickReport {
            tick,
            ..TickReport::default()
        };
        // Nodes whose output is not valid this tick; their descendants skip.
        let mut blocked = vec![false; self.nodes.len()];

        for i in 0..self.nodes.len() {
            if self.nodes[i].detached {
                continue;
            }
            let id = NodeId::from_index(i);
            let upstream_blocked = self.nodes[i].upstream.is_some_and(|u| blocked[u.index()]);
            let runnable = !upstream_blocked && self.nodes[i].state.is_active();
            if !runnable {
                blocked[i] = true;
                report.skipped.push(id);
                continue;
            }

            if let Err(e) = self.prepare(id, &mut report) {
                self.fail(id, &e, &mut report);
                blocked[i] = true;
                continue;
            }

            let (ancestors, rest) = self.nodes.split_at_mut(i);
            let slot = &mut rest[0];
            let input = slot.upstream.map(|u| &ancestors[u.index()].output);
            let mut ctx = UpdateContext {
                input,
                output: &mut slot.output,
                timestamp,
                dt,
                tick,
            };
            match slot.stage.update(&mut ctx) {
                Ok(()) => {
                    slot.stats.updates += 1;
                    report.updated.push(id);
                }
                Err(e) => {
                    let e = e.into_pipeline_error(id);
                    self.fail(id, &e, &mut report);
                    blocked[i] = true;
                }
            }
        }

        self.tick += 1;
        report.duration = started.elapsed();
        tracing::trace!(
            "tick {}: {} updated, {} skipped in {:?}",
            tick,
            report.updated.len(),
            report.skipped.len(),
            report.duration
        );
        report
    }

    /// Bring `id` to `Ready` before its update: fingerprint check, then
    /// reset or reinitialize (propagating the resulting message).
    fn prepare(&mut self, id: NodeId, report: &mut TickReport) -> PipelineResult<()> {
        let (ancestors, rest) = self.nodes.split_at_mut(id.index());
        let slot = &mut rest[0];
        slot.check_observed(id, ancestors);

        match slot.state {
            NodeState::NeedsReset => slot.reset(id),
            NodeState::NeedsReinitialization => {
                match slot.reinitialize(id, ancestors)? {
                    Some(message) => report.messages_delivered += self.propagate(message),
                    None => tracing::trace!("{}: descendants already notified this round", id),
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn fail(&mut self, id: NodeId, error: &PipelineError, report: &mut TickReport) {
        let slot = &mut self.nodes[id.index()];
        tracing::warn!("{} '{}' failed on tick {}: {}", id, slot.stage.name(), self.tick, error);
        slot.record_failure(id, error, self.tick);
        report.failures.extend(slot.last_failure.clone());
    }

    // ── Introspection ──

    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            tick: self.tick,
            nodes: self
                .nodes()
                .map(|(id, slot)| NodeSnapshot {
                    id,
                    name: slot.stage.name().to_string(),
                    role: slot.role,
                    state: slot.state,
                    upstream: slot.upstream,
                    receivers: slot.receivers.clone(),
                    output_shape: slot.output.shape(),
                    stats: slot.stats.clone(),
                    last_failure: slot.last_failure.clone(),
                })
                .collect(),
        }
    }
}

/// Role must match the attachment point and the contract must be valid.
fn check_attachable(stage: &AnyStage, role: NodeRole) -> PipelineResult<()> {
    if stage.role() != role {
        return Err(PipelineError::InvalidAttachment(format!(
            "'{}' is a {:?}, expected a {:?}",
            stage.name(),
            stage.role(),
            role
        )));
    }
    stage.contract().validate()
}

/// Node ids of the demo pipeline built by [`PipelineBuilder`].
#[derive(Debug, Clone, Copy)]
pub struct PipelineNodeIds {
    pub source: NodeId,
    pub gain: NodeId,
    pub limits: NodeId,
    pub sink: NodeId,
}

/// Builds the default chain: `SyntheticSource → Gain → {WindowedLimits, ChannelSink}`.
pub struct PipelineBuilder {
    config: PipelineConfig,
    gain: f64,
    sink_capacity: usize,
}

impl PipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            gain: 1.0,
            sink_capacity: 64,
        }
    }

    pub fn gain(mut self, gain: f64) -> Self {
        self.gain = gain;
        self
    }

    pub fn sink_capacity(mut self, capacity: usize) -> Self {
        self.sink_capacity = capacity;
        self
    }

    pub fn build(self) -> PipelineResult<(Pipeline, PipelineNodeIds, Receiver<SinkChunk>)> {
        let mut pipeline = Pipeline::new();
        let source = pipeline.set_source(SyntheticSource::from_config(&self.config.source))?;
        pipeline.check_parameters(source, &["sampling_rate", "chunk_size", "channel_count"])?;
        let gain = pipeline.add_processor(Gain::new(self.gain))?;
        let limits = pipeline.add_output(
            WindowedLimits::new(self.config.limits.mode, self.config.limits.buffer_length),
            None,
        )?;
        pipeline.check_parameters(limits, &["buffer_length"])?;
        let (sink, rx) = ChannelSink::new(self.sink_capacity);
        let sink = pipeline.add_output(sink, Some(gain))?;

        let ids = PipelineNodeIds {
            source,
            gain,
            limits,
            sink,
        };
        tracing::info!("Built pipeline with {} nodes", pipeline.len());
        Ok((pipeline, ids, rx))
    }
}
