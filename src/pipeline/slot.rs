//! Node slots and the per-node lifecycle state machine.
//!
//! A `NodeSlot` owns a stage, its output chunk, its lifecycle state and the
//! fingerprints of the upstream attributes it was initialized against. The
//! orchestrator drives the transitions; the slot enforces them.

use crate::pipeline::attribute::Fingerprint;
use crate::pipeline::chunk::Chunk;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::NodeId;
use crate::pipeline::message::Message;
use crate::pipeline::node::{AnyStage, InitContext, NodeRole, NodeState};
use crate::pipeline::param::ParamValue;
use crate::pipeline::resolver;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Per-node counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodeStats {
    pub updates: u64,
    pub initializations: u64,
    pub resets: u64,
    pub reinitializations: u64,
    pub messages_received: u64,
    /// Messages passed on to this node's receivers (counted once per message,
    /// even when the node has no receivers).
    pub messages_forwarded: u64,
    pub failures: u64,
}

/// Last failure recorded against a node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeFailure {
    pub node: NodeId,
    pub name: String,
    pub error: String,
    pub tick: u64,
    pub at: DateTime<Utc>,
}

/// A slot holding a stage, its output buffer and its lifecycle state.
pub struct NodeSlot {
    pub(crate) stage: AnyStage,
    pub(crate) role: NodeRole,
    /// Non-owning link to the predecessor. `None` only for the source.
    pub(crate) upstream: Option<NodeId>,
    /// Direct downstream receivers, in insertion order.
    pub(crate) receivers: Vec<NodeId>,
    pub(crate) state: NodeState,
    pub(crate) output: Chunk,
    snapshots: Vec<(&'static str, Fingerprint)>,
    pub(crate) stats: NodeStats,
    pub(crate) last_failure: Option<NodeFailure>,
    /// Output nodes can be detached; the slot stays as a tombstone.
    pub(crate) detached: bool,
    /// A history-invalid message from upstream already reached every
    /// descendant while this node waited for reinitialization.
    pub(crate) descendants_notified: bool,
}

impl NodeSlot {
    pub fn new(stage: AnyStage, upstream: Option<NodeId>) -> Self {
        let role = stage.role();
        Self {
            stage,
            role,
            upstream,
            receivers: Vec::new(),
            state: NodeState::Uninitialized,
            output: Chunk::new(),
            snapshots: Vec::new(),
            stats: NodeStats::default(),
            last_failure: None,
            detached: false,
            descendants_notified: false,
        }
    }

    pub fn stage(&self) -> &AnyStage {
        &self.stage
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn upstream(&self) -> Option<NodeId> {
        self.upstream
    }

    pub fn output(&self) -> &Chunk {
        &self.output
    }

    pub fn stats(&self) -> &NodeStats {
        &self.stats
    }

    // ── Parameters ──

    /// Validate and apply a parameter. Returns whether the value changed.
    ///
    /// Rejected values leave the stage and the state untouched. A changed
    /// local-reset parameter moves a `Ready` node to `NeedsReset`.
    pub(crate) fn set_parameter(
        &mut self,
        id: NodeId,
        name: &str,
        value: ParamValue,
    ) -> PipelineResult<bool> {
        let stage = self.stage.as_stage_mut();
        let current = stage
            .parameter(name)
            .ok_or_else(|| PipelineError::UnknownParameter {
                node: id,
                name: name.to_string(),
            })?;
        stage
            .validate_parameter(name, &value)
            .map_err(|reason| PipelineError::Validation {
                node: id,
                parameter: name.to_string(),
                reason,
            })?;

        if current == value {
            return Ok(false);
        }
        stage.apply_parameter(name, value);

        if self.state == NodeState::Ready && self.stage.contract().requires_reset(name) {
            tracing::debug!("{} '{}': '{}' changed, needs reset", id, self.stage.name(), name);
            self.state = NodeState::NeedsReset;
        }
        Ok(true)
    }

    // ── Lifecycle ──

    /// Resolve every observed attribute, run stage setup, record snapshots.
    ///
    /// On `MissingDependency` a never-initialized node stays `Uninitialized`
    /// so a later pass can retry; every other failure leaves it in `Error`.
    pub(crate) fn initialize(&mut self, id: NodeId, ancestors: &[NodeSlot]) -> PipelineResult<()> {
        let previous = self.state;
        self.state = NodeState::Initializing;

        match self.try_initialize(id, ancestors) {
            Ok(snapshots) => {
                self.snapshots = snapshots;
                self.state = NodeState::Ready;
                self.stats.initializations += 1;
                Ok(())
            }
            Err(e) => {
                let first_attempt = matches!(
                    previous,
                    NodeState::Uninitialized | NodeState::Initializing
                );
                self.state = if e.is_retryable() && first_attempt {
                    NodeState::Uninitialized
                } else {
                    NodeState::Error
                };
                Err(e)
            }
        }
    }

    fn try_initialize(
        &mut self,
        id: NodeId,
        ancestors: &[NodeSlot],
    ) -> PipelineResult<Vec<(&'static str, Fingerprint)>> {
        let mut snapshots = Vec::with_capacity(self.stage.contract().observed().len());
        for observed in self.stage.contract().observed() {
            let resolved = resolver::resolve_for_init(ancestors, id, self.upstream, observed.name)?;
            snapshots.push((observed.name, observed.fingerprint_of(&resolved.value)));
        }

        let ctx = InitContext {
            node: id,
            upstream: self.upstream,
            ancestors,
        };
        self.stage
            .as_stage_mut()
            .initialize(&ctx)
            .map_err(|e| e.into_pipeline_error(id))?;
        Ok(snapshots)
    }

    /// `NeedsReset → Ready` without re-resolving upstream attributes.
    pub(crate) fn reset(&mut self, id: NodeId) -> PipelineResult<()> {
        match self.stage.as_stage_mut().reset() {
            Ok(()) => {
                self.state = NodeState::Ready;
                self.stats.resets += 1;
                tracing::debug!("{} '{}' reset", id, self.stage.name());
                Ok(())
            }
            Err(e) => {
                self.state = NodeState::Error;
                Err(e.into_pipeline_error(id))
            }
        }
    }

    /// Full initialization whose result invalidates this node's output history.
    ///
    /// Returns the message to deliver to the node's receivers, or `None` when
    /// an upstream message already invalidated their history this round.
    pub(crate) fn reinitialize(
        &mut self,
        id: NodeId,
        ancestors: &[NodeSlot],
    ) -> PipelineResult<Option<Message>> {
        let notified = std::mem::take(&mut self.descendants_notified);
        self.initialize(id, ancestors)?;
        self.stats.reinitializations += 1;
        tracing::debug!("{} '{}' reinitialized", id, self.stage.name());
        Ok((!notified).then(|| Message::reinitialized(id)))
    }

    /// Whether any observed attribute's current fingerprint differs from the
    /// one recorded at initialization. An attribute that can no longer be
    /// resolved counts as changed.
    pub(crate) fn observed_changed(&self, id: NodeId, ancestors: &[NodeSlot]) -> bool {
        self.stage.contract().observed().iter().any(|observed| {
            let current = resolver::resolve_from(ancestors, id, self.upstream, observed.name)
                .ok()
                .map(|r| observed.fingerprint_of(&r.value));
            let saved = self
                .snapshots
                .iter()
                .find(|(name, _)| *name == observed.name)
                .map(|(_, fp)| fp);
            current.as_ref() != saved
        })
    }

    /// Mark for reinitialization if an observed attribute changed.
    pub(crate) fn check_observed(&mut self, id: NodeId, ancestors: &[NodeSlot]) -> bool {
        let due = matches!(self.state, NodeState::Ready | NodeState::NeedsReset)
            && self.observed_changed(id, ancestors);
        if due {
            tracing::debug!(
                "{} '{}': upstream attribute changed, needs reinitialization",
                id,
                self.stage.name()
            );
            self.state = NodeState::NeedsReinitialization;
        }
        due
    }

    /// Handle a message from upstream and return the one to pass on.
    pub(crate) fn receive_message(
        &mut self,
        id: NodeId,
        message: &Message,
        ancestors: &[NodeSlot],
    ) -> Message {
        self.stats.messages_received += 1;

        if message.there_has_been_a_change {
            self.check_observed(id, ancestors);
        }
        if message.history_invalid() && self.state.is_active() {
            self.stage.as_stage_mut().on_input_history_invalidation();
        }
        // The forwarded message covers this node's subtree, so its own
        // reinitialization must not send a second one.
        if message.history_invalid() && self.state == NodeState::NeedsReinitialization {
            self.descendants_notified = true;
        }

        self.stats.messages_forwarded += 1;
        message.forwarded()
    }

    /// Record a failure and move to `Error`.
    pub(crate) fn record_failure(&mut self, id: NodeId, error: &PipelineError, tick: u64) {
        self.state = NodeState::Error;
        self.descendants_notified = false;
        self.stats.failures += 1;
        self.last_failure = Some(NodeFailure {
            node: id,
            name: self.stage.name().to_string(),
            error: error.to_string(),
            tick,
            at: Utc::now(),
        });
    }
}
