//! Node abstraction for the pipeline.
//!
//! Two-layer design:
//! - **`Stage` trait**: the contract every source, processor and output
//!   implements. User-defined stages plug in as trait objects.
//! - **`BuiltinStage` enum**: all built-in stages. `update()` is matched
//!   directly so the hot path avoids dynamic dispatch.
//!
//! `AnyStage` wraps either variant so the pipeline can handle both uniformly.
//! The lifecycle state machine itself lives on the node slot (see `slot.rs`);
//! stages only implement the per-stage hooks.

use crate::pipeline::attribute::AttributeValue;
use crate::pipeline::chunk::Chunk;
use crate::pipeline::contract::StageContract;
use crate::pipeline::error::{PipelineError, PipelineResult, StageResult};
use crate::pipeline::id::NodeId;
use crate::pipeline::nodes::{ChannelSink, Gain, SyntheticSource, WindowedLimits};
use crate::pipeline::param::ParamValue;
use crate::pipeline::resolver;
use crate::pipeline::slot::NodeSlot;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Behavioral role of a node in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeRole {
    Source,
    Processor,
    Output,
}

/// Lifecycle state of a node.
///
/// `Uninitialized → Initializing → Ready ⇄ NeedsReset ⇄ NeedsReinitialization`,
/// with `Error` reachable from any active state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeState {
    Uninitialized,
    Initializing,
    Ready,
    NeedsReset,
    NeedsReinitialization,
    Error,
}

impl NodeState {
    /// Whether the node has been initialized at least once and is not failed.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            NodeState::Ready | NodeState::NeedsReset | NodeState::NeedsReinitialization
        )
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeState::Uninitialized => "uninitialized",
            NodeState::Initializing => "initializing",
            NodeState::Ready => "ready",
            NodeState::NeedsReset => "needs reset",
            NodeState::NeedsReinitialization => "needs reinitialization",
            NodeState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Context passed to `Stage::initialize`.
///
/// Gives read-only access to the node's ancestors through the resolver.
pub struct InitContext<'a> {
    pub(crate) node: NodeId,
    pub(crate) upstream: Option<NodeId>,
    pub(crate) ancestors: &'a [NodeSlot],
}

impl<'a> InitContext<'a> {
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Find the first ancestor publishing `attribute`.
    ///
    /// Fails with `MissingDependency` while some ancestor is still
    /// uninitialized, and with `AttributeNotFound` once the whole chain is up
    /// and nobody publishes it.
    pub fn resolve(&self, attribute: &str) -> PipelineResult<AttributeValue> {
        resolver::resolve_for_init(self.ancestors, self.node, self.upstream, attribute)
            .map(|r| r.value)
    }

    /// Resolve a numeric attribute.
    pub fn resolve_float(&self, attribute: &str) -> PipelineResult<f64> {
        let value = self.resolve(attribute)?;
        value.as_float().ok_or_else(|| PipelineError::AttributeNotFound {
            node: self.node,
            attribute: format!("{attribute} (not numeric)"),
        })
    }

    /// Resolve a text attribute.
    pub fn resolve_text(&self, attribute: &str) -> PipelineResult<String> {
        let value = self.resolve(attribute)?;
        value
            .as_text()
            .map(str::to_string)
            .ok_or_else(|| PipelineError::AttributeNotFound {
                node: self.node,
                attribute: format!("{attribute} (not text)"),
            })
    }
}

/// Context passed to `Stage::update` each tick.
pub struct UpdateContext<'a> {
    /// Latest chunk of the upstream node. `None` for the source.
    pub input: Option<&'a Chunk>,
    /// Output buffer; the stage writes its chunk here.
    pub output: &'a mut Chunk,
    /// Current tick timestamp (relative to the first tick).
    pub timestamp: Duration,
    /// Time since last tick.
    pub dt: Duration,
    /// Monotonic tick counter.
    pub tick: u64,
}

impl<'a> UpdateContext<'a> {
    /// Upstream chunk, or a compute error for stages that need one.
    pub fn require_input(&self) -> StageResult<&'a Chunk> {
        self.input
            .ok_or_else(|| crate::pipeline::error::StageError::compute("no upstream chunk"))
    }
}

/// Contract for pluggable/user-defined stages.
///
/// Stages should keep `update()` within the tick budget: the pipeline runs
/// on a single worker and a stalled update stalls every node.
pub trait Stage: Send {
    /// Human-readable name of this stage.
    fn name(&self) -> &str;

    fn role(&self) -> NodeRole;

    /// Local-reset parameters and observed upstream attributes.
    fn contract(&self) -> &StageContract;

    /// Value of a published attribute, if this stage publishes it.
    fn attribute(&self, _name: &str) -> Option<AttributeValue> {
        None
    }

    /// Current value of a parameter. `None` if the stage has no such parameter.
    fn parameter(&self, _name: &str) -> Option<ParamValue> {
        None
    }

    /// Check a value before it is applied. Must not mutate anything.
    fn validate_parameter(&self, _name: &str, _value: &ParamValue) -> Result<(), String> {
        Ok(())
    }

    /// Store an already-validated value.
    fn apply_parameter(&mut self, _name: &str, _value: ParamValue) {}

    /// Stage-specific setup. Observed attributes are already resolved.
    fn initialize(&mut self, ctx: &InitContext) -> StageResult<()>;

    /// Lightweight reinitialization that does not re-resolve upstream attributes.
    fn reset(&mut self) -> StageResult<()> {
        Ok(())
    }

    /// Consume the upstream chunk and produce one into `ctx.output`.
    fn update(&mut self, ctx: &mut UpdateContext) -> StageResult<()>;

    /// Input history before this point is no longer valid.
    fn on_input_history_invalidation(&mut self) {}
}

/// Enum dispatch for built-in stages.
pub enum BuiltinStage {
    SyntheticSource(SyntheticSource),
    Gain(Gain),
    WindowedLimits(WindowedLimits),
    ChannelSink(ChannelSink),
}

impl Stage for BuiltinStage {
    fn name(&self) -> &str {
        match self {
            BuiltinStage::SyntheticSource(n) => n.name(),
            BuiltinStage::Gain(n) => n.name(),
            BuiltinStage::WindowedLimits(n) => n.name(),
            BuiltinStage::ChannelSink(n) => n.name(),
        }
    }

    fn role(&self) -> NodeRole {
        match self {
            BuiltinStage::SyntheticSource(n) => n.role(),
            BuiltinStage::Gain(n) => n.role(),
            BuiltinStage::WindowedLimits(n) => n.role(),
            BuiltinStage::ChannelSink(n) => n.role(),
        }
    }

    fn contract(&self) -> &StageContract {
        match self {
            BuiltinStage::SyntheticSource(n) => n.contract(),
            BuiltinStage::Gain(n) => n.contract(),
            BuiltinStage::WindowedLimits(n) => n.contract(),
            BuiltinStage::ChannelSink(n) => n.contract(),
        }
    }

    fn attribute(&self, name: &str) -> Option<AttributeValue> {
        match self {
            BuiltinStage::SyntheticSource(n) => n.attribute(name),
            BuiltinStage::Gain(n) => n.attribute(name),
            BuiltinStage::WindowedLimits(n) => n.attribute(name),
            BuiltinStage::ChannelSink(n) => n.attribute(name),
        }
    }

    fn parameter(&self, name: &str) -> Option<ParamValue> {
        match self {
            BuiltinStage::SyntheticSource(n) => n.parameter(name),
            BuiltinStage::Gain(n) => n.parameter(name),
            BuiltinStage::WindowedLimits(n) => n.parameter(name),
            BuiltinStage::ChannelSink(n) => n.parameter(name),
        }
    }

    fn validate_parameter(&self, name: &str, value: &ParamValue) -> Result<(), String> {
        match self {
            BuiltinStage::SyntheticSource(n) => n.validate_parameter(name, value),
            BuiltinStage::Gain(n) => n.validate_parameter(name, value),
            BuiltinStage::WindowedLimits(n) => n.validate_parameter(name, value),
            BuiltinStage::ChannelSink(n) => n.validate_parameter(name, value),
        }
    }

    fn apply_parameter(&mut self, name: &str, value: ParamValue) {
        match self {
            BuiltinStage::SyntheticSource(n) => n.apply_parameter(name, value),
            BuiltinStage::Gain(n) => n.apply_parameter(name, value),
            BuiltinStage::WindowedLimits(n) => n.apply_parameter(name, value),
            BuiltinStage::ChannelSink(n) => n.apply_parameter(name, value),
        }
    }

    fn initialize(&mut self, ctx: &InitContext) -> StageResult<()> {
        match self {
            BuiltinStage::SyntheticSource(n) => n.initialize(ctx),
            BuiltinStage::Gain(n) => n.initialize(ctx),
            BuiltinStage::WindowedLimits(n) => n.initialize(ctx),
            BuiltinStage::ChannelSink(n) => n.initialize(ctx),
        }
    }

    fn reset(&mut self) -> StageResult<()> {
        match self {
            BuiltinStage::SyntheticSource(n) => n.reset(),
            BuiltinStage::Gain(n) => n.reset(),
            BuiltinStage::WindowedLimits(n) => n.reset(),
            BuiltinStage::ChannelSink(n) => n.reset(),
        }
    }

    fn update(&mut self, ctx: &mut UpdateContext) -> StageResult<()> {
        match self {
            BuiltinStage::SyntheticSource(n) => n.update(ctx),
            BuiltinStage::Gain(n) => n.update(ctx),
            BuiltinStage::WindowedLimits(n) => n.update(ctx),
            BuiltinStage::ChannelSink(n) => n.update(ctx),
        }
    }

    fn on_input_history_invalidation(&mut self) {
        match self {
            BuiltinStage::SyntheticSource(n) => n.on_input_history_invalidation(),
            BuiltinStage::Gain(n) => n.on_input_history_invalidation(),
            BuiltinStage::WindowedLimits(n) => n.on_input_history_invalidation(),
            BuiltinStage::ChannelSink(n) => n.on_input_history_invalidation(),
        }
    }
}

/// Placeholder left in the slot of a detached output so the real stage,
/// and whatever it owns, is dropped.
pub(crate) struct DetachedStage {
    name: String,
    contract: StageContract,
}

impl DetachedStage {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contract: StageContract::empty(),
        }
    }
}

impl Stage for DetachedStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> NodeRole {
        NodeRole::Output
    }

    fn contract(&self) -> &StageContract {
        &self.contract
    }

    fn initialize(&mut self, _ctx: &InitContext) -> StageResult<()> {
        Ok(())
    }

    fn update(&mut self, _ctx: &mut UpdateContext) -> StageResult<()> {
        Ok(())
    }
}

/// Wrapper that holds either a built-in stage (enum dispatch) or a plugin (trait object).
pub enum AnyStage {
    Builtin(BuiltinStage),
    Plugin(Box<dyn Stage>),
}

impl AnyStage {
    pub fn plugin(stage: impl Stage + 'static) -> Self {
        AnyStage::Plugin(Box::new(stage))
    }

    /// The stage behind either variant, for cold-path calls.
    pub fn as_stage(&self) -> &dyn Stage {
        match self {
            AnyStage::Builtin(n) => n,
            AnyStage::Plugin(n) => &**n,
        }
    }

    pub fn as_stage_mut(&mut self) -> &mut dyn Stage {
        match self {
            AnyStage::Builtin(n) => n,
            AnyStage::Plugin(n) => &mut **n,
        }
    }

    pub fn name(&self) -> &str {
        self.as_stage().name()
    }

    pub fn role(&self) -> NodeRole {
        self.as_stage().role()
    }

    pub fn contract(&self) -> &StageContract {
        self.as_stage().contract()
    }

    pub fn attribute(&self, name: &str) -> Option<AttributeValue> {
        self.as_stage().attribute(name)
    }

    pub fn update(&mut self, ctx: &mut UpdateContext) -> StageResult<()> {
        match self {
            AnyStage::Builtin(n) => n.update(ctx),
            AnyStage::Plugin(n) => n.update(ctx),
        }
    }
}

impl From<SyntheticSource> for AnyStage {
    fn from(n: SyntheticSource) -> Self {
        AnyStage::Builtin(BuiltinStage::SyntheticSource(n))
    }
}

impl From<Gain> for AnyStage {
    fn from(n: Gain) -> Self {
        AnyStage::Builtin(BuiltinStage::Gain(n))
    }
}

impl From<WindowedLimits> for AnyStage {
    fn from(n: WindowedLimits) -> Self {
        AnyStage::Builtin(BuiltinStage::WindowedLimits(n))
    }
}

impl From<ChannelSink> for AnyStage {
    fn from(n: ChannelSink) -> Self {
        AnyStage::Builtin(BuiltinStage::ChannelSink(n))
    }
}

impl From<Box<dyn Stage>> for AnyStage {
    fn from(n: Box<dyn Stage>) -> Self {
        AnyStage::Plugin(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_states() {
        assert!(NodeState::Ready.is_active());
        assert!(NodeState::NeedsReset.is_active());
        assert!(NodeState::NeedsReinitialization.is_active());
        assert!(!NodeState::Uninitialized.is_active());
        assert!(!NodeState::Initializing.is_active());
        assert!(!NodeState::Error.is_active());
    }

    #[test]
    fn test_builtin_dispatch() {
        let stage: AnyStage = Gain::new(2.0).into();
        assert_eq!(stage.name(), "Gain");
        assert_eq!(stage.role(), NodeRole::Processor);
        assert_eq!(
            stage.as_stage().parameter("gain"),
            Some(ParamValue::Float(2.0))
        );
    }
}
