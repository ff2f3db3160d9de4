//! Upstream attribute resolution.
//!
//! Pure functions over the node arena: starting at a node's immediate
//! predecessor, walk the `upstream` links and return the first ancestor that
//! publishes the requested attribute. Consumers declare "I need the sampling
//! rate" without knowing which stage provides it, so new stages can be
//! inserted into the chain without rewiring anything.

use crate::pipeline::attribute::AttributeValue;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::NodeId;
use crate::pipeline::node::NodeState;
use crate::pipeline::slot::NodeSlot;

/// A resolved attribute and the ancestor that published it.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub publisher: NodeId,
    pub value: AttributeValue,
}

/// Walk upstream from `start` looking for `attribute`.
///
/// `nodes` only needs to contain the ancestors: every upstream link points at
/// a node inserted earlier, so a prefix of the arena is enough.
pub fn resolve_from(
    nodes: &[NodeSlot],
    requester: NodeId,
    start: Option<NodeId>,
    attribute: &str,
) -> PipelineResult<Resolved> {
    let mut current = start;
    while let Some(id) = current {
        let Some(slot) = nodes.get(id.index()) else {
            break;
        };
        if let Some(value) = slot.stage.attribute(attribute) {
            return Ok(Resolved {
                publisher: id,
                value,
            });
        }
        current = slot.upstream;
    }
    Err(PipelineError::AttributeNotFound {
        node: requester,
        attribute: attribute.to_string(),
    })
}

/// Resolve `attribute` for `node`, starting at its immediate predecessor.
pub fn resolve(nodes: &[NodeSlot], node: NodeId, attribute: &str) -> PipelineResult<Resolved> {
    let slot = nodes.get(node.index()).ok_or(PipelineError::UnknownNode(node))?;
    resolve_from(nodes, node, slot.upstream, attribute)
}

/// Like [`resolve_from`], but reports `MissingDependency` instead of
/// `AttributeNotFound` while some ancestor has not been initialized yet,
/// since that ancestor may publish the attribute once it is.
pub fn resolve_for_init(
    nodes: &[NodeSlot],
    requester: NodeId,
    start: Option<NodeId>,
    attribute: &str,
) -> PipelineResult<Resolved> {
    resolve_from(nodes, requester, start, attribute).map_err(|err| {
        if ancestors_pending(nodes, start) {
            PipelineError::MissingDependency {
                node: requester,
                attribute: attribute.to_string(),
            }
        } else {
            err
        }
    })
}

/// Whether any ancestor reachable from `start` has never been initialized.
pub fn ancestors_pending(nodes: &[NodeSlot], start: Option<NodeId>) -> bool {
    ancestors(nodes, start).any(|slot| {
        matches!(
            slot.state,
            NodeState::Uninitialized | NodeState::Initializing
        )
    })
}

fn ancestors<'a>(
    nodes: &'a [NodeSlot],
    start: Option<NodeId>,
) -> impl Iterator<Item = &'a NodeSlot> + 'a {
    let mut current = start;
    std::iter::from_fn(move || {
        let id = current?;
        let slot = nodes.get(id.index())?;
        current = slot.upstream;
        Some(slot)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::attribute::AttributeValue;
    use crate::pipeline::chunk::Chunk;
    use crate::pipeline::contract::StageContract;
    use crate::pipeline::error::StageResult;
    use crate::pipeline::node::{AnyStage, InitContext, NodeRole, Stage, UpdateContext};

    struct Publisher {
        attrs: Vec<(&'static str, f64)>,
        contract: StageContract,
    }

    impl Publisher {
        fn new(attrs: Vec<(&'static str, f64)>) -> Self {
            Self {
                attrs,
                contract: StageContract::empty(),
            }
        }
    }

    impl Stage for Publisher {
        fn name(&self) -> &str {
            "Publisher"
        }
        fn role(&self) -> NodeRole {
            NodeRole::Processor
        }
        fn contract(&self) -> &StageContract {
            &self.contract
        }
        fn attribute(&self, name: &str) -> Option<AttributeValue> {
            self.attrs
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, v)| AttributeValue::Float(*v))
        }
        fn initialize(&mut self, _ctx: &InitContext) -> StageResult<()> {
            Ok(())
        }
        fn update(&mut self, _ctx: &mut UpdateContext) -> StageResult<()> {
            Ok(())
        }
    }

    fn chain(specs: Vec<Vec<(&'static str, f64)>>) -> Vec<NodeSlot> {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, attrs)| {
                let upstream = i.checked_sub(1).map(NodeId::from_index);
                NodeSlot::new(AnyStage::plugin(Publisher::new(attrs)), upstream)
            })
            .collect()
    }

    #[test]
    fn test_resolves_nearest_ancestor() {
        let nodes = chain(vec![vec![("x", 1.0)], vec![], vec![]]);
        let resolved = resolve(&nodes, NodeId(2), "x").unwrap();
        assert_eq!(resolved.publisher, NodeId(0));
        assert_eq!(resolved.value, AttributeValue::Float(1.0));
    }

    #[test]
    fn test_missing_attribute_not_found() {
        let nodes = chain(vec![vec![("x", 1.0)], vec![], vec![]]);
        let err = resolve(&nodes, NodeId(2), "y").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::AttributeNotFound { node: NodeId(2), .. }
        ));
    }

    #[test]
    fn test_closer_publisher_shadows_source() {
        let nodes = chain(vec![vec![("x", 1.0)], vec![("x", 2.0)], vec![]]);
        let resolved = resolve(&nodes, NodeId(2), "x").unwrap();
        assert_eq!(resolved.publisher, NodeId(1));
    }

    #[test]
    fn test_own_attributes_are_not_consulted() {
        let nodes = chain(vec![vec![], vec![("x", 5.0)]]);
        assert!(resolve(&nodes, NodeId(1), "x").is_err());
    }

    #[test]
    fn test_pending_ancestor_reports_missing_dependency() {
        let nodes = chain(vec![vec![], vec![]]);
        let err = resolve_for_init(&nodes, NodeId(1), Some(NodeId(0)), "x").unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_resolution_does_not_touch_outputs() {
        let nodes = chain(vec![vec![("x", 1.0)], vec![]]);
        let _ = resolve(&nodes, NodeId(1), "x");
        assert_eq!(nodes[0].output, Chunk::new());
    }
}
