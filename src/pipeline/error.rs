//! Pipeline-specific error types.

use crate::pipeline::id::NodeId;
use serde::Serialize;
use thiserror::Error;

/// A node that could not be brought to `Ready` by `Pipeline::initialize_all`.
#[derive(Debug, Clone, Serialize)]
pub struct StuckNode {
    pub node: NodeId,
    pub name: String,
    pub reason: String,
}

/// Errors that can occur within the pipeline system.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// A parameter value was rejected by the stage. Nothing was mutated.
    #[error("Node {node} rejected parameter '{parameter}': {reason}")]
    Validation {
        node: NodeId,
        parameter: String,
        reason: String,
    },

    /// An upstream attribute is not available yet; retry on a later pass.
    #[error("Node {node} is waiting for upstream attribute '{attribute}'")]
    MissingDependency { node: NodeId, attribute: String },

    /// No ancestor, up to and including the source, publishes the attribute.
    #[error("No ancestor of node {node} publishes attribute '{attribute}'")]
    AttributeNotFound { node: NodeId, attribute: String },

    #[error("Shape mismatch: expected {expected_rows} rows, got {actual_rows}")]
    ShapeMismatch {
        expected_rows: usize,
        actual_rows: usize,
    },

    #[error("Buffer of {rows} x {capacity} samples is too large")]
    BufferTooLarge { rows: usize, capacity: usize },

    #[error("Node {node} failed to compute: {message}")]
    Compute { node: NodeId, message: String },

    #[error("Initialization incomplete, {} node(s) stuck: {}", stuck.len(), describe_stuck(stuck))]
    InitializationIncomplete { stuck: Vec<StuckNode> },

    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("Node {node} has no parameter '{name}'")]
    UnknownParameter { node: NodeId, name: String },

    #[error("Invalid attachment: {0}")]
    InvalidAttachment(String),

    #[error("Pipeline already has a source")]
    SourceAlreadySet,

    #[error("Pipeline has no source")]
    NoSource,

    #[error("Invalid stage contract: {0}")]
    InvalidContract(String),

    #[error("Node {node} is not ready (state: {state})")]
    NotReady { node: NodeId, state: String },

    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

fn describe_stuck(stuck: &[StuckNode]) -> String {
    stuck
        .iter()
        .map(|s| format!("{} '{}' ({})", s.node, s.name, s.reason))
        .collect::<Vec<_>>()
        .join(", ")
}

impl PipelineError {
    /// Whether a later initialization pass may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::MissingDependency { .. })
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Error returned by stage code.
///
/// Stages do not know their own `NodeId`; the orchestrator attaches it when
/// turning a `Compute` failure into a `PipelineError::Compute`.
#[derive(Error, Debug, Clone)]
pub enum StageError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("{0}")]
    Compute(String),
}

impl StageError {
    pub fn compute(message: impl Into<String>) -> Self {
        StageError::Compute(message.into())
    }

    /// Attach the failing node's id.
    pub fn into_pipeline_error(self, node: NodeId) -> PipelineError {
        match self {
            StageError::Pipeline(e) => e,
            StageError::Compute(message) => PipelineError::Compute { node, message },
        }
    }
}

pub type StageResult<T> = std::result::Result<T, StageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_missing_dependency_is_retryable() {
        let missing = PipelineError::MissingDependency {
            node: NodeId(1),
            attribute: "sampling_rate".into(),
        };
        let not_found = PipelineError::AttributeNotFound {
            node: NodeId(1),
            attribute: "sampling_rate".into(),
        };
        assert!(missing.is_retryable());
        assert!(!not_found.is_retryable());
    }

    #[test]
    fn test_stage_error_gets_node_id() {
        let err = StageError::compute("division by zero").into_pipeline_error(NodeId(4));
        match err {
            PipelineError::Compute { node, message } => {
                assert_eq!(node, NodeId(4));
                assert_eq!(message, "division by zero");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_initialization_incomplete_lists_nodes() {
        let err = PipelineError::InitializationIncomplete {
            stuck: vec![StuckNode {
                node: NodeId(2),
                name: "Gain".into(),
                reason: "waiting".into(),
            }],
        };
        let text = err.to_string();
        assert!(text.contains("1 node(s)"));
        assert!(text.contains("'Gain'"));
    }
}
