//! Graph compilation error and warnings.
//!
//! Returned by `StateGraph::validate` / `compile` when the graph is
//! structurally invalid. Warnings do not block compilation.

use std::fmt;

use thiserror::Error;

/// Error when compiling a state graph.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CompilationError {
    /// An edge, label mapping or fallback refers to an id that was never added.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// No edge leaves START.
    #[error("graph must have exactly one edge from START")]
    MissingStart,

    /// More than one edge leaves START.
    #[error("graph has more than one start node: {0:?}")]
    MultipleStart(Vec<String>),

    /// START or END used as a node id.
    #[error("'{0}' is reserved and cannot be a node id")]
    ReservedNodeId(String),

    /// Edge into START, out of END, or a conditional edge out of START.
    #[error("invalid edge: {0}")]
    InvalidEdge(String),

    /// A router's label set differs from its mapping keys.
    #[error("labels of conditional edge at '{node}' do not match mapping (missing: {missing:?}, unexpected: {unexpected:?})")]
    LabelMismatch {
        node: String,
        /// Declared by the router but absent from the mapping.
        missing: Vec<String>,
        /// Present in the mapping but not declared by the router.
        unexpected: Vec<String>,
    },

    /// A router declares no labels.
    #[error("conditional edge at '{0}' declares no labels")]
    EmptyLabelSet(String),

    /// A retry policy names a fallback that is not a node.
    #[error("fallback '{fallback}' of node '{node}' is not a node")]
    UnknownFallback { node: String, fallback: String },
}

/// Non-fatal graph findings, logged at compile time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphWarning {
    /// END cannot be reached from the start node. Legitimate for graphs that
    /// only stop through suspension or the step limit.
    EndUnreachable,
    /// The node cannot be reached from the start node.
    UnreachableNode(String),
}

impl fmt::Display for GraphWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphWarning::EndUnreachable => f.write_str("END is not reachable from the start node"),
            GraphWarning::UnreachableNode(id) => {
                write!(f, "node '{}' is not reachable from the start node", id)
            }
        }
    }
}
