//! Run error taxonomy.
//!
//! Returned inside `RunResult::Failed` when a run stops, and as `Err` from
//! `invoke` / `resume` when a request is rejected before any round runs.

use thiserror::Error;

use crate::graph::{FailureKind, NodeFailure};
use crate::memory::CheckpointError;
use crate::state::StateError;

/// Why a run failed or a run request was rejected.
///
/// Handler failures (including panics and timeouts) are retried per node
/// policy before they surface here as `NodeFailed`. Routing, state and step
/// limit errors are never retried.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RunError {
    /// A node exhausted its attempts (or failed non-retryably) with no fallback.
    #[error("node '{node}' failed after {attempts} attempt(s): {failure}")]
    NodeFailed {
        node: String,
        attempts: u32,
        failure: NodeFailure,
    },

    /// A decision function returned a label outside its declared set.
    #[error("routing error at node '{node}': label '{label}' not in {expected:?}")]
    Routing {
        node: String,
        label: String,
        expected: Vec<String>,
    },

    /// Unknown field, type mismatch or merge conflict while merging deltas.
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// The run needed more rounds than `max_steps` allows.
    #[error("step limit of {limit} exceeded")]
    StepLimitExceeded { limit: u64 },

    /// The run's cancellation token fired before a round was dispatched.
    #[error("run cancelled")]
    Cancelled,

    /// Another resume of the same run is in progress.
    #[error("run '{0}' is already being resumed")]
    AlreadyResumed(String),

    /// The stored record has no suspension marker.
    #[error("run '{0}' is not suspended")]
    NotSuspended(String),

    /// External input did not match the suspended node's resume schema.
    #[error("invalid resume input for node '{node}': {source}")]
    InvalidResumeInput { node: String, source: StateError },

    /// The checkpoint store failed (`CheckpointIOError`) or had no record.
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
}

impl RunError {
    /// Failure kind when this is a node failure.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            RunError::NodeFailed { failure, .. } => Some(failure.kind),
            _ => None,
        }
    }
}
