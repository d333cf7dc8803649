//! Run record: everything needed to resume a suspended run.
//!
//! Created at run start and mutated only by the engine. Persisted through a
//! `CheckpointStore` when a node suspends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::graph::{FailureKind, Outcome};
use crate::state::{ResumeSchema, State, StateUpdate};

use super::config::DEFAULT_MAX_STEPS;

/// What happened to one node invocation, as kept in the history log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeRecord {
    Success,
    Failure { kind: FailureKind, detail: String },
    Suspended { reason: String },
    /// External input was merged for a previously suspended node.
    Resumed,
}

impl From<&Outcome> for OutcomeRecord {
    fn from(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Success(_) => OutcomeRecord::Success,
            Outcome::Failure(f) => OutcomeRecord::Failure {
                kind: f.kind,
                detail: f.detail.clone(),
            },
            Outcome::Suspend { reason, .. } => OutcomeRecord::Suspended {
                reason: reason.clone(),
            },
        }
    }
}

/// One history entry: node, attempt and outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub step: u64,
    pub node_id: String,
    pub attempt: u32,
    pub outcome: OutcomeRecord,
}

/// A node scheduled for the next round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontierEntry {
    pub node_id: String,
    /// 1-based attempt this dispatch represents.
    pub attempt: u32,
    /// Position, in the previous round, of the node that scheduled this entry.
    pub origin: usize,
    /// Backoff to sleep before invoking, in milliseconds.
    #[serde(default)]
    pub delay_ms: u64,
}

impl FrontierEntry {
    pub fn new(node_id: impl Into<String>, origin: usize) -> Self {
        Self {
            node_id: node_id.into(),
            attempt: 1,
            origin,
            delay_ms: 0,
        }
    }
}

/// Marks the node awaiting external input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspensionMarker {
    pub node_id: String,
    pub attempt: u32,
    /// Position of the suspended node in its round; its resume input and
    /// successors take this precedence.
    pub origin: usize,
    pub reason: String,
    pub resume_schema: ResumeSchema,
    /// Opaque token identifying this suspension.
    pub token: String,
}

/// The suspending round, left unsettled until the resume input arrives.
///
/// Resuming rebuilds the round's merge from `base` with `updates` plus the
/// input, then routes every node in `routed` on the merged state, so the
/// result matches a run whose node returned the input directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRound {
    /// State before the round merged.
    pub base: State,
    /// Successful deltas of the suspended node's siblings.
    pub updates: Vec<StateUpdate>,
    /// `(frontier position, node id)` of each sibling whose edges are still to be routed.
    pub routed: Vec<(usize, String)>,
}

fn default_max_steps() -> u64 {
    DEFAULT_MAX_STEPS
}

/// Step counter, state, frontier, history and suspension marker of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub step: u64,
    /// Round limit the run was started with; `resume` keeps using it.
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,
    /// While suspended: state with the siblings' deltas merged, for inspection.
    pub state: State,
    /// While suspended: retries and requeued entries only. Routed successors
    /// are computed on resume from `pending`.
    pub frontier: Vec<FrontierEntry>,
    pub history: Vec<HistoryEntry>,
    pub suspension: Option<SuspensionMarker>,
    #[serde(default)]
    pub pending: Option<PendingRound>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunRecord {
    /// Fresh record whose frontier is the entry node.
    pub fn new(run_id: impl Into<String>, state: State, entry: &str) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.into(),
            step: 0,
            max_steps: DEFAULT_MAX_STEPS,
            state,
            frontier: vec![FrontierEntry::new(entry, 0)],
            history: Vec::new(),
            suspension: None,
            pending: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn frontier_ids(&self) -> Vec<String> {
        self.frontier.iter().map(|e| e.node_id.clone()).collect()
    }

    pub fn is_suspended(&self) -> bool {
        self.suspension.is_some()
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
