//! Run results returned by `invoke`, `resume` and the `Finished` stream event.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RunError;
use crate::memory::{HistoryEntry, RunRecord, SuspensionMarker};
use crate::state::{ResumeSchema, State};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Suspended,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Completed => "completed",
            RunStatus::Suspended => "suspended",
            RunStatus::Failed => "failed",
        })
    }
}

/// The frontier emptied out.
#[derive(Debug, Clone)]
pub struct Completion {
    pub run_id: String,
    pub state: State,
    pub history: Vec<HistoryEntry>,
    /// Rounds executed.
    pub steps: u64,
}

/// A node asked for external input; the run is checkpointed under `run_id`.
#[derive(Debug, Clone)]
pub struct Suspension {
    pub run_id: String,
    pub node_id: String,
    pub reason: String,
    pub resume_schema: ResumeSchema,
    pub token: String,
    /// State including every delta merged in the suspending round.
    pub state: State,
    pub steps: u64,
}

impl Suspension {
    pub(crate) fn new(record: &RunRecord, marker: &SuspensionMarker) -> Self {
        Self {
            run_id: record.run_id.clone(),
            node_id: marker.node_id.clone(),
            reason: marker.reason.clone(),
            resume_schema: marker.resume_schema.clone(),
            token: marker.token.clone(),
            state: record.state.clone(),
            steps: record.step,
        }
    }

    pub(crate) fn from_record(record: &RunRecord) -> Option<Self> {
        record
            .suspension
            .as_ref()
            .map(|marker| Self::new(record, marker))
    }
}

/// The run stopped with an error. `history` shows where and why.
#[derive(Debug, Clone)]
pub struct RunFailure {
    pub run_id: String,
    pub error: RunError,
    pub state: State,
    pub history: Vec<HistoryEntry>,
    /// Set when saving a suspension failed; pass it to
    /// `CompiledStateGraph::persist_suspension` to retry.
    pub record: Option<Box<RunRecord>>,
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run '{}' failed: {}", self.run_id, self.error)
    }
}

impl std::error::Error for RunFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Terminal or paused result of driving a run.
#[derive(Debug, Clone)]
pub enum RunResult {
    Completed(Completion),
    Suspended(Suspension),
    Failed(RunFailure),
}

impl RunResult {
    pub fn status(&self) -> RunStatus {
        match self {
            RunResult::Completed(_) => RunStatus::Completed,
            RunResult::Suspended(_) => RunStatus::Suspended,
            RunResult::Failed(_) => RunStatus::Failed,
        }
    }

    pub fn run_id(&self) -> &str {
        match self {
            RunResult::Completed(c) => &c.run_id,
            RunResult::Suspended(s) => &s.run_id,
            RunResult::Failed(f) => &f.run_id,
        }
    }

    pub fn state(&self) -> &State {
        match self {
            RunResult::Completed(c) => &c.state,
            RunResult::Suspended(s) => &s.state,
            RunResult::Failed(f) => &f.state,
        }
    }

    pub fn completed(&self) -> Option<&Completion> {
        match self {
            RunResult::Completed(c) => Some(c),
            _ => None,
        }
    }

    pub fn suspended(&self) -> Option<&Suspension> {
        match self {
            RunResult::Suspended(s) => Some(s),
            _ => None,
        }
    }

    pub fn failed(&self) -> Option<&RunFailure> {
        match self {
            RunResult::Failed(f) => Some(f),
            _ => None,
        }
    }
}
