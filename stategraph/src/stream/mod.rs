//! Streaming types for graph runs.
//!
//! `CompiledStateGraph::stream` emits [`RunEvent`]s while a run progresses.
//! [`StreamMode`] selects which kinds are delivered; the final
//! `Finished` event is always sent.

use std::collections::HashSet;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::graph::RunResult;
use crate::memory::OutcomeRecord;
use crate::state::State;

/// Stream mode selector: which kinds of events to emit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamMode {
    /// Emit the frontier at the start of each round.
    Rounds,
    /// Emit one event per node outcome.
    Updates,
    /// Emit the merged state after each round.
    Values,
    /// Emit payloads sent by nodes through `RunContext::emit`.
    Custom,
}

/// Event emitted while running a graph.
#[derive(Clone, Debug)]
pub enum RunEvent {
    RoundStarted {
        step: u64,
        frontier: Vec<String>,
    },
    NodeFinished {
        step: u64,
        node_id: String,
        attempt: u32,
        outcome: OutcomeRecord,
    },
    Values(State),
    Custom {
        node_id: String,
        payload: Value,
    },
    /// Terminal event carrying the run result.
    Finished(Box<RunResult>),
}

/// Channel sender plus the selected modes.
#[derive(Clone, Debug)]
pub(crate) struct EventSink {
    tx: mpsc::Sender<RunEvent>,
    modes: HashSet<StreamMode>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<RunEvent>, modes: HashSet<StreamMode>) -> Self {
        Self { tx, modes }
    }

    /// Sends `event` when `mode` is selected. A dropped receiver is ignored.
    pub async fn send(&self, mode: StreamMode, event: RunEvent) {
        if self.modes.contains(&mode) {
            let _ = self.tx.send(event).await;
        }
    }

    pub async fn finish(&self, result: RunResult) {
        let _ = self.tx.send(RunEvent::Finished(Box::new(result))).await;
    }
}
