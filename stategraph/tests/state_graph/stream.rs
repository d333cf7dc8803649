//! stream: selected modes and the terminal Finished event.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use stategraph::{
    Delta, Node, Outcome, OutcomeRecord, RunConfig, RunContext, RunEvent, RunStatus, State,
    StateGraph, StreamMode, END, START,
};
use tokio_stream::StreamExt;

use crate::common::{schema, Recorder};

/// Emits a progress payload through the run context.
struct Progress;

#[async_trait]
impl Node for Progress {
    fn id(&self) -> &str {
        "progress"
    }

    async fn run(&self, _state: Arc<State>) -> Outcome {
        Outcome::empty()
    }

    async fn run_with_context(&self, _state: Arc<State>, ctx: &RunContext) -> Outcome {
        ctx.emit(json!({ "pct": 50 })).await;
        Outcome::success(Delta::new().with("log", json!(["progress"])))
    }
}

fn graph() -> StateGraph {
    let mut graph = StateGraph::new(schema());
    graph
        .add_node("progress", Arc::new(Progress))
        .add_node("done", Arc::new(Recorder::new("done")))
        .add_edge(START, "progress")
        .add_edge("progress", "done")
        .add_edge("done", END);
    graph
}

/// **Scenario**: With every mode selected the stream carries rounds, node
/// outcomes, custom payloads and merged values, then Finished.
#[tokio::test]
async fn stream_all_modes() {
    let compiled = graph().compile().unwrap();
    let events: Vec<RunEvent> = compiled
        .stream(
            Delta::new(),
            RunConfig::default(),
            [
                StreamMode::Rounds,
                StreamMode::Updates,
                StreamMode::Values,
                StreamMode::Custom,
            ],
        )
        .collect()
        .await;

    let rounds: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::RoundStarted { step, frontier } => Some((*step, frontier.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(
        rounds,
        vec![(1, vec!["progress".to_string()]), (2, vec!["done".to_string()])]
    );
    assert!(events.iter().any(|e| matches!(
        e,
        RunEvent::NodeFinished { node_id, outcome: OutcomeRecord::Success, .. } if node_id == "done"
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        RunEvent::Custom { node_id, payload } if node_id == "progress" && payload["pct"] == 50
    )));
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, RunEvent::Values(_)))
            .count(),
        2
    );
    match events.last() {
        Some(RunEvent::Finished(result)) => assert_eq!(result.status(), RunStatus::Completed),
        other => panic!("expected Finished, got {:?}", other),
    }
}

/// **Scenario**: Only selected modes are delivered; Finished always is.
#[tokio::test]
async fn stream_filters_modes() {
    let compiled = graph().compile().unwrap();
    let events: Vec<RunEvent> = compiled
        .stream(Delta::new(), RunConfig::default(), [StreamMode::Values])
        .collect()
        .await;
    assert_eq!(events.len(), 3);
    assert!(matches!(events[0], RunEvent::Values(_)));
    assert!(matches!(events[2], RunEvent::Finished(_)));
}

/// **Scenario**: Rejected input still ends the stream with a failed Finished event.
#[tokio::test]
async fn stream_reports_rejected_input() {
    let compiled = graph().compile().unwrap();
    let events: Vec<RunEvent> = compiled
        .stream(
            Delta::new().with("nope", 1),
            RunConfig::default().with_run_id("bad"),
            [StreamMode::Rounds],
        )
        .collect()
        .await;
    assert_eq!(events.len(), 1);
    match &events[0] {
        RunEvent::Finished(result) => {
            assert_eq!(result.status(), RunStatus::Failed);
            assert_eq!(result.run_id(), "bad");
        }
        other => panic!("expected Finished, got {:?}", other),
    }
}
