//! Invoke: fan-out and barrier join, conditional routing, step limit,
//! cancellation and state errors.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use stategraph::{
    Delta, FieldSpec, FieldType, FnNode, FnRouter, MergeObject, Node, Outcome, RunConfig,
    RunContext, RunError, RunStatus, State, StateError, StateGraph, END, START,
};

use crate::common::{count, log_of, schema, Recorder};

/// Appends `value` to `results` after `delay_ms`.
struct Fetch {
    id: &'static str,
    value: &'static str,
    delay_ms: u64,
}

#[async_trait]
impl Node for Fetch {
    fn id(&self) -> &str {
        self.id
    }

    async fn run(&self, _state: Arc<State>) -> Outcome {
        tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        Outcome::success(Delta::new().with("results", json!([self.value])))
    }
}

/// **Scenario**: A fans out to B and C; D joins once both finished. `results`
/// follows declared-edge order even though C finishes first.
#[tokio::test]
async fn fan_out_join_merges_in_declared_order() {
    let join = Recorder::new("d");
    let join_calls = join.calls();

    let mut graph = StateGraph::new(schema());
    graph
        .add_node("a", Arc::new(Recorder::new("a")))
        .add_node(
            "b",
            Arc::new(Fetch {
                id: "b",
                value: "weather",
                delay_ms: 80,
            }),
        )
        .add_node(
            "c",
            Arc::new(Fetch {
                id: "c",
                value: "news",
                delay_ms: 5,
            }),
        )
        .add_node("d", Arc::new(join))
        .add_edge(START, "a")
        .add_edge("a", "b")
        .add_edge("a", "c")
        .add_edge("b", "d")
        .add_edge("c", "d")
        .add_edge("d", END);
    let compiled = graph.compile().unwrap();

    let result = compiled
        .invoke(Delta::new(), RunConfig::default())
        .await
        .unwrap();
    let done = result.completed().expect("completed");
    assert_eq!(done.state.get("results"), Some(&json!(["weather", "news"])));
    assert_eq!(log_of(&done.state), vec!["a", "d"]);
    assert_eq!(count(&join_calls), 1);
    assert_eq!(done.steps, 3);
    let round2: Vec<_> = done
        .history
        .iter()
        .filter(|h| h.step == 2)
        .map(|h| h.node_id.as_str())
        .collect();
    assert_eq!(round2, vec!["b", "c"]);
}

/// **Scenario**: Nodes in one round see the same snapshot; a sibling's write
/// is visible only in the next round.
#[tokio::test]
async fn siblings_share_the_round_snapshot() {
    let mut graph = StateGraph::new(schema());
    graph
        .add_node("start", Arc::new(Recorder::new("start")))
        .add_node(
            "writer",
            Arc::new(FnNode::new("writer", |_s: &State| {
                Outcome::success(Delta::new().with("answer", "written"))
            })),
        )
        .add_node(
            "reader",
            Arc::new(FnNode::new("reader", |s: &State| {
                let seen = s.get_str("answer").unwrap_or("none").to_string();
                Outcome::success(Delta::new().with("results", json!([seen])))
            })),
        )
        .add_edge(START, "start")
        .add_edge("start", "writer")
        .add_edge("start", "reader");
    let compiled = graph.compile().unwrap();

    let result = compiled
        .invoke(Delta::new(), RunConfig::default())
        .await
        .unwrap();
    assert_eq!(result.state().get("results"), Some(&json!(["none"])));
    assert_eq!(result.state().get_str("answer"), Some("written"));
}

/// **Scenario**: Overwrite fields written by two siblings keep the value of
/// the later frontier position.
#[tokio::test]
async fn overwrite_precedence_follows_frontier_order() {
    let write = |id: &'static str| {
        Arc::new(FnNode::new(id, move |_s: &State| {
            Outcome::success(Delta::new().with("answer", id).with("total", 1))
        }))
    };
    let mut graph = StateGraph::new(schema());
    graph
        .add_node("start", Arc::new(Recorder::new("start")))
        .add_node("first", write("first"))
        .add_node("second", write("second"))
        .add_edge(START, "start")
        .add_edge("start", "first")
        .add_edge("start", "second");
    let compiled = graph.compile().unwrap();

    let result = compiled
        .invoke(Delta::new(), RunConfig::default())
        .await
        .unwrap();
    assert_eq!(result.state().get_str("answer"), Some("second"));
    assert_eq!(result.state().get_i64("total"), Some(2));
}

fn check_graph() -> StateGraph {
    let mut graph = StateGraph::new(schema());
    graph
        .add_node(
            "score",
            Arc::new(FnNode::new("score", |s: &State| {
                let next = s.get_f64("score").unwrap_or(0.0) + 0.5;
                Outcome::success(Delta::new().with("score", next).with("log", json!(["score"])))
            })),
        )
        .add_node("publish", Arc::new(Recorder::new("publish")))
        .add_edge(START, "score")
        .add_edge("publish", END);
    graph.add_conditional_edges(
        "score",
        Arc::new(FnRouter::new(["retry", "proceed"], |s: &State| {
            if s.get_f64("score").unwrap_or(0.0) < 0.6 {
                "retry".to_string()
            } else {
                "proceed".to_string()
            }
        })),
        [("retry", "score"), ("proceed", "publish")],
    );
    graph
}

/// **Scenario**: The router sees the post-merge state and loops until the score passes.
#[tokio::test]
async fn conditional_loop_routes_on_merged_state() {
    let compiled = check_graph().compile().unwrap();
    let result = compiled
        .invoke(Delta::new(), RunConfig::default())
        .await
        .unwrap();
    let done = result.completed().expect("completed");
    assert_eq!(log_of(&done.state), vec!["score", "score", "publish"]);
    assert_eq!(done.state.get_f64("score"), Some(1.0));
    assert_eq!(done.steps, 3);
}

/// **Scenario**: The same loop with a high starting score proceeds at once.
#[tokio::test]
async fn initial_state_feeds_routing() {
    let compiled = check_graph().compile().unwrap();
    let result = compiled
        .invoke(Delta::new().with("score", 0.9), RunConfig::default())
        .await
        .unwrap();
    assert_eq!(log_of(result.state()), vec!["score", "publish"]);
}

/// **Scenario**: A self-loop with max_steps K stops with StepLimitExceeded
/// after exactly K handler calls.
#[tokio::test]
async fn self_loop_hits_step_limit() {
    let spin = Recorder::new("spin");
    let calls = spin.calls();
    let mut graph = StateGraph::new(schema());
    graph
        .add_node("spin", Arc::new(spin))
        .add_edge(START, "spin")
        .add_edge("spin", "spin");
    let compiled = graph.compile().unwrap();

    let result = compiled
        .invoke(Delta::new(), RunConfig::default().with_max_steps(5))
        .await
        .unwrap();
    let failure = result.failed().expect("failed");
    assert_eq!(failure.error, RunError::StepLimitExceeded { limit: 5 });
    assert_eq!(count(&calls), 5);
    assert_eq!(failure.history.len(), 5);
    assert_eq!(log_of(&failure.state).len(), 5);
}

/// **Scenario**: A label outside the declared set fails the run with a
/// routing error; history shows the node that routed.
#[tokio::test]
async fn undeclared_label_is_routing_error() {
    let mut graph = StateGraph::new(schema());
    graph
        .add_node("decide", Arc::new(Recorder::new("decide")))
        .add_edge(START, "decide");
    graph.add_conditional_edges(
        "decide",
        Arc::new(FnRouter::new(["yes", "no"], |_s: &State| "maybe".to_string())),
        [("yes", END), ("no", END)],
    );
    let compiled = graph.compile().unwrap();

    let result = compiled
        .invoke(Delta::new(), RunConfig::default())
        .await
        .unwrap();
    let failure = result.failed().expect("failed");
    match &failure.error {
        RunError::Routing {
            node,
            label,
            expected,
        } => {
            assert_eq!(node, "decide");
            assert_eq!(label, "maybe");
            assert_eq!(expected, &vec!["yes".to_string(), "no".to_string()]);
        }
        other => panic!("expected Routing, got {:?}", other),
    }
    assert_eq!(failure.history.len(), 1);
    assert_eq!(log_of(&failure.state), vec!["decide"]);
}

/// **Scenario**: A panicking router is reported as a routing error, not a crash.
#[tokio::test]
async fn panicking_router_is_routing_error() {
    let mut graph = StateGraph::new(schema());
    graph
        .add_node("decide", Arc::new(Recorder::new("decide")))
        .add_edge(START, "decide");
    graph.add_conditional_edges(
        "decide",
        Arc::new(FnRouter::new(["only"], |_s: &State| -> String { panic!("bad router") })),
        [("only", END)],
    );
    let compiled = graph.compile().unwrap();
    let result = compiled
        .invoke(Delta::new(), RunConfig::default())
        .await
        .unwrap();
    match &result.failed().expect("failed").error {
        RunError::Routing { label, .. } => assert!(label.contains("bad router"), "{}", label),
        other => panic!("expected Routing, got {:?}", other),
    }
}

/// **Scenario**: Two branches writing the same key of a merge-object field
/// with different values fail the run with a merge conflict.
#[tokio::test]
async fn conflicting_branches_fail_with_merge_conflict() {
    let schema = schema().with_field(
        "profile",
        FieldSpec::custom(FieldType::Map, Arc::new(MergeObject)),
    );
    let write = |id: &'static str| {
        Arc::new(FnNode::new(id, move |_s: &State| {
            Outcome::success(Delta::new().with("profile", json!({ "name": id })))
        }))
    };
    let mut graph = StateGraph::new(schema);
    graph
        .add_node("start", Arc::new(Recorder::new("start")))
        .add_node("left", write("left"))
        .add_node("right", write("right"))
        .add_edge(START, "start")
        .add_edge("start", "left")
        .add_edge("start", "right");
    let compiled = graph.compile().unwrap();

    let result = compiled
        .invoke(Delta::new(), RunConfig::default())
        .await
        .unwrap();
    let failure = result.failed().expect("failed");
    match &failure.error {
        RunError::State(StateError::MergeConflict { field, .. }) => assert_eq!(field, "profile"),
        other => panic!("expected MergeConflict, got {:?}", other),
    }
    assert_eq!(failure.history.len(), 3);
    assert!(failure.state.get("profile").is_none());
}

/// **Scenario**: A delta with an undeclared field fails the run with UnknownField.
#[tokio::test]
async fn undeclared_delta_field_fails_run() {
    let mut graph = StateGraph::new(schema());
    graph
        .add_node(
            "rogue",
            Arc::new(FnNode::new("rogue", |_s: &State| {
                Outcome::success(Delta::new().with("mystery", 1))
            })),
        )
        .add_edge(START, "rogue");
    let compiled = graph.compile().unwrap();
    let result = compiled
        .invoke(Delta::new(), RunConfig::default())
        .await
        .unwrap();
    assert!(matches!(
        result.failed().map(|f| &f.error),
        Some(RunError::State(StateError::UnknownField { .. }))
    ));
}

/// **Scenario**: Input with a wrong type is rejected before any round runs.
#[tokio::test]
async fn mistyped_input_is_rejected() {
    let mut graph = StateGraph::new(schema());
    graph
        .add_node("a", Arc::new(Recorder::new("a")))
        .add_edge(START, "a");
    let compiled = graph.compile().unwrap();
    let err = compiled
        .invoke(Delta::new().with("score", "high"), RunConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::State(StateError::TypeMismatch { .. })));
}

/// Cancels the run's token from inside a handler.
struct CancelSelf;

#[async_trait]
impl Node for CancelSelf {
    fn id(&self) -> &str {
        "cancel"
    }

    async fn run(&self, _state: Arc<State>) -> Outcome {
        Outcome::empty()
    }

    async fn run_with_context(&self, _state: Arc<State>, ctx: &RunContext) -> Outcome {
        ctx.cancel.cancel();
        Outcome::success(Delta::new().with("log", json!(["cancel"])))
    }
}

/// **Scenario**: Cancellation is observed before the next round; the round
/// in flight still merges.
#[tokio::test]
async fn cancellation_stops_before_next_round() {
    let next = Recorder::new("next");
    let next_calls = next.calls();
    let mut graph = StateGraph::new(schema());
    graph
        .add_node("cancel", Arc::new(CancelSelf))
        .add_node("next", Arc::new(next))
        .add_edge(START, "cancel")
        .add_edge("cancel", "next");
    let compiled = graph.compile().unwrap();

    let result = compiled
        .invoke(Delta::new(), RunConfig::default())
        .await
        .unwrap();
    assert_eq!(result.status(), RunStatus::Failed);
    let failure = result.failed().unwrap();
    assert_eq!(failure.error, RunError::Cancelled);
    assert_eq!(log_of(&failure.state), vec!["cancel"]);
    assert_eq!(count(&next_calls), 0);
}

/// **Scenario**: A token cancelled up front fails the run without dispatching.
#[tokio::test]
async fn pre_cancelled_run_dispatches_nothing() {
    let a = Recorder::new("a");
    let calls = a.calls();
    let mut graph = StateGraph::new(schema());
    graph.add_node("a", Arc::new(a)).add_edge(START, "a");
    let compiled = graph.compile().unwrap();

    let token = tokio_util::sync::CancellationToken::new();
    token.cancel();
    let result = compiled
        .invoke(Delta::new(), RunConfig::default().with_cancellation(token))
        .await
        .unwrap();
    assert_eq!(result.failed().map(|f| f.error.clone()), Some(RunError::Cancelled));
    assert_eq!(count(&calls), 0);
}

/// **Scenario**: A node without outgoing edges ends the run.
#[tokio::test]
async fn node_without_edges_is_implicit_end() {
    let mut graph = StateGraph::new(schema());
    graph
        .add_node("only", Arc::new(Recorder::new("only")))
        .add_edge(START, "only");
    let compiled = graph.compile().unwrap();
    let result = compiled
        .invoke(Delta::new(), RunConfig::default().with_run_id("solo"))
        .await
        .unwrap();
    assert_eq!(result.status(), RunStatus::Completed);
    assert_eq!(result.run_id(), "solo");
}
