//! with_middleware: wraps every node invocation, inside the node's task.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use stategraph::{
    Delta, NodeCall, NodeMiddleware, NodePolicy, Outcome, RetryPolicy, RunConfig, State,
    StateGraph, END, START,
};
use tokio::sync::Mutex;

use crate::common::{log_of, schema, Flaky, Recorder};

/// Records enter/exit around each node.
#[derive(Default)]
struct Tracer {
    events: Mutex<Vec<String>>,
}

#[async_trait]
impl NodeMiddleware for Tracer {
    async fn around_run(&self, node_id: &str, state: Arc<State>, inner: NodeCall) -> Outcome {
        self.events.lock().await.push(format!("enter:{}", node_id));
        let outcome = inner(state).await;
        self.events.lock().await.push(format!("exit:{}", node_id));
        outcome
    }
}

/// **Scenario**: Middleware sees every invocation, retries included.
#[tokio::test]
async fn middleware_wraps_each_attempt() {
    let tracer = Arc::new(Tracer::default());
    let mut graph = StateGraph::new(schema()).with_middleware(tracer.clone());
    graph
        .add_node_with_policy(
            "api",
            Arc::new(Flaky::new("api", 1)),
            NodePolicy::new().with_retry(RetryPolicy::new(2)),
        )
        .add_node("done", Arc::new(Recorder::new("done")))
        .add_edge(START, "api")
        .add_edge("api", "done")
        .add_edge("done", END);
    let compiled = graph.compile().unwrap();

    let result = compiled
        .invoke(Delta::new(), RunConfig::default())
        .await
        .unwrap();
    assert_eq!(log_of(result.state()), vec!["api", "done"]);
    assert_eq!(
        *tracer.events.lock().await,
        vec!["enter:api", "exit:api", "enter:api", "exit:api", "enter:done", "exit:done"]
    );
}

/// Rewrites failures into empty successes.
struct Swallow;

#[async_trait]
impl NodeMiddleware for Swallow {
    async fn around_run(&self, _node_id: &str, state: Arc<State>, inner: NodeCall) -> Outcome {
        match inner(state).await {
            Outcome::Failure(_) => Outcome::success(Delta::new().with("log", json!(["swallowed"]))),
            other => other,
        }
    }
}

/// **Scenario**: Middleware can rewrite the outcome the engine sees.
#[tokio::test]
async fn middleware_rewrites_outcome() {
    let mut graph = StateGraph::new(schema()).with_middleware(Arc::new(Swallow));
    graph
        .add_node("api", Arc::new(Flaky::new("api", 1)))
        .add_edge(START, "api");
    let compiled = graph.compile().unwrap();
    let result = compiled
        .invoke(Delta::new(), RunConfig::default())
        .await
        .unwrap();
    assert_eq!(log_of(result.state()), vec!["swallowed"]);
}

/// Sleeps before calling the node.
struct Stall;

#[async_trait]
impl NodeMiddleware for Stall {
    async fn around_run(&self, _node_id: &str, state: Arc<State>, inner: NodeCall) -> Outcome {
        tokio::time::sleep(Duration::from_millis(300)).await;
        inner(state).await
    }
}

/// **Scenario**: Time spent in middleware counts against the node timeout.
#[tokio::test]
async fn middleware_is_inside_timeout() {
    let mut graph = StateGraph::new(schema()).with_middleware(Arc::new(Stall));
    graph
        .add_node_with_policy(
            "api",
            Arc::new(Recorder::new("api")),
            NodePolicy::new().with_timeout(Duration::from_millis(30)),
        )
        .add_edge(START, "api");
    let compiled = graph.compile().unwrap();
    let result = compiled
        .invoke(Delta::new(), RunConfig::default())
        .await
        .unwrap();
    assert_eq!(
        result.failed().and_then(|f| f.error.failure_kind()),
        Some(stategraph::FailureKind::HandlerTimeout)
    );
}
