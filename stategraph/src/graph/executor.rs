//! Node Executor: runs handlers against a snapshot and normalizes the result.
//!
//! Every invocation runs in its own tokio task, so a panicking handler is
//! reported as `Failure(HandlerPanic)` instead of unwinding into the engine.
//! The optional per-node timeout races the handler (middleware included)
//! against a timer; the backoff delay is slept before the race starts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::memory::{FrontierEntry, Store};
use crate::state::State;
use crate::stream::EventSink;

use super::logging::{log_node_outcome, log_node_start};
use super::node::Node;
use super::node_middleware::{NodeFuture, NodeMiddleware};
use super::outcome::{NodeFailure, Outcome};
use super::policy::NodePolicy;
use super::router::panic_message;
use super::run_context::RunContext;

/// Registered handler plus its policy.
#[derive(Clone)]
pub(crate) struct NodeEntry {
    pub node: Arc<dyn Node>,
    pub policy: NodePolicy,
}

/// Values shared by every dispatch in one round.
pub(crate) struct RoundContext {
    pub run_id: String,
    pub step: u64,
    pub cancel: CancellationToken,
    pub store: Option<Arc<dyn Store>>,
    pub events: Option<EventSink>,
}

impl RoundContext {
    fn for_entry(&self, entry: &FrontierEntry) -> RunContext {
        RunContext {
            run_id: self.run_id.clone(),
            node_id: entry.node_id.clone(),
            step: self.step,
            attempt: entry.attempt,
            cancel: self.cancel.clone(),
            store: self.store.clone(),
            events: self.events.clone(),
        }
    }
}

/// Invokes registered nodes; cheap to clone.
#[derive(Clone)]
pub struct NodeExecutor {
    nodes: Arc<HashMap<String, NodeEntry>>,
    middleware: Option<Arc<dyn NodeMiddleware>>,
}

impl NodeExecutor {
    pub(crate) fn new(
        nodes: HashMap<String, NodeEntry>,
        middleware: Option<Arc<dyn NodeMiddleware>>,
    ) -> Self {
        Self {
            nodes: Arc::new(nodes),
            middleware,
        }
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.contains_key(node_id)
    }

    pub fn policy(&self, node_id: &str) -> Option<&NodePolicy> {
        self.nodes.get(node_id).map(|e| &e.policy)
    }

    /// Runs one node against `snapshot` and returns its normalized outcome.
    ///
    /// Unknown ids yield a non-retryable failure.
    pub async fn execute(&self, node_id: &str, snapshot: Arc<State>, ctx: RunContext) -> Outcome {
        match self.nodes.get(node_id) {
            Some(entry) => {
                let handle = self.spawn(entry.clone(), snapshot, ctx, Duration::ZERO);
                Self::join(node_id, handle).await
            }
            None => Outcome::fatal(format!("unknown node '{}'", node_id)),
        }
    }

    /// Runs every frontier entry concurrently and waits for all of them.
    ///
    /// Outcomes are returned in frontier order regardless of completion order.
    pub(crate) async fn dispatch_round(
        &self,
        frontier: &[FrontierEntry],
        snapshot: Arc<State>,
        round: &RoundContext,
    ) -> Vec<Outcome> {
        let handles: Vec<(String, Option<JoinHandle<Outcome>>)> = frontier
            .iter()
            .map(|entry| {
                let handle = self.nodes.get(&entry.node_id).map(|node| {
                    self.spawn(
                        node.clone(),
                        snapshot.clone(),
                        round.for_entry(entry),
                        Duration::from_millis(entry.delay_ms),
                    )
                });
                (entry.node_id.clone(), handle)
            })
            .collect();

        join_all(handles.into_iter().map(|(node_id, handle)| async move {
            match handle {
                Some(handle) => Self::join(&node_id, handle).await,
                None => Outcome::fatal(format!("unknown node '{}'", node_id)),
            }
        }))
        .await
    }

    fn spawn(
        &self,
        entry: NodeEntry,
        snapshot: Arc<State>,
        ctx: RunContext,
        delay: Duration,
    ) -> JoinHandle<Outcome> {
        let middleware = self.middleware.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let node_id = ctx.node_id.clone();
            let attempt = ctx.attempt;
            log_node_start(&node_id, attempt);

            let call = invoke(entry.node, middleware, snapshot, ctx);
            let outcome = match entry.policy.timeout {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(outcome) => outcome,
                    Err(_) => Outcome::Failure(NodeFailure::timeout(limit)),
                },
                None => call.await,
            };
            log_node_outcome(&node_id, attempt, &outcome);
            outcome
        })
    }

    async fn join(node_id: &str, handle: JoinHandle<Outcome>) -> Outcome {
        match handle.await {
            Ok(outcome) => outcome,
            Err(err) if err.is_panic() => {
                let detail = panic_message(err.into_panic().as_ref());
                tracing::error!(node_id, detail = %detail, "Node panicked");
                Outcome::Failure(NodeFailure::panic(detail))
            }
            Err(err) => Outcome::Failure(NodeFailure::new(format!("task aborted: {}", err))),
        }
    }
}

async fn invoke(
    node: Arc<dyn Node>,
    middleware: Option<Arc<dyn NodeMiddleware>>,
    snapshot: Arc<State>,
    ctx: RunContext,
) -> Outcome {
    match middleware {
        Some(middleware) => {
            let node_id = ctx.node_id.clone();
            middleware
                .around_run(
                    &node_id,
                    snapshot,
                    Box::new(move |s: Arc<State>| -> NodeFuture {
                        Box::pin(async move { node.run_with_context(s, &ctx).await })
                    }),
                )
                .await
        }
        None => node.run_with_context(snapshot, &ctx).await,
    }
}
