//! Logging middleware that records node enter/exit around each invocation.

use std::sync::Arc;

use async_trait::async_trait;
use stategraph::{NodeCall, NodeMiddleware, Outcome, State};

/// Middleware that logs node enter/exit around each node call.
///
/// Emits `tracing` events at `debug`, so output shows up with `--verbose`
/// or `RUST_LOG=debug` and goes wherever the subscriber writes (stderr).
pub struct LoggingMiddleware;

#[async_trait]
impl NodeMiddleware for LoggingMiddleware {
    async fn around_run(&self, node_id: &str, state: Arc<State>, inner: NodeCall) -> Outcome {
        tracing::debug!(node_id, version = state.version(), "node enter");
        let outcome = inner(state).await;
        match &outcome {
            Outcome::Success(delta) => {
                let keys: Vec<&str> = delta.iter().map(|(k, _)| k.as_str()).collect();
                tracing::debug!(node_id, ?keys, "node exit")
            }
            Outcome::Failure(failure) => {
                tracing::debug!(node_id, error = %failure, "node exit")
            }
            Outcome::Suspend { reason, .. } => {
                tracing::debug!(node_id, reason = %reason, "node exit: suspend")
            }
        }
        outcome
    }
}
