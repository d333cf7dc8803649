//! Node middleware: wraps every node invocation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::state::State;

use super::outcome::Outcome;

/// Boxed future returned by the inner node call.
pub type NodeFuture = Pin<Box<dyn Future<Output = Outcome> + Send>>;

/// Continuation that runs the wrapped node.
pub type NodeCall = Box<dyn FnOnce(Arc<State>) -> NodeFuture + Send>;

/// Wraps node execution (logging, metrics, outcome rewriting).
///
/// Runs inside the node's task, so it is covered by the node timeout and a
/// panic here is reported as the node's `HandlerPanic`.
#[async_trait]
pub trait NodeMiddleware: Send + Sync {
    async fn around_run(&self, node_id: &str, state: Arc<State>, inner: NodeCall) -> Outcome;
}
