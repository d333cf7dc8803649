//! Node handler capability.

use std::sync::Arc;

use async_trait::async_trait;

use crate::state::State;

use super::outcome::Outcome;
use super::run_context::RunContext;

/// One unit of work in a graph.
///
/// Receives an immutable snapshot of the state taken before the round
/// started and returns an [`Outcome`]. Handlers must be idempotent with
/// respect to retries, or be registered with `max_attempts = 1`.
#[async_trait]
pub trait Node: Send + Sync {
    /// Identifier used in logs.
    fn id(&self) -> &str;

    async fn run(&self, state: Arc<State>) -> Outcome;

    /// Like `run` with access to the run id, attempt, cancellation token and
    /// session store. Defaults to `run`.
    async fn run_with_context(&self, state: Arc<State>, _ctx: &RunContext) -> Outcome {
        self.run(state).await
    }
}

/// Adapts a synchronous closure into a [`Node`].
pub struct FnNode<F> {
    id: String,
    f: F,
}

impl<F> FnNode<F>
where
    F: Fn(&State) -> Outcome + Send + Sync + 'static,
{
    pub fn new(id: impl Into<String>, f: F) -> Self {
        Self { id: id.into(), f }
    }
}

#[async_trait]
impl<F> Node for FnNode<F>
where
    F: Fn(&State) -> Outcome + Send + Sync + 'static,
{
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self, state: Arc<State>) -> Outcome {
        (self.f)(&state)
    }
}
