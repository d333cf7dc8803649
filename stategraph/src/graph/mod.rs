//! State graph: nodes, static and conditional edges, compile and run.
//!
//! Build a [`StateGraph`] over a `StateSchema`, add nodes and edges, compile,
//! then `invoke`, `stream` or `resume` the [`CompiledStateGraph`].

mod compile_error;
mod compiled;
mod executor;
mod logging;
mod node;
mod node_middleware;
mod outcome;
mod policy;
mod result;
mod router;
mod run_context;
mod state_graph;

pub use compile_error::{CompilationError, GraphWarning};
pub use compiled::CompiledStateGraph;
pub use executor::NodeExecutor;
pub use node::{FnNode, Node};
pub use node_middleware::{NodeCall, NodeFuture, NodeMiddleware};
pub use outcome::{FailureKind, NodeFailure, Outcome};
pub use policy::{Backoff, NodePolicy, RetryPolicy};
pub use result::{Completion, RunFailure, RunResult, RunStatus, Suspension};
pub use router::{FnRouter, Router};
pub use run_context::RunContext;
pub use state_graph::{StateGraph, END, START};
