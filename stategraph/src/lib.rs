//! # stategraph
//!
//! A stateful workflow engine. A workflow is a directed graph of nodes over a
//! shared, schema-typed state. Nodes read an immutable snapshot and return a
//! partial update (a [`Delta`]); the engine merges updates with per-field
//! policies, routes to successors, and runs independent branches concurrently.
//!
//! ## Design Principles
//!
//! - **Rounds**: every node scheduled for the same round sees the same
//!   snapshot. Deltas are merged after all of them finish, in frontier order,
//!   so the result never depends on completion order.
//! - **Outcomes, not errors**: handlers return [`Outcome`]; failures, panics
//!   and timeouts are retried per [`NodePolicy`] and may fall back to another
//!   node.
//! - **Suspend / resume**: a node can pause the run for external input. The
//!   run is checkpointed through a [`CheckpointStore`] and continued with
//!   `CompiledStateGraph::resume`.
//!
//! ## Main Modules
//!
//! - [`state`]: `StateSchema`, merge policies, reducers, `State` and `Delta`.
//! - [`graph`]: `StateGraph`, `CompiledStateGraph`, `Node`, `Router`, policies.
//! - [`memory`]: run records, checkpoint stores, `RunConfig`, session `Store`.
//! - [`stream`]: `StreamMode` and `RunEvent` for `CompiledStateGraph::stream`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stategraph::{
//!     Delta, FieldSpec, FieldType, FnNode, Outcome, RunConfig, State, StateGraph, StateSchema,
//!     END, START,
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let schema = StateSchema::new().with_field("greeting", FieldSpec::overwrite(FieldType::String));
//! let mut graph = StateGraph::new(schema);
//! graph
//!     .add_node("hello", Arc::new(FnNode::new("hello", |_s: &State| {
//!         Outcome::success(Delta::new().with("greeting", "hello"))
//!     })))
//!     .add_edge(START, "hello")
//!     .add_edge("hello", END);
//! let compiled = graph.compile().unwrap();
//! let result = compiled.invoke(Delta::new(), RunConfig::default()).await.unwrap();
//! assert_eq!(result.state().get_str("greeting"), Some("hello"));
//! # }
//! ```

pub mod error;
pub mod graph;
pub mod memory;
pub mod state;
pub mod stream;

pub use error::RunError;
pub use graph::{
    Backoff, CompilationError, CompiledStateGraph, Completion, FailureKind, FnNode, FnRouter,
    GraphWarning, Node, NodeCall, NodeExecutor, NodeFailure, NodeFuture, NodeMiddleware,
    NodePolicy, Outcome, RetryPolicy, Router, RunContext, RunFailure, RunResult, RunStatus,
    StateGraph, Suspension, END, START,
};
pub use memory::{
    CheckpointError, CheckpointStore, FrontierEntry, HistoryEntry, InMemoryStore,
    JsonSerializer, MemoryCheckpointStore, Namespace, OutcomeRecord, PendingRound, RunConfig, RunRecord,
    Serializer, Store, StoreError, StoreSearchHit, SuspensionMarker, DEFAULT_MAX_STEPS,
};
pub use state::{
    Delta, FieldSpec, FieldType, Max, MergeObject, MergePolicy, Min, Reducer, ResumeField,
    ResumeSchema, State, StateError, StateSchema, StateUpdate, Sum,
};
pub use stream::{RunEvent, StreamMode};
