//! # Memory: checkpointing, run config and session store
//!
//! Two distinct capabilities:
//!
//! 1. **Checkpoint store**: persists a suspended run's [`RunRecord`] (state,
//!    frontier, history, suspension marker) keyed by run id, so it can be
//!    resumed later. [`MemoryCheckpointStore`] is the default.
//! 2. **Store**: cross-run key-value memory isolated by [`Namespace`], e.g.
//!    per session id. Injected with `StateGraph::with_store`.
//!
//! | Type                      | Persistence | Use case              |
//! |---------------------------|-------------|-----------------------|
//! | [`MemoryCheckpointStore`] | In-memory   | Default, tests        |
//! | [`InMemoryStore`]         | In-memory   | Session memory        |
//!
//! Durable backends implement [`CheckpointStore`] / [`Store`] outside this crate.

mod checkpoint;
mod checkpointer;
mod config;
mod in_memory_store;
mod memory_saver;
mod serializer;
mod store;

pub use checkpoint::{
    FrontierEntry, HistoryEntry, OutcomeRecord, PendingRound, RunRecord, SuspensionMarker,
};
pub use checkpointer::{CheckpointError, CheckpointStore};
pub use config::{RunConfig, DEFAULT_MAX_STEPS};
pub use in_memory_store::InMemoryStore;
pub use memory_saver::MemoryCheckpointStore;
pub use serializer::{JsonSerializer, Serializer};
pub use store::{Namespace, Store, StoreError, StoreSearchHit};
