//! Per-invocation context handed to `Node::run_with_context`.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::memory::Store;
use crate::stream::{EventSink, RunEvent, StreamMode};

#[derive(Clone)]
pub struct RunContext {
    pub run_id: String,
    pub node_id: String,
    /// Round number, starting at 1.
    pub step: u64,
    /// Attempt number for this node, starting at 1.
    pub attempt: u32,
    /// Run-level cancellation; long-running handlers should poll or select on it.
    pub cancel: CancellationToken,
    /// Session store injected with `StateGraph::with_store`.
    pub store: Option<Arc<dyn Store>>,
    pub(crate) events: Option<EventSink>,
}

impl RunContext {
    /// Context for a standalone invocation: step 1, attempt 1, no store.
    pub fn new(run_id: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            node_id: node_id.into(),
            step: 1,
            attempt: 1,
            cancel: CancellationToken::new(),
            store: None,
            events: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Emits a custom payload to `stream` consumers that selected `StreamMode::Custom`.
    /// No-op for `invoke`.
    pub async fn emit(&self, payload: Value) {
        if let Some(sink) = &self.events {
            sink.send(
                StreamMode::Custom,
                RunEvent::Custom {
                    node_id: self.node_id.clone(),
                    payload,
                },
            )
            .await;
        }
    }
}
