//! Logging utilities for graph execution.
//!
//! Structured `tracing` events for run, round and node lifecycle. Fields are
//! key/value so they can be filtered with `RUST_LOG`.

use std::time::Duration;

use crate::error::RunError;
use crate::graph::Outcome;

pub fn log_run_start(run_id: &str, frontier: &[String]) {
    tracing::info!(run_id, ?frontier, "Starting graph run");
}

pub fn log_round_start(run_id: &str, step: u64, frontier: &[String]) {
    tracing::debug!(run_id, step, ?frontier, "Dispatching round");
}

pub fn log_node_start(node_id: &str, attempt: u32) {
    tracing::debug!(node_id, attempt, "Starting node execution");
}

pub fn log_node_outcome(node_id: &str, attempt: u32, outcome: &Outcome) {
    match outcome {
        Outcome::Success(delta) => {
            tracing::debug!(node_id, attempt, fields = delta.len(), "Node succeeded")
        }
        Outcome::Failure(f) => tracing::warn!(
            node_id,
            attempt,
            kind = %f.kind,
            detail = %f.detail,
            retryable = f.retryable,
            "Node failed"
        ),
        Outcome::Suspend { reason, .. } => {
            tracing::info!(node_id, attempt, reason = %reason, "Node requested suspension")
        }
    }
}

pub fn log_retry(node_id: &str, next_attempt: u32, delay: Duration) {
    tracing::warn!(node_id, next_attempt, ?delay, "Retrying node");
}

pub fn log_fallback(node_id: &str, fallback: &str, attempts: u32) {
    tracing::warn!(node_id, fallback, attempts, "Attempts exhausted, routing to fallback");
}

pub fn log_suspended(run_id: &str, node_id: &str, step: u64) {
    tracing::info!(run_id, node_id, step, "Run suspended");
}

pub fn log_resumed(run_id: &str, node_id: &str) {
    tracing::info!(run_id, node_id, "Resuming run");
}

pub fn log_run_complete(run_id: &str, steps: u64) {
    tracing::info!(run_id, steps, "Graph run complete");
}

pub fn log_run_failed(run_id: &str, error: &RunError) {
    tracing::error!(run_id, %error, "Graph run failed");
}
