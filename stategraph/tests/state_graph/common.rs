//! Shared schema and node helpers for state graph integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use stategraph::{
    Delta, FieldSpec, FieldType, Node, Outcome, State, StateSchema, Sum,
};

/// `log` and `results` append, `score` / `answer` / `approved` overwrite,
/// `total` sums.
pub fn schema() -> StateSchema {
    StateSchema::new()
        .with_field("log", FieldSpec::append())
        .with_field("results", FieldSpec::append())
        .with_field("score", FieldSpec::overwrite(FieldType::Number))
        .with_field("answer", FieldSpec::overwrite(FieldType::String))
        .with_field("approved", FieldSpec::overwrite(FieldType::Boolean))
        .with_field(
            "total",
            FieldSpec::custom(FieldType::Number, Arc::new(Sum)).with_default(0),
        )
}

/// Appends its id to `log` after an optional delay and counts calls.
pub struct Recorder {
    id: String,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl Recorder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl Node for Recorder {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self, _state: Arc<State>) -> Outcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Outcome::success(Delta::new().with("log", json!([self.id])))
    }
}

/// Fails (retryably) for the first `failures` calls, then appends its id.
pub struct Flaky {
    id: String,
    failures: usize,
    calls: Arc<AtomicUsize>,
}

impl Flaky {
    pub fn new(id: &str, failures: usize) -> Self {
        Self {
            id: id.to_string(),
            failures,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl Node for Flaky {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self, _state: Arc<State>) -> Outcome {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            Outcome::failure(format!("{} unavailable (call {})", self.id, n + 1))
        } else {
            Outcome::success(Delta::new().with("log", json!([self.id])))
        }
    }
}

pub fn count(calls: &Arc<AtomicUsize>) -> usize {
    calls.load(Ordering::SeqCst)
}

/// Ids recorded in `log`, in order.
pub fn log_of(state: &State) -> Vec<String> {
    state
        .get_list("log")
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}
