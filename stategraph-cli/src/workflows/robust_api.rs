//! Flaky API call guarded by retries, exponential backoff and a fallback service.
//!
//! `scenario` scripts the API: entry `i` is what attempt `i + 1` sees. Error
//! names are `network_timeout`, `server_error`, `rate_limit` and `slow`
//! (retryable) or `authentication`, `bad_request` (not retryable). Attempts
//! past the end of the list, or with `ok`, succeed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use stategraph::{
    Backoff, Delta, FieldSpec, FieldType, FnNode, Node, NodePolicy, Outcome, RetryPolicy,
    RunContext, State, StateGraph, StateSchema, Store, END, START,
};

pub const MAX_ATTEMPTS: u32 = 3;
pub const CALL_TIMEOUT: Duration = Duration::from_millis(500);

pub fn schema() -> StateSchema {
    StateSchema::new()
        .with_field(
            "endpoint",
            FieldSpec::overwrite(FieldType::String).with_default("/v1/orders"),
        )
        .with_field(
            "scenario",
            FieldSpec::overwrite(FieldType::List)
                .with_default(json!(["network_timeout", "server_error"])),
        )
        .with_field("response", FieldSpec::overwrite(FieldType::Map))
        .with_field("source", FieldSpec::overwrite(FieldType::String))
        .with_field("execution_log", FieldSpec::append())
        .with_field("result", FieldSpec::overwrite(FieldType::String))
        .with_field("status", FieldSpec::overwrite(FieldType::String))
}

pub fn default_input() -> Delta {
    Delta::new()
}

pub fn policy() -> NodePolicy {
    NodePolicy::new()
        .with_retry(
            RetryPolicy::new(MAX_ATTEMPTS)
                .with_backoff(Backoff::Exponential {
                    initial: Duration::from_millis(20),
                    factor: 2.0,
                    max: Duration::from_millis(200),
                })
                .with_fallback("fallback_service"),
        )
        .with_timeout(CALL_TIMEOUT)
}

pub fn build(_store: Arc<dyn Store>) -> StateGraph {
    let mut graph = StateGraph::new(schema());
    graph
        .add_node_with_policy("api_call", Arc::new(ApiCall), policy())
        .add_node(
            "fallback_service",
            Arc::new(FnNode::new("fallback_service", fallback_service)),
        )
        .add_node(
            "result_processor",
            Arc::new(FnNode::new("result_processor", process_result)),
        )
        .add_edge(START, "api_call")
        .add_edge("api_call", "result_processor")
        .add_edge("fallback_service", "result_processor")
        .add_edge("result_processor", END);
    graph
}

/// Whether an API error name is worth retrying. `None` for unknown names.
pub fn is_retryable(error: &str) -> Option<bool> {
    match error {
        "network_timeout" | "server_error" | "rate_limit" | "slow" => Some(true),
        "authentication" | "bad_request" => Some(false),
        _ => None,
    }
}

struct ApiCall;

#[async_trait]
impl Node for ApiCall {
    fn id(&self) -> &str {
        "api_call"
    }

    async fn run(&self, state: Arc<State>) -> Outcome {
        self.run_with_context(state, &RunContext::new("standalone", "api_call"))
            .await
    }

    async fn run_with_context(&self, state: Arc<State>, ctx: &RunContext) -> Outcome {
        let endpoint = state.get_str("endpoint").unwrap_or("/").to_string();
        let scripted = state
            .get_list("scenario")
            .get(ctx.attempt.saturating_sub(1) as usize)
            .and_then(Value::as_str)
            .unwrap_or("ok");
        match (scripted, is_retryable(scripted)) {
            ("ok", _) => Outcome::success(
                Delta::new()
                    .with(
                        "response",
                        json!({ "endpoint": endpoint, "status": 200, "attempt": ctx.attempt }),
                    )
                    .with("source", "primary")
                    .with(
                        "execution_log",
                        json!([format!("api_call succeeded on attempt {}", ctx.attempt)]),
                    ),
            ),
            ("slow", _) => {
                tokio::time::sleep(CALL_TIMEOUT * 4).await;
                Outcome::failure("slow: response arrived too late")
            }
            (error, Some(true)) => Outcome::failure(format!("{} calling {}", error, endpoint)),
            (error, Some(false)) => Outcome::fatal(format!("{} calling {}", error, endpoint)),
            (other, None) => Outcome::fatal(format!("unknown scenario entry '{}'", other)),
        }
    }
}

fn fallback_service(state: &State) -> Outcome {
    let endpoint = state.get_str("endpoint").unwrap_or("/");
    Outcome::success(
        Delta::new()
            .with(
                "response",
                json!({ "endpoint": endpoint, "status": 200, "cached": true }),
            )
            .with("source", "fallback")
            .with(
                "execution_log",
                json!(["fallback_service served cached data"]),
            ),
    )
}

fn process_result(state: &State) -> Outcome {
    let (result, status) = match state.get_str("source") {
        Some("primary") => (
            format!(
                "primary API responded on attempt {}",
                state.get_path("response.attempt").cloned().unwrap_or(Value::Null)
            ),
            "ok",
        ),
        Some("fallback") => ("served from fallback cache".to_string(), "degraded"),
        _ => return Outcome::fatal("no response to process"),
    };
    Outcome::success(
        Delta::new()
            .with("result", result)
            .with("status", status)
            .with("execution_log", json!(["result_processor finished"])),
    )
}
