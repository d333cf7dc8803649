//! with_store: nodes read and write the session store through RunContext.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use stategraph::{
    Delta, FieldSpec, FieldType, InMemoryStore, Node, Outcome, RunConfig, RunContext, State,
    StateGraph, StateSchema, Store, END, START,
};

/// Counts visits per user in the store and copies the count into state.
struct Visit;

#[async_trait]
impl Node for Visit {
    fn id(&self) -> &str {
        "visit"
    }

    async fn run(&self, _state: Arc<State>) -> Outcome {
        Outcome::fatal("visit needs a store")
    }

    async fn run_with_context(&self, state: Arc<State>, ctx: &RunContext) -> Outcome {
        let Some(store) = &ctx.store else {
            return Outcome::fatal("no store configured");
        };
        let ns = vec![state.get_str("user").unwrap_or("anon").to_string(), "visits".into()];
        let seen = match store.get(&ns, "count").await {
            Ok(v) => v.and_then(|v| v.as_i64()).unwrap_or(0),
            Err(e) => return Outcome::failure(e.to_string()),
        };
        if let Err(e) = store.put(&ns, "count", &json!(seen + 1)).await {
            return Outcome::failure(e.to_string());
        }
        Outcome::success(Delta::new().with("visits", seen + 1))
    }
}

fn schema() -> StateSchema {
    StateSchema::new()
        .with_field("user", FieldSpec::overwrite(FieldType::String))
        .with_field("visits", FieldSpec::overwrite(FieldType::Number))
}

/// **Scenario**: The same store is shared across runs of one compiled graph.
#[tokio::test]
async fn store_persists_across_runs() {
    let store = Arc::new(InMemoryStore::new());
    let mut graph = StateGraph::new(schema()).with_store(store.clone());
    graph
        .add_node("visit", Arc::new(Visit))
        .add_edge(START, "visit")
        .add_edge("visit", END);
    let compiled = graph.compile().unwrap();
    assert!(compiled.store().is_some());

    for expected in 1..=3 {
        let result = compiled
            .invoke(Delta::new().with("user", "ada"), RunConfig::default())
            .await
            .unwrap();
        assert_eq!(result.state().get_i64("visits"), Some(expected));
    }
    let other = compiled
        .invoke(Delta::new().with("user", "bob"), RunConfig::default())
        .await
        .unwrap();
    assert_eq!(other.state().get_i64("visits"), Some(1));

    let ns = vec!["ada".to_string(), "visits".to_string()];
    assert_eq!(store.get(&ns, "count").await.unwrap(), Some(json!(3)));
}

/// **Scenario**: Without with_store the context has no store.
#[tokio::test]
async fn no_store_by_default() {
    let mut graph = StateGraph::new(schema());
    graph.add_node("visit", Arc::new(Visit)).add_edge(START, "visit");
    let compiled = graph.compile().unwrap();
    assert!(compiled.store().is_none());
    let result = compiled
        .invoke(Delta::new(), RunConfig::default())
        .await
        .unwrap();
    assert!(result.failed().is_some());
}
