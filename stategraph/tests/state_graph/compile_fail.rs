//! StateGraph compile failure cases: unknown nodes, START/END misuse, label sets.

use std::sync::Arc;

use stategraph::{
    CompilationError, FnRouter, NodePolicy, RetryPolicy, State, StateGraph, END, START,
};

use crate::common::{schema, Recorder};

#[test]
fn compile_fails_when_edge_refers_to_unknown_node() {
    let mut graph = StateGraph::new(schema());
    graph.add_node("echo", Arc::new(Recorder::new("echo")));
    graph.add_edge(START, "echo");
    graph.add_edge("echo", "missing");

    match graph.compile() {
        Err(CompilationError::NodeNotFound(id)) => assert_eq!(id, "missing"),
        _ => panic!("expected NodeNotFound"),
    }
}

#[test]
fn compile_fails_without_start_edge() {
    let mut graph = StateGraph::new(schema());
    graph.add_node("a", Arc::new(Recorder::new("a")));
    graph.add_edge("a", END);
    assert!(matches!(graph.compile(), Err(CompilationError::MissingStart)));
}

#[test]
fn compile_fails_with_two_start_edges() {
    let mut graph = StateGraph::new(schema());
    graph
        .add_node("a", Arc::new(Recorder::new("a")))
        .add_node("b", Arc::new(Recorder::new("b")))
        .add_edge(START, "a")
        .add_edge(START, "b");
    match graph.compile() {
        Err(CompilationError::MultipleStart(ids)) => assert_eq!(ids, vec!["a", "b"]),
        _ => panic!("expected MultipleStart"),
    }
}

#[test]
fn compile_fails_on_reserved_id_and_end_source() {
    let mut graph = StateGraph::new(schema());
    graph.add_node(END, Arc::new(Recorder::new("end")));
    graph.add_edge(START, END);
    assert!(matches!(graph.compile(), Err(CompilationError::ReservedNodeId(_))));

    let mut graph = StateGraph::new(schema());
    graph
        .add_node("a", Arc::new(Recorder::new("a")))
        .add_edge(START, "a")
        .add_edge(END, "a");
    assert!(matches!(graph.compile(), Err(CompilationError::InvalidEdge(_))));
}

/// **Scenario**: A mapping key the router never declares is rejected at compile time.
#[test]
fn compile_fails_on_label_mismatch() {
    let mut graph = StateGraph::new(schema());
    graph
        .add_node("check", Arc::new(Recorder::new("check")))
        .add_edge(START, "check");
    graph.add_conditional_edges(
        "check",
        Arc::new(FnRouter::new(["retry", "proceed"], |_s: &State| "proceed".to_string())),
        [("proceed", END), ("skip", END)],
    );
    match graph.compile() {
        Err(CompilationError::LabelMismatch {
            node,
            missing,
            unexpected,
        }) => {
            assert_eq!(node, "check");
            assert_eq!(missing, vec!["retry"]);
            assert_eq!(unexpected, vec!["skip"]);
        }
        other => panic!("expected LabelMismatch, got {:?}", other.err()),
    }
}

#[test]
fn compile_fails_on_empty_label_set() {
    let mut graph = StateGraph::new(schema());
    graph
        .add_node("check", Arc::new(Recorder::new("check")))
        .add_edge(START, "check");
    graph.add_conditional_edges(
        "check",
        Arc::new(FnRouter::new(Vec::<String>::new(), |_s: &State| String::new())),
        Vec::<(String, String)>::new(),
    );
    assert_eq!(
        graph.compile().err(),
        Some(CompilationError::EmptyLabelSet("check".into()))
    );
}

#[test]
fn compile_fails_on_unknown_fallback() {
    let mut graph = StateGraph::new(schema());
    graph
        .add_node_with_policy(
            "api",
            Arc::new(Recorder::new("api")),
            NodePolicy::new().with_retry(RetryPolicy::new(2).with_fallback("cache")),
        )
        .add_edge(START, "api")
        .add_edge("api", END);
    assert_eq!(
        graph.compile().err(),
        Some(CompilationError::UnknownFallback {
            node: "api".into(),
            fallback: "cache".into()
        })
    );
}
