//! Bundled demo workflows.
//!
//! External collaborators (weather services, APIs, human reviewers' tools)
//! are simulated deterministically so that runs are reproducible.

use std::sync::Arc;

use stategraph::{Delta, StateGraph, Store};

pub mod blog;
pub mod dashboard;
pub mod email;
pub mod emotion;
pub mod guess;
pub mod memory_bot;
pub mod robust_api;
pub mod tools;

/// A named workflow the driver can run.
pub struct Workflow {
    pub name: &'static str,
    pub description: &'static str,
    /// Builds the graph; nodes that need cross-run memory use `store`.
    pub build: fn(Arc<dyn Store>) -> StateGraph,
    /// Input used when the caller supplies none; `--state` overrides keys.
    pub default_input: fn() -> Delta,
}

/// Every bundled workflow, in listing order.
pub fn all() -> &'static [Workflow] {
    &WORKFLOWS
}

pub fn find(name: &str) -> Option<&'static Workflow> {
    WORKFLOWS.iter().find(|w| w.name == name)
}

static WORKFLOWS: [Workflow; 8] = [
    Workflow {
        name: "dashboard",
        description: "coordinator fans out to weather, news and stocks; aggregator joins",
        build: dashboard::build,
        default_input: dashboard::default_input,
    },
    Workflow {
        name: "emotion",
        description: "keyword sentiment analysis routed to a matching responder",
        build: emotion::build,
        default_input: emotion::default_input,
    },
    Workflow {
        name: "guess",
        description: "number guessing loop; set interactive=true to answer guesses yourself",
        build: guess::build,
        default_input: guess::default_input,
    },
    Workflow {
        name: "robust-api",
        description: "flaky API call with retries, backoff and a fallback service",
        build: robust_api::build,
        default_input: robust_api::default_input,
    },
    Workflow {
        name: "email",
        description: "compose, review, human approval, then send, revise or report",
        build: email::build,
        default_input: email::default_input,
    },
    Workflow {
        name: "memory-bot",
        description: "chat turn that remembers name and preferences per session",
        build: memory_bot::build,
        default_input: memory_bot::default_input,
    },
    Workflow {
        name: "tools",
        description: "query analyzer dispatches to calculator, weather or currency; one formatter",
        build: tools::build,
        default_input: tools::default_input,
    },
    Workflow {
        name: "blog",
        description: "researcher, writer and editor agents produce a blog post in turn",
        build: blog::build,
        default_input: blog::default_input,
    },
];
