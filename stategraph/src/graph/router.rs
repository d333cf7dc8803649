//! Router: turns a finished node's outgoing edges into next targets.
//!
//! Static targets come first, then one label-mapped target group per
//! conditional edge, all in declaration order. Decision functions are
//! untrusted: a label outside the declared set, or a panic, is a routing
//! error.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::RunError;
use crate::state::State;

/// Decision function over a closed label set.
pub trait Router: Send + Sync {
    /// Every label `decide` may return.
    fn labels(&self) -> Vec<String>;

    fn decide(&self, state: &State) -> String;
}

/// Adapts a closure plus its label set into a [`Router`].
pub struct FnRouter<F> {
    labels: Vec<String>,
    f: F,
}

impl<F> FnRouter<F>
where
    F: Fn(&State) -> String + Send + Sync + 'static,
{
    pub fn new<I, L>(labels: I, f: F) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            f,
        }
    }
}

impl<F> Router for FnRouter<F>
where
    F: Fn(&State) -> String + Send + Sync + 'static,
{
    fn labels(&self) -> Vec<String> {
        self.labels.clone()
    }

    fn decide(&self, state: &State) -> String {
        (self.f)(state)
    }
}

/// Conditional edge: router plus label to targets, in declaration order.
#[derive(Clone)]
pub(crate) struct ConditionalEdge {
    pub router: Arc<dyn Router>,
    pub branches: Vec<(String, Vec<String>)>,
}

impl ConditionalEdge {
    pub fn targets(&self, label: &str) -> Option<&[String]> {
        self.branches
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, t)| t.as_slice())
    }
}

/// All outgoing edges of one node.
#[derive(Clone, Default)]
pub(crate) struct OutgoingEdges {
    pub statics: Vec<String>,
    pub conditionals: Vec<ConditionalEdge>,
}

impl OutgoingEdges {
    /// Every id this node can route to, ignoring labels.
    pub fn all_targets(&self) -> impl Iterator<Item = &String> {
        self.statics.iter().chain(
            self.conditionals
                .iter()
                .flat_map(|c| c.branches.iter().flat_map(|(_, t)| t.iter())),
        )
    }
}

/// Next targets of `node_id` given the post-merge state. May include `END`.
pub(crate) fn route(
    node_id: &str,
    edges: Option<&OutgoingEdges>,
    state: &State,
) -> Result<Vec<String>, RunError> {
    let Some(edges) = edges else {
        return Ok(Vec::new());
    };
    let mut targets = edges.statics.clone();
    for edge in &edges.conditionals {
        let label = match catch_unwind(AssertUnwindSafe(|| edge.router.decide(state))) {
            Ok(label) => label,
            Err(payload) => format!("<panic: {}>", panic_message(payload.as_ref())),
        };
        match edge.targets(&label) {
            Some(t) => targets.extend(t.iter().cloned()),
            None => {
                return Err(RunError::Routing {
                    node: node_id.to_string(),
                    label,
                    expected: edge.branches.iter().map(|(l, _)| l.clone()).collect(),
                })
            }
        }
    }
    tracing::trace!(node_id, ?targets, "routed");
    Ok(targets)
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
