//! State graph builder: nodes, static edges, conditional edges.
//!
//! Add nodes with `add_node`, wire them with `add_edge(from, to)` (repeat for
//! fan-out) and `add_conditional_edges`, using `START` and `END` for entry and
//! exit, then `compile` or `compile_with_checkpointer` to get a
//! `CompiledStateGraph`. All structural checks happen here, never at run time.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::graph::compile_error::{CompilationError, GraphWarning};
use crate::graph::compiled::CompiledStateGraph;
use crate::graph::executor::{NodeEntry, NodeExecutor};
use crate::graph::node::Node;
use crate::graph::node_middleware::NodeMiddleware;
use crate::graph::policy::NodePolicy;
use crate::graph::router::{ConditionalEdge, OutgoingEdges, Router};
use crate::memory::{CheckpointStore, MemoryCheckpointStore, Store};
use crate::state::StateSchema;

/// Sentinel for graph entry: use as `from_id` in `add_edge(START, first_node_id)`.
pub const START: &str = "__start__";

/// Sentinel for graph exit: use as a target in `add_edge(node_id, END)` or a label mapping.
pub const END: &str = "__end__";

/// State graph: schema, nodes and edges.
///
/// **Interaction**: Accepts `Arc<dyn Node>` handlers and `Arc<dyn Router>`
/// decision functions; produces `CompiledStateGraph`.
pub struct StateGraph {
    schema: StateSchema,
    nodes: HashMap<String, NodeEntry>,
    /// Registration order, for deterministic warnings.
    node_order: Vec<String>,
    edges: Vec<(String, String)>,
    conditionals: Vec<(String, ConditionalEdge)>,
    store: Option<Arc<dyn Store>>,
    middleware: Option<Arc<dyn NodeMiddleware>>,
}

impl StateGraph {
    pub fn new(schema: StateSchema) -> Self {
        Self {
            schema,
            nodes: HashMap::new(),
            node_order: Vec::new(),
            edges: Vec::new(),
            conditionals: Vec::new(),
            store: None,
            middleware: None,
        }
    }

    /// Attaches a session store; nodes reach it through `RunContext::store`.
    pub fn with_store(self, store: Arc<dyn Store>) -> Self {
        Self {
            store: Some(store),
            ..self
        }
    }

    /// Wraps every node invocation with `middleware`.
    pub fn with_middleware(self, middleware: Arc<dyn NodeMiddleware>) -> Self {
        Self {
            middleware: Some(middleware),
            ..self
        }
    }

    /// Adds a node with the default policy (one attempt, no timeout).
    /// Replaces any node with the same id.
    pub fn add_node(&mut self, id: impl Into<String>, node: Arc<dyn Node>) -> &mut Self {
        self.add_node_with_policy(id, node, NodePolicy::default())
    }

    /// Adds a node with a retry / timeout policy.
    pub fn add_node_with_policy(
        &mut self,
        id: impl Into<String>,
        node: Arc<dyn Node>,
        policy: NodePolicy,
    ) -> &mut Self {
        let id = id.into();
        if !self.nodes.contains_key(&id) {
            self.node_order.push(id.clone());
        }
        self.nodes.insert(id, NodeEntry { node, policy });
        self
    }

    /// Adds an edge from `from_id` to `to_id`. Several edges from one source fan out.
    pub fn add_edge(&mut self, from_id: impl Into<String>, to_id: impl Into<String>) -> &mut Self {
        self.edges.push((from_id.into(), to_id.into()));
        self
    }

    /// Adds a conditional edge: after `source` succeeds, `router` picks a label
    /// and the mapped target(s) are scheduled. Repeating a label in `mapping`
    /// maps it to several targets.
    pub fn add_conditional_edges<I, L, T>(
        &mut self,
        source: impl Into<String>,
        router: Arc<dyn Router>,
        mapping: I,
    ) -> &mut Self
    where
        I: IntoIterator<Item = (L, T)>,
        L: Into<String>,
        T: Into<String>,
    {
        let mut branches: Vec<(String, Vec<String>)> = Vec::new();
        for (label, target) in mapping {
            let label = label.into();
            let target = target.into();
            match branches.iter_mut().find(|(l, _)| *l == label) {
                Some((_, targets)) => targets.push(target),
                None => branches.push((label, vec![target])),
            }
        }
        self.conditionals
            .push((source.into(), ConditionalEdge { router, branches }));
        self
    }

    pub fn schema(&self) -> &StateSchema {
        &self.schema
    }

    /// Checks the graph structure.
    ///
    /// Returns warnings (unreachable END or nodes) on success.
    pub fn validate(&self) -> Result<Vec<GraphWarning>, CompilationError> {
        for id in &self.node_order {
            if id == START || id == END {
                return Err(CompilationError::ReservedNodeId(id.clone()));
            }
        }

        for (from, to) in &self.edges {
            if to == START {
                return Err(CompilationError::InvalidEdge(format!(
                    "edge from '{}' into START",
                    from
                )));
            }
            if from == END {
                return Err(CompilationError::InvalidEdge(format!(
                    "edge out of END to '{}'",
                    to
                )));
            }
            if from != START && !self.nodes.contains_key(from) {
                return Err(CompilationError::NodeNotFound(from.clone()));
            }
            if to != END && !self.nodes.contains_key(to) {
                return Err(CompilationError::NodeNotFound(to.clone()));
            }
        }
        let entry = self.entry()?;

        for (source, edge) in &self.conditionals {
            if source == START || source == END {
                return Err(CompilationError::InvalidEdge(format!(
                    "conditional edge out of '{}'",
                    source
                )));
            }
            if !self.nodes.contains_key(source) {
                return Err(CompilationError::NodeNotFound(source.clone()));
            }
            let labels = edge.router.labels();
            if labels.is_empty() {
                return Err(CompilationError::EmptyLabelSet(source.clone()));
            }
            let declared: HashSet<&str> = labels.iter().map(String::as_str).collect();
            let mapped: HashSet<&str> = edge.branches.iter().map(|(l, _)| l.as_str()).collect();
            let missing: Vec<String> = labels
                .iter()
                .filter(|l| !mapped.contains(l.as_str()))
                .cloned()
                .collect();
            let unexpected: Vec<String> = edge
                .branches
                .iter()
                .map(|(l, _)| l)
                .filter(|l| !declared.contains(l.as_str()))
                .cloned()
                .collect();
            if !missing.is_empty() || !unexpected.is_empty() {
                return Err(CompilationError::LabelMismatch {
                    node: source.clone(),
                    missing,
                    unexpected,
                });
            }
            for target in edge.branches.iter().flat_map(|(_, t)| t) {
                if target == START {
                    return Err(CompilationError::InvalidEdge(format!(
                        "label mapping of '{}' targets START",
                        source
                    )));
                }
                if target != END && !self.nodes.contains_key(target) {
                    return Err(CompilationError::NodeNotFound(target.clone()));
                }
            }
        }

        for id in &self.node_order {
            if let Some(fallback) = &self.nodes[id].policy.retry.fallback {
                if !self.nodes.contains_key(fallback) {
                    return Err(CompilationError::UnknownFallback {
                        node: id.clone(),
                        fallback: fallback.clone(),
                    });
                }
            }
        }

        Ok(self.reachability_warnings(&entry))
    }

    /// Builds the executable graph with an in-memory checkpoint store.
    pub fn compile(self) -> Result<CompiledStateGraph, CompilationError> {
        self.compile_internal(Arc::new(MemoryCheckpointStore::new()))
    }

    /// Builds the executable graph persisting suspensions to `checkpointer`.
    pub fn compile_with_checkpointer(
        self,
        checkpointer: Arc<dyn CheckpointStore>,
    ) -> Result<CompiledStateGraph, CompilationError> {
        self.compile_internal(checkpointer)
    }

    fn compile_internal(
        self,
        checkpointer: Arc<dyn CheckpointStore>,
    ) -> Result<CompiledStateGraph, CompilationError> {
        let warnings = self.validate()?;
        for warning in &warnings {
            tracing::warn!(%warning, "Graph validation warning");
        }
        let entry = self.entry()?;
        let edges = self.outgoing();

        Ok(CompiledStateGraph {
            schema: Arc::new(self.schema),
            executor: NodeExecutor::new(self.nodes, self.middleware),
            edges: Arc::new(edges),
            entry,
            checkpointer,
            store: self.store,
            warnings,
        })
    }

    fn entry(&self) -> Result<String, CompilationError> {
        let mut starts: Vec<String> = Vec::new();
        for (_, to) in self.edges.iter().filter(|(f, _)| f == START) {
            if !starts.contains(to) {
                starts.push(to.clone());
            }
        }
        match starts.len() {
            0 => Err(CompilationError::MissingStart),
            1 => Ok(starts.remove(0)),
            _ => Err(CompilationError::MultipleStart(starts)),
        }
    }

    fn outgoing(&self) -> HashMap<String, OutgoingEdges> {
        let mut out: HashMap<String, OutgoingEdges> = HashMap::new();
        for (from, to) in self.edges.iter().filter(|(f, _)| f != START) {
            out.entry(from.clone()).or_default().statics.push(to.clone());
        }
        for (source, edge) in &self.conditionals {
            out.entry(source.clone())
                .or_default()
                .conditionals
                .push(edge.clone());
        }
        out
    }

    fn reachability_warnings(&self, entry: &str) -> Vec<GraphWarning> {
        let edges = self.outgoing();
        let mut seen: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::from([entry.to_string()]);
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) || id == END {
                continue;
            }
            match edges.get(&id) {
                Some(out) if out.all_targets().next().is_some() => {
                    queue.extend(out.all_targets().cloned());
                }
                // Edge-less nodes end the run.
                _ => {
                    seen.insert(END.to_string());
                }
            }
            if let Some(fallback) = self.nodes.get(&id).and_then(|e| e.policy.retry.fallback.clone()) {
                queue.push_back(fallback);
            }
        }

        let mut warnings = Vec::new();
        if !seen.contains(END) {
            warnings.push(GraphWarning::EndUnreachable);
        }
        for id in &self.node_order {
            if !seen.contains(id) {
                warnings.push(GraphWarning::UnreachableNode(id.clone()));
            }
        }
        warnings
    }
}
