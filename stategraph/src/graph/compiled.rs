//! Compiled state graph: immutable, drives runs in rounds.
//!
//! Built by `StateGraph::compile` or `compile_with_checkpointer`. A run starts
//! with the entry node as its frontier. Each round dispatches the whole
//! frontier concurrently against one snapshot, merges the successful deltas in
//! frontier order, then builds the next frontier from retries, fallbacks and
//! routed successors. The run ends when the frontier is empty, a node
//! suspends, or an error stops it.
//!
//! Suspended runs are saved to the checkpoint store under their run id and
//! continued with `resume`. The suspending round is kept unsettled: its
//! siblings' deltas are merged for the paused snapshot, but the real merge
//! and the routing of those siblings wait for the resume input, which joins
//! the round at the suspended node's frontier position.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::RunError;
use crate::memory::{
    CheckpointError, CheckpointStore, FrontierEntry, HistoryEntry, OutcomeRecord, PendingRound,
    RunConfig, RunRecord, Store, SuspensionMarker,
};
use crate::state::{Delta, State, StateError, StateSchema, StateUpdate};
use crate::stream::{EventSink, RunEvent, StreamMode};

use super::compile_error::GraphWarning;
use super::executor::{NodeExecutor, RoundContext};
use super::logging::{
    log_fallback, log_resumed, log_retry, log_round_start, log_run_complete, log_run_failed,
    log_run_start, log_suspended,
};
use super::outcome::{NodeFailure, Outcome};
use super::result::{Completion, RunFailure, RunResult, Suspension};
use super::router::{self, OutgoingEdges};
use super::run_context::RunContext;
use super::state_graph::END;

/// Capacity of the event channel returned by `stream`.
const STREAM_BUFFER: usize = 128;

/// Compiled graph: immutable structure, supports invoke, stream and resume.
///
/// Cheap to clone; clones share the checkpoint store.
#[derive(Clone)]
pub struct CompiledStateGraph {
    pub(super) schema: Arc<StateSchema>,
    pub(super) executor: NodeExecutor,
    pub(super) edges: Arc<HashMap<String, OutgoingEdges>>,
    pub(super) entry: String,
    pub(super) checkpointer: Arc<dyn CheckpointStore>,
    pub(super) store: Option<Arc<dyn Store>>,
    pub(super) warnings: Vec<GraphWarning>,
}

/// How the round loop stopped.
enum LoopExit {
    Completed,
    Suspended(Suspension),
    Failed(RunError),
}

/// What to do with a frontier entry once the round's deltas are merged.
enum Plan {
    Route,
    Schedule(FrontierEntry),
    Nothing,
}

impl CompiledStateGraph {
    pub fn schema(&self) -> &StateSchema {
        &self.schema
    }

    pub fn store(&self) -> Option<&Arc<dyn Store>> {
        self.store.as_ref()
    }

    pub fn checkpointer(&self) -> &Arc<dyn CheckpointStore> {
        &self.checkpointer
    }

    pub fn executor(&self) -> &NodeExecutor {
        &self.executor
    }

    /// Id of the node START points at.
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Warnings found at compile time.
    pub fn warnings(&self) -> &[GraphWarning] {
        &self.warnings
    }

    /// Successors of `node_id` for `state`, `END` included.
    pub fn route(&self, node_id: &str, state: &State) -> Result<Vec<String>, RunError> {
        router::route(node_id, self.edges.get(node_id), state)
    }

    /// Runs a single node outside of a run.
    pub async fn execute_node(&self, node_id: &str, state: State) -> Outcome {
        let mut ctx = RunContext::new("standalone", node_id);
        ctx.store = self.store.clone();
        self.executor.execute(node_id, Arc::new(state), ctx).await
    }

    /// Starts a run from `input` and drives it to completion, suspension or failure.
    ///
    /// `Err` means the input was rejected and no round ran.
    pub async fn invoke(&self, input: Delta, config: RunConfig) -> Result<RunResult, RunError> {
        self.run_new(input, config, None).await
    }

    /// Like `invoke`, but delivers progress events of the selected `modes`.
    ///
    /// The stream always ends with `RunEvent::Finished`. A rejected input is
    /// reported as a `Failed` result with the default state.
    pub fn stream(
        &self,
        input: Delta,
        config: RunConfig,
        modes: impl IntoIterator<Item = StreamMode>,
    ) -> ReceiverStream<RunEvent> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let sink = EventSink::new(tx, modes.into_iter().collect::<HashSet<_>>());
        let graph = self.clone();
        let run_id = config.resolve_run_id();
        let config = config.with_run_id(run_id.clone());

        tokio::spawn(async move {
            match graph.run_new(input, config, Some(&sink)).await {
                Ok(_) => {}
                Err(error) => {
                    log_run_failed(&run_id, &error);
                    sink.finish(RunResult::Failed(RunFailure {
                        run_id,
                        error,
                        state: State::default(),
                        history: Vec::new(),
                        record: None,
                    }))
                    .await;
                }
            }
        });

        ReceiverStream::new(rx)
    }

    /// Continues a suspended run with external `input`.
    ///
    /// Runs under the step limit the run was invoked with.
    pub async fn resume(&self, run_id: &str, input: Delta) -> Result<RunResult, RunError> {
        self.resume_run(run_id, input, None).await
    }

    /// Continues a suspended run under `config`, whose `max_steps` replaces
    /// the stored limit. The run id of `config` is ignored.
    pub async fn resume_with_config(
        &self,
        run_id: &str,
        input: Delta,
        config: RunConfig,
    ) -> Result<RunResult, RunError> {
        self.resume_run(run_id, input, Some(config)).await
    }

    /// Claims the checkpoint, merges `input` into the suspending round and
    /// continues the loop.
    ///
    /// Rejections (`AlreadyResumed`, `NotSuspended`, `InvalidResumeInput`,
    /// a missing checkpoint) return `Err` and leave the checkpoint resumable.
    async fn resume_run(
        &self,
        run_id: &str,
        input: Delta,
        config: Option<RunConfig>,
    ) -> Result<RunResult, RunError> {
        let mut record = self.checkpointer.claim(run_id).await.map_err(|error| match error {
            CheckpointError::Claimed(id) => RunError::AlreadyResumed(id),
            other => RunError::Checkpoint(other),
        })?;
        let (marker, mut routed) = match self.settle_round(&mut record, input) {
            Ok(settled) => settled,
            Err(error) => {
                if let Err(unclaim) = self.checkpointer.unclaim(run_id).await {
                    tracing::warn!(run_id, error = %unclaim, "Failed to release checkpoint claim");
                }
                return Err(error);
            }
        };
        let config = match config {
            Some(config) => {
                record.max_steps = config.max_steps;
                config
            }
            None => RunConfig::default().with_max_steps(record.max_steps),
        };

        log_resumed(run_id, &marker.node_id);
        record.suspension = None;
        record.history.push(HistoryEntry {
            step: record.step,
            node_id: marker.node_id.clone(),
            attempt: marker.attempt,
            outcome: OutcomeRecord::Resumed,
        });
        record.touch();

        routed.push((marker.origin, marker.node_id));
        routed.sort_by_key(|(order, _)| *order);
        let exit = match self.route_all(&routed, &record.state) {
            Ok(next) => {
                let mut candidates = std::mem::take(&mut record.frontier);
                candidates.extend(next);
                record.frontier = normalize_frontier(candidates);
                self.run_rounds(&mut record, &config, None).await
            }
            Err(error) => LoopExit::Failed(error),
        };
        Ok(self.finish(record, exit, true, None).await)
    }

    /// Validates `input` and merges it with the suspending round's sibling
    /// deltas on top of the round's base state.
    ///
    /// Returns the marker and the siblings still to be routed.
    fn settle_round(
        &self,
        record: &mut RunRecord,
        input: Delta,
    ) -> Result<(SuspensionMarker, Vec<(usize, String)>), RunError> {
        let marker = record
            .suspension
            .clone()
            .ok_or_else(|| RunError::NotSuspended(record.run_id.clone()))?;
        let invalid = |source: StateError| RunError::InvalidResumeInput {
            node: marker.node_id.clone(),
            source,
        };
        marker.resume_schema.validate(&input).map_err(invalid)?;

        let (mut state, mut updates, routed) = match record.pending.take() {
            Some(pending) => (pending.base, pending.updates, pending.routed),
            None => (record.state.clone(), Vec::new(), Vec::new()),
        };
        updates.push(StateUpdate::new(marker.node_id.clone(), marker.origin, input));
        state.apply(&self.schema, updates).map_err(invalid)?;
        record.state = state;
        Ok((marker, routed))
    }

    /// Saves a suspended record whose first save failed.
    ///
    /// Takes the record carried by `RunFailure::record`.
    pub async fn persist_suspension(&self, record: RunRecord) -> Result<Suspension, RunError> {
        let suspension = Suspension::from_record(&record)
            .ok_or_else(|| RunError::NotSuspended(record.run_id.clone()))?;
        self.checkpointer.save(&record.run_id, &record).await?;
        log_suspended(&record.run_id, &suspension.node_id, record.step);
        Ok(suspension)
    }

    async fn run_new(
        &self,
        input: Delta,
        config: RunConfig,
        events: Option<&EventSink>,
    ) -> Result<RunResult, RunError> {
        let state = State::from_schema(&self.schema, input)?;
        let mut record = RunRecord::new(config.resolve_run_id(), state, &self.entry);
        record.max_steps = config.max_steps;
        log_run_start(&record.run_id, &record.frontier_ids());
        let exit = self.run_rounds(&mut record, &config, events).await;
        Ok(self.finish(record, exit, false, events).await)
    }

    /// Turns a loop exit into a result and syncs the checkpoint store.
    ///
    /// A resumed run deletes its checkpoint when it ends; a suspended run
    /// saves (or overwrites) it.
    async fn finish(
        &self,
        record: RunRecord,
        exit: LoopExit,
        resumed: bool,
        events: Option<&EventSink>,
    ) -> RunResult {
        let result = match exit {
            LoopExit::Suspended(suspension) => {
                match self.checkpointer.save(&record.run_id, &record).await {
                    Ok(()) => {
                        log_suspended(&record.run_id, &suspension.node_id, record.step);
                        RunResult::Suspended(suspension)
                    }
                    Err(error) => {
                        let failure = RunFailure {
                            run_id: record.run_id.clone(),
                            error: RunError::Checkpoint(error),
                            state: record.state.clone(),
                            history: record.history.clone(),
                            record: Some(Box::new(record)),
                        };
                        log_run_failed(&failure.run_id, &failure.error);
                        RunResult::Failed(failure)
                    }
                }
            }
            LoopExit::Completed => {
                self.release(&record.run_id, resumed).await;
                log_run_complete(&record.run_id, record.step);
                RunResult::Completed(Completion {
                    run_id: record.run_id,
                    state: record.state,
                    history: record.history,
                    steps: record.step,
                })
            }
            LoopExit::Failed(error) => {
                self.release(&record.run_id, resumed).await;
                self.failed(record, error)
            }
        };

        if let Some(sink) = events {
            sink.finish(result.clone()).await;
        }
        result
    }

    fn failed(&self, record: RunRecord, error: RunError) -> RunResult {
        log_run_failed(&record.run_id, &error);
        RunResult::Failed(RunFailure {
            run_id: record.run_id,
            error,
            state: record.state,
            history: record.history,
            record: None,
        })
    }

    async fn release(&self, run_id: &str, resumed: bool) {
        if resumed {
            if let Err(error) = self.checkpointer.delete(run_id).await {
                tracing::warn!(run_id, %error, "Failed to delete checkpoint of finished run");
            }
        }
    }

    /// Round loop: dispatch, merge, reschedule until the frontier is empty.
    async fn run_rounds(
        &self,
        record: &mut RunRecord,
        config: &RunConfig,
        events: Option<&EventSink>,
    ) -> LoopExit {
        loop {
            if record.frontier.is_empty() {
                return LoopExit::Completed;
            }
            if config.cancel.is_cancelled() {
                return LoopExit::Failed(RunError::Cancelled);
            }
            record.step += 1;
            if record.step > config.max_steps {
                return LoopExit::Failed(RunError::StepLimitExceeded {
                    limit: config.max_steps,
                });
            }

            let step = record.step;
            let frontier = std::mem::take(&mut record.frontier);
            let frontier_ids: Vec<String> = frontier.iter().map(|e| e.node_id.clone()).collect();
            log_round_start(&record.run_id, step, &frontier_ids);
            if let Some(sink) = events {
                sink.send(
                    StreamMode::Rounds,
                    RunEvent::RoundStarted {
                        step,
                        frontier: frontier_ids,
                    },
                )
                .await;
            }

            let round = RoundContext {
                run_id: record.run_id.clone(),
                step,
                cancel: config.cancel.clone(),
                store: self.store.clone(),
                events: events.cloned(),
            };
            let snapshot = Arc::new(record.state.clone());
            let outcomes = self.executor.dispatch_round(&frontier, snapshot, &round).await;

            let mut updates = Vec::new();
            let mut plans = Vec::with_capacity(frontier.len());
            let mut suspension: Option<SuspensionMarker> = None;
            let mut fatal: Option<RunError> = None;

            for (order, (entry, outcome)) in frontier.iter().zip(outcomes).enumerate() {
                let recorded = OutcomeRecord::from(&outcome);
                record.history.push(HistoryEntry {
                    step,
                    node_id: entry.node_id.clone(),
                    attempt: entry.attempt,
                    outcome: recorded.clone(),
                });
                if let Some(sink) = events {
                    sink.send(
                        StreamMode::Updates,
                        RunEvent::NodeFinished {
                            step,
                            node_id: entry.node_id.clone(),
                            attempt: entry.attempt,
                            outcome: recorded,
                        },
                    )
                    .await;
                }

                let plan = match outcome {
                    Outcome::Success(delta) => {
                        updates.push(StateUpdate::new(entry.node_id.clone(), order, delta));
                        Plan::Route
                    }
                    Outcome::Failure(failure) => match self.reschedule(entry, order, failure) {
                        Ok(next) => Plan::Schedule(next),
                        Err(error) => {
                            fatal.get_or_insert(error);
                            Plan::Nothing
                        }
                    },
                    Outcome::Suspend {
                        reason,
                        resume_schema,
                    } => {
                        if suspension.is_none() {
                            suspension = Some(SuspensionMarker {
                                node_id: entry.node_id.clone(),
                                attempt: entry.attempt,
                                origin: order,
                                reason,
                                resume_schema,
                                token: uuid::Uuid::new_v4().to_string(),
                            });
                            Plan::Nothing
                        } else {
                            // Only one marker per run; later suspenders run again after resume.
                            Plan::Schedule(FrontierEntry {
                                node_id: entry.node_id.clone(),
                                attempt: entry.attempt,
                                origin: order,
                                delay_ms: 0,
                            })
                        }
                    }
                };
                plans.push(plan);
            }

            let base = suspension
                .as_ref()
                .map(|_| (record.state.clone(), updates.clone()));
            if let Err(error) = record.state.apply(&self.schema, updates) {
                return LoopExit::Failed(error.into());
            }
            record.touch();
            if let Some(sink) = events {
                sink.send(StreamMode::Values, RunEvent::Values(record.state.clone()))
                    .await;
            }
            if let Some(error) = fatal {
                return LoopExit::Failed(error);
            }

            let mut candidates = Vec::new();
            let mut routed = Vec::new();
            for (order, (entry, plan)) in frontier.iter().zip(plans).enumerate() {
                match plan {
                    Plan::Route => routed.push((order, entry.node_id.clone())),
                    Plan::Schedule(next) => candidates.push(next),
                    Plan::Nothing => {}
                }
            }

            if let (Some(marker), Some((base, updates))) = (suspension, base) {
                record.frontier = normalize_frontier(candidates);
                record.pending = Some(PendingRound {
                    base,
                    updates,
                    routed,
                });
                let paused = Suspension::new(record, &marker);
                record.suspension = Some(marker);
                return LoopExit::Suspended(paused);
            }

            match self.route_all(&routed, &record.state) {
                Ok(next) => candidates.extend(next),
                Err(error) => return LoopExit::Failed(error),
            }
            record.frontier = normalize_frontier(candidates);
        }
    }

    /// Successor entries of each `(frontier position, node id)`, routed on `state`.
    fn route_all(
        &self,
        routed: &[(usize, String)],
        state: &State,
    ) -> Result<Vec<FrontierEntry>, RunError> {
        let mut next = Vec::new();
        for (order, node_id) in routed {
            next.extend(successors(self.route(node_id, state)?, *order));
        }
        Ok(next)
    }

    /// Next frontier entry for a failed node: a retry, the fallback, or an error.
    fn reschedule(
        &self,
        entry: &FrontierEntry,
        order: usize,
        failure: NodeFailure,
    ) -> Result<FrontierEntry, RunError> {
        let retry = self
            .executor
            .policy(&entry.node_id)
            .map(|p| p.retry.clone())
            .unwrap_or_default();

        if failure.retryable && entry.attempt < retry.max_attempts {
            let delay = retry.backoff.delay(entry.attempt);
            log_retry(&entry.node_id, entry.attempt + 1, delay);
            return Ok(FrontierEntry {
                node_id: entry.node_id.clone(),
                attempt: entry.attempt + 1,
                origin: order,
                delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            });
        }

        match retry.fallback {
            Some(fallback) => {
                log_fallback(&entry.node_id, &fallback, entry.attempt);
                Ok(FrontierEntry::new(fallback, order))
            }
            None => Err(RunError::NodeFailed {
                node: entry.node_id.clone(),
                attempts: entry.attempt,
                failure,
            }),
        }
    }
}

/// Frontier entries for routed targets; `END` schedules nothing.
fn successors(targets: Vec<String>, origin: usize) -> impl Iterator<Item = FrontierEntry> {
    targets
        .into_iter()
        .filter(|t| t != END)
        .map(move |t| FrontierEntry::new(t, origin))
}

/// Orders candidates by the position of the node that scheduled them and
/// drops repeated node ids, keeping the first. The resulting index of each
/// entry is its merge precedence in the next round.
fn normalize_frontier(mut candidates: Vec<FrontierEntry>) -> Vec<FrontierEntry> {
    candidates.sort_by_key(|e| e.origin);
    let mut seen = HashSet::new();
    candidates.retain(|e| seen.insert(e.node_id.clone()));
    candidates
}
