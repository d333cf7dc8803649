//! Suspend, checkpoint and resume.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use stategraph::{
    CheckpointError, CheckpointStore, Delta, FieldType, FnNode, FnRouter, JsonSerializer,
    MemoryCheckpointStore, Outcome, OutcomeRecord, ResumeSchema, RunConfig, RunError,
    RunRecord, RunStatus, Serializer, State, StateError, StateGraph, END, START,
};

use crate::common::{count, log_of, schema, Recorder};

fn approval_schema() -> ResumeSchema {
    ResumeSchema::new()
        .required("approved", FieldType::Boolean)
        .optional("answer", FieldType::String)
}

/// draft -> review -> (approved ? publish : END). `review` either suspends
/// or, for the synchronous baseline, approves on its own.
fn approval_graph(suspend: bool) -> StateGraph {
    let review = FnNode::new("review", move |_s: &State| {
        if suspend {
            Outcome::suspend("approve the draft?", approval_schema())
        } else {
            Outcome::success(Delta::new().with("approved", true))
        }
    });
    let mut graph = StateGraph::new(schema());
    graph
        .add_node("draft", Arc::new(Recorder::new("draft")))
        .add_node("review", Arc::new(review))
        .add_node("publish", Arc::new(Recorder::new("publish")))
        .add_edge(START, "draft")
        .add_edge("draft", "review")
        .add_edge("publish", END);
    graph.add_conditional_edges(
        "review",
        Arc::new(FnRouter::new(["yes", "no"], |s: &State| {
            if s.get_bool("approved").unwrap_or(false) {
                "yes".to_string()
            } else {
                "no".to_string()
            }
        })),
        [("yes", "publish"), ("no", END)],
    );
    graph
}

/// **Scenario**: Suspending then resuming with input ends in the same state
/// as a run whose node returned that input directly.
#[tokio::test]
async fn resume_matches_synchronous_run() {
    let baseline = approval_graph(false)
        .compile()
        .unwrap()
        .invoke(Delta::new(), RunConfig::default())
        .await
        .unwrap();

    let compiled = approval_graph(true).compile().unwrap();
    let first = compiled
        .invoke(Delta::new(), RunConfig::default().with_run_id("doc-1"))
        .await
        .unwrap();
    let paused = first.suspended().expect("suspended");
    assert_eq!(paused.run_id, "doc-1");
    assert_eq!(paused.node_id, "review");
    assert_eq!(paused.reason, "approve the draft?");
    assert_eq!(paused.resume_schema, approval_schema());
    assert!(!paused.token.is_empty());
    assert_eq!(log_of(&paused.state), vec!["draft"]);

    let resumed = compiled
        .resume("doc-1", Delta::new().with("approved", true))
        .await
        .unwrap();
    let done = resumed.completed().expect("completed");
    assert_eq!(done.state.values(), baseline.state().values());
    assert_eq!(done.steps, 3);
    assert!(done
        .history
        .iter()
        .any(|h| h.node_id == "review" && h.outcome == OutcomeRecord::Resumed));
    assert!(compiled.checkpointer().list().await.unwrap().is_empty());
}

/// **Scenario**: The resume input drives routing of the suspended node.
#[tokio::test]
async fn rejected_approval_ends_run() {
    let compiled = approval_graph(true).compile().unwrap();
    compiled
        .invoke(Delta::new(), RunConfig::default().with_run_id("doc-2"))
        .await
        .unwrap();
    let result = compiled
        .resume("doc-2", Delta::new().with("approved", false))
        .await
        .unwrap();
    assert_eq!(log_of(result.state()), vec!["draft"]);
    assert_eq!(result.status(), RunStatus::Completed);
}

/// **Scenario**: A checkpoint serialized, reloaded into another store and
/// resumed by another compiled graph completes the same way.
#[tokio::test]
async fn resume_from_reloaded_checkpoint() {
    let first = approval_graph(true).compile().unwrap();
    first
        .invoke(Delta::new(), RunConfig::default().with_run_id("doc-3"))
        .await
        .unwrap();
    let record = first.checkpointer().load("doc-3").await.unwrap();
    let bytes = JsonSerializer.serialize(&record).unwrap();
    let reloaded = JsonSerializer.deserialize(&bytes).unwrap();
    assert_eq!(reloaded, record);

    let store = Arc::new(MemoryCheckpointStore::new());
    store.save("doc-3", &reloaded).await.unwrap();
    let second = approval_graph(true)
        .compile_with_checkpointer(store.clone())
        .unwrap();
    let result = second
        .resume("doc-3", Delta::new().with("approved", true))
        .await
        .unwrap();
    assert_eq!(log_of(result.state()), vec!["draft", "publish"]);
    assert!(store.is_empty().await);
}

/// **Scenario**: Input that fails the resume schema is rejected and the
/// checkpoint stays resumable.
#[tokio::test]
async fn invalid_resume_input_keeps_checkpoint() {
    let compiled = approval_graph(true).compile().unwrap();
    compiled
        .invoke(Delta::new(), RunConfig::default().with_run_id("doc-4"))
        .await
        .unwrap();

    let err = compiled
        .resume("doc-4", Delta::new().with("approved", "yes"))
        .await
        .unwrap_err();
    match err {
        RunError::InvalidResumeInput { node, source } => {
            assert_eq!(node, "review");
            assert!(matches!(source, StateError::TypeMismatch { .. }));
        }
        other => panic!("expected InvalidResumeInput, got {:?}", other),
    }

    let err = compiled
        .resume("doc-4", Delta::new().with("answer", "ok"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RunError::InvalidResumeInput {
            source: StateError::MissingField { .. },
            ..
        }
    ));

    let record = compiled.checkpointer().load("doc-4").await.unwrap();
    assert!(record.is_suspended());

    let result = compiled
        .resume("doc-4", Delta::new().with("approved", true).with("answer", "ok"))
        .await
        .unwrap();
    assert_eq!(result.state().get_str("answer"), Some("ok"));
}

/// **Scenario**: Resuming an unknown or already finished run is a checkpoint NotFound.
#[tokio::test]
async fn resume_unknown_or_finished_run() {
    let compiled = approval_graph(true).compile().unwrap();
    let err = compiled.resume("nope", Delta::new()).await.unwrap_err();
    assert_eq!(err, RunError::Checkpoint(CheckpointError::NotFound("nope".into())));

    compiled
        .invoke(Delta::new(), RunConfig::default().with_run_id("doc-5"))
        .await
        .unwrap();
    compiled
        .resume("doc-5", Delta::new().with("approved", true))
        .await
        .unwrap();
    let err = compiled
        .resume("doc-5", Delta::new().with("approved", true))
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::Checkpoint(CheckpointError::NotFound(_))));
}

/// **Scenario**: A stored record without a suspension marker cannot be resumed.
#[tokio::test]
async fn resume_not_suspended_record() {
    let compiled = approval_graph(true).compile().unwrap();
    let record = RunRecord::new("plain", State::default(), "draft");
    compiled.checkpointer().save("plain", &record).await.unwrap();
    let err = compiled.resume("plain", Delta::new()).await.unwrap_err();
    assert_eq!(err, RunError::NotSuspended("plain".into()));
}

/// **Scenario**: A second resume while the first is still running is refused.
#[tokio::test]
async fn concurrent_resume_is_refused() {
    let mut graph = approval_graph(true);
    graph.add_node("publish", Arc::new(Recorder::new("publish").with_delay(300)));
    let compiled = graph.compile().unwrap();
    compiled
        .invoke(Delta::new(), RunConfig::default().with_run_id("doc-6"))
        .await
        .unwrap();

    let racer = compiled.clone();
    let first = tokio::spawn(async move {
        racer
            .resume("doc-6", Delta::new().with("approved", true))
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    let err = compiled
        .resume("doc-6", Delta::new().with("approved", true))
        .await
        .unwrap_err();
    assert_eq!(err, RunError::AlreadyResumed("doc-6".into()));

    let result = first.await.unwrap().unwrap();
    assert_eq!(log_of(result.state()), vec!["draft", "publish"]);
}

/// **Scenario**: Siblings of a suspending node show in the paused state;
/// their routing waits for the resume, then their successors run alongside
/// the suspended node's.
#[tokio::test]
async fn siblings_merge_before_suspension() {
    let ask = FnNode::new("ask", |_s: &State| {
        Outcome::suspend("need an answer", ResumeSchema::new().required("answer", FieldType::String))
    });
    let mut graph = StateGraph::new(schema());
    graph
        .add_node("start", Arc::new(Recorder::new("start")))
        .add_node("ask", Arc::new(ask))
        .add_node("side", Arc::new(Recorder::new("side")))
        .add_node("after_ask", Arc::new(Recorder::new("after_ask")))
        .add_node("after_side", Arc::new(Recorder::new("after_side")))
        .add_edge(START, "start")
        .add_edge("start", "ask")
        .add_edge("start", "side")
        .add_edge("ask", "after_ask")
        .add_edge("side", "after_side");
    let compiled = graph.compile().unwrap();

    let first = compiled
        .invoke(Delta::new(), RunConfig::default().with_run_id("fork"))
        .await
        .unwrap();
    let paused = first.suspended().expect("suspended");
    assert_eq!(log_of(&paused.state), vec!["start", "side"]);
    let record = compiled.checkpointer().load("fork").await.unwrap();
    assert!(record.frontier.is_empty());
    let pending = record.pending.expect("pending round");
    assert_eq!(pending.routed, vec![(1, "side".to_string())]);
    assert_eq!(log_of(&pending.base), vec!["start"]);

    let result = compiled
        .resume("fork", Delta::new().with("answer", "42"))
        .await
        .unwrap();
    let done = result.completed().expect("completed");
    assert_eq!(
        log_of(&done.state),
        vec!["start", "side", "after_ask", "after_side"]
    );
    assert_eq!(done.state.get_str("answer"), Some("42"));
}

/// start -> (ask, side), both appending to `log`; `ask` suspends unless
/// `answer_inline`, in which case it returns the answer itself. `side` sets
/// `score` to 2 and routes on `answer`.
fn fork_graph(answer_inline: bool) -> StateGraph {
    let ask = FnNode::new("ask", move |_s: &State| {
        let answer = Delta::new()
            .with("log", json!(["ask"]))
            .with("score", 1)
            .with("answer", "yes");
        if answer_inline {
            Outcome::success(answer)
        } else {
            Outcome::suspend(
                "need an answer",
                ResumeSchema::new()
                    .required("log", FieldType::List)
                    .required("score", FieldType::Number)
                    .required("answer", FieldType::String),
            )
        }
    });
    let side = FnNode::new("side", |_s: &State| {
        Outcome::success(Delta::new().with("log", json!(["side"])).with("score", 2))
    });
    let mut graph = StateGraph::new(schema());
    graph
        .add_node("start", Arc::new(Recorder::new("start")))
        .add_node("ask", Arc::new(ask))
        .add_node("side", Arc::new(side))
        .add_node("heard", Arc::new(Recorder::new("heard")))
        .add_node("missed", Arc::new(Recorder::new("missed")))
        .add_edge(START, "start")
        .add_edge("start", "ask")
        .add_edge("start", "side");
    graph.add_conditional_edges(
        "side",
        Arc::new(FnRouter::new(["heard", "missed"], |s: &State| {
            if s.get_str("answer") == Some("yes") {
                "heard".to_string()
            } else {
                "missed".to_string()
            }
        })),
        [("heard", "heard"), ("missed", "missed")],
    );
    graph
}

/// **Scenario**: Resume input merges at the suspended node's frontier
/// position: append order, overwrite precedence and sibling routing all
/// match the run where the node answered inline.
#[tokio::test]
async fn resume_input_keeps_frontier_precedence() {
    let inline = fork_graph(true)
        .compile()
        .unwrap()
        .invoke(Delta::new(), RunConfig::default())
        .await
        .unwrap();
    let inline = inline.completed().expect("completed");
    assert_eq!(log_of(&inline.state), vec!["start", "ask", "side", "heard"]);

    let compiled = fork_graph(false).compile().unwrap();
    let paused = compiled
        .invoke(Delta::new(), RunConfig::default().with_run_id("fork-order"))
        .await
        .unwrap();
    assert_eq!(log_of(paused.state()), vec!["start", "side"]);

    let resumed = compiled
        .resume(
            "fork-order",
            Delta::new()
                .with("log", json!(["ask"]))
                .with("score", 1)
                .with("answer", "yes"),
        )
        .await
        .unwrap();
    let done = resumed.completed().expect("completed");
    assert_eq!(log_of(&done.state), log_of(&inline.state));
    assert_eq!(done.state.get_i64("score"), Some(2));
    assert_eq!(done.state.values(), inline.state.values());
    assert_eq!(done.state.version(), inline.state.version());
}

/// Chain `n0 -> n1 -> ... -> n{len-1}`; node `n{pause}` suspends.
fn long_chain(len: usize, pause: usize) -> StateGraph {
    let mut graph = StateGraph::new(schema());
    for i in 0..len {
        let id = format!("n{}", i);
        if i == pause {
            let node = FnNode::new(id.clone(), |_s: &State| {
                Outcome::suspend("checkpoint", ResumeSchema::new())
            });
            graph.add_node(id.clone(), Arc::new(node));
        } else {
            graph.add_node(id.clone(), Arc::new(Recorder::new(&id)));
        }
        if i > 0 {
            graph.add_edge(format!("n{}", i - 1), id);
        }
    }
    graph.add_edge(START, "n0");
    graph
}

/// **Scenario**: resume keeps the step limit the run was invoked with, in
/// both directions; resume_with_config replaces it.
#[tokio::test]
async fn resume_keeps_invoked_step_limit() {
    let compiled = long_chain(30, 27).compile().unwrap();
    let paused = compiled
        .invoke(Delta::new(), RunConfig::default().with_run_id("long").with_max_steps(100))
        .await
        .unwrap();
    assert_eq!(paused.suspended().map(|s| s.steps), Some(28));
    let stored = compiled.checkpointer().load("long").await.unwrap();
    assert_eq!(stored.max_steps, 100);

    let done = compiled.resume("long", Delta::new()).await.unwrap();
    assert_eq!(done.status(), RunStatus::Completed, "{:?}", done.failed());
    assert_eq!(done.completed().map(|c| c.steps), Some(30));

    let short = long_chain(6, 1).compile().unwrap();
    short
        .invoke(Delta::new(), RunConfig::default().with_run_id("tight").with_max_steps(3))
        .await
        .unwrap();
    let failed = short.resume("tight", Delta::new()).await.unwrap();
    assert_eq!(
        failed.failed().map(|f| f.error.clone()),
        Some(RunError::StepLimitExceeded { limit: 3 })
    );

    short
        .invoke(Delta::new(), RunConfig::default().with_run_id("widened").with_max_steps(3))
        .await
        .unwrap();
    let widened = short
        .resume_with_config("widened", Delta::new(), RunConfig::default().with_max_steps(10))
        .await
        .unwrap();
    assert_eq!(widened.status(), RunStatus::Completed);
}

/// **Scenario**: Two compiled graphs sharing one checkpoint store cannot
/// resume the same run twice; the successor runs once.
#[tokio::test]
async fn shared_store_resumes_once() {
    let store = Arc::new(MemoryCheckpointStore::new());
    let build = |publish: Recorder| {
        let mut graph = approval_graph(true);
        graph.add_node("publish", Arc::new(publish.with_delay(100)));
        graph.compile_with_checkpointer(store.clone()).unwrap()
    };
    let publish_a = Recorder::new("publish");
    let publish_b = Recorder::new("publish");
    let (calls_a, calls_b) = (publish_a.calls(), publish_b.calls());
    let a = build(publish_a);
    let b = build(publish_b);

    a.invoke(Delta::new(), RunConfig::default().with_run_id("shared"))
        .await
        .unwrap();
    let approve = || Delta::new().with("approved", true);
    let (ra, rb) = tokio::join!(a.resume("shared", approve()), b.resume("shared", approve()));

    let outcomes = [ra, rb];
    let completed = outcomes
        .iter()
        .filter(|r| matches!(r, Ok(res) if res.status() == RunStatus::Completed))
        .count();
    let refused = outcomes
        .iter()
        .filter(|r| matches!(r, Err(RunError::AlreadyResumed(id)) if id == "shared"))
        .count();
    assert_eq!((completed, refused), (1, 1), "{:?}", outcomes);
    assert_eq!(count(&calls_a) + count(&calls_b), 1);
    assert!(store.is_empty().await);
}

/// **Scenario**: When two nodes suspend in one round, the first pauses the
/// run and the second runs again after resume.
#[tokio::test]
async fn second_suspender_is_requeued() {
    let asker = |id: &'static str| {
        let asked = Arc::new(AtomicBool::new(false));
        Arc::new(FnNode::new(id, move |_s: &State| {
            if asked.swap(true, Ordering::SeqCst) {
                Outcome::success(Delta::new().with("log", json!([id])))
            } else {
                Outcome::suspend(format!("{} needs input", id), ResumeSchema::new())
            }
        }))
    };
    let mut graph = StateGraph::new(schema());
    graph
        .add_node("start", Arc::new(Recorder::new("start")))
        .add_node("one", asker("one"))
        .add_node("two", asker("two"))
        .add_edge(START, "start")
        .add_edge("start", "one")
        .add_edge("start", "two");
    let compiled = graph.compile().unwrap();

    let first = compiled
        .invoke(Delta::new(), RunConfig::default().with_run_id("pair"))
        .await
        .unwrap();
    assert_eq!(first.suspended().map(|s| s.node_id.as_str()), Some("one"));

    let second = compiled.resume("pair", Delta::new()).await.unwrap();
    let done = second.completed().expect("completed");
    assert_eq!(log_of(&done.state), vec!["start", "two"]);
}

/// Fails the first save, then delegates to an in-memory store.
struct FlakyCheckpoints {
    inner: MemoryCheckpointStore,
    failed: AtomicBool,
}

#[async_trait]
impl CheckpointStore for FlakyCheckpoints {
    async fn save(&self, run_id: &str, record: &RunRecord) -> Result<(), CheckpointError> {
        if !self.failed.swap(true, Ordering::SeqCst) {
            return Err(CheckpointError::Storage("disk full".into()));
        }
        self.inner.save(run_id, record).await
    }

    async fn load(&self, run_id: &str) -> Result<RunRecord, CheckpointError> {
        self.inner.load(run_id).await
    }

    async fn claim(&self, run_id: &str) -> Result<RunRecord, CheckpointError> {
        self.inner.claim(run_id).await
    }

    async fn unclaim(&self, run_id: &str) -> Result<(), CheckpointError> {
        self.inner.unclaim(run_id).await
    }

    async fn delete(&self, run_id: &str) -> Result<(), CheckpointError> {
        self.inner.delete(run_id).await
    }

    async fn list(&self) -> Result<Vec<String>, CheckpointError> {
        self.inner.list().await
    }
}

/// **Scenario**: A failed checkpoint save surfaces as a failure carrying the
/// record; persisting it again makes the run resumable.
#[tokio::test]
async fn failed_save_can_be_persisted_later() {
    let store = Arc::new(FlakyCheckpoints {
        inner: MemoryCheckpointStore::new(),
        failed: AtomicBool::new(false),
    });
    let compiled = approval_graph(true)
        .compile_with_checkpointer(store)
        .unwrap();

    let result = compiled
        .invoke(Delta::new(), RunConfig::default().with_run_id("doc-7"))
        .await
        .unwrap();
    let failure = result.failed().expect("failed");
    assert_eq!(
        failure.error,
        RunError::Checkpoint(CheckpointError::Storage("disk full".into()))
    );
    let record = failure.record.clone().expect("record kept for retry");
    assert!(record.is_suspended());

    let suspension = compiled.persist_suspension(*record).await.unwrap();
    assert_eq!(suspension.node_id, "review");

    let resumed = compiled
        .resume("doc-7", Delta::new().with("approved", true))
        .await
        .unwrap();
    assert_eq!(log_of(resumed.state()), vec!["draft", "publish"]);
}

/// **Scenario**: A run can suspend repeatedly; each resume overwrites the checkpoint.
#[tokio::test]
async fn loop_suspends_again_after_resume() {
    let mut graph = StateGraph::new(schema());
    let guess = FnNode::new("guess", |_s: &State| {
        Outcome::suspend("guess a number", ResumeSchema::new().required("answer", FieldType::String))
    });
    graph
        .add_node("guess", Arc::new(guess))
        .add_node("done", Arc::new(Recorder::new("done")))
        .add_edge(START, "guess");
    graph.add_conditional_edges(
        "guess",
        Arc::new(FnRouter::new(["again", "ok"], |s: &State| {
            if s.get_str("answer") == Some("42") {
                "ok".to_string()
            } else {
                "again".to_string()
            }
        })),
        [("again", "guess"), ("ok", "done")],
    );
    let compiled = graph.compile().unwrap();

    let first = compiled
        .invoke(Delta::new(), RunConfig::default().with_run_id("guess"))
        .await
        .unwrap();
    let token = first.suspended().expect("suspended").token.clone();

    let second = compiled
        .resume("guess", Delta::new().with("answer", "7"))
        .await
        .unwrap();
    let again = second.suspended().expect("suspended again");
    assert_ne!(again.token, token);
    assert_eq!(again.steps, 2);

    let third = compiled
        .resume("guess", Delta::new().with("answer", "42"))
        .await
        .unwrap();
    assert_eq!(log_of(third.state()), vec!["done"]);
}
