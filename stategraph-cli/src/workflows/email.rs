//! Email approval flow with a human in the loop.
//!
//! `human_approval` suspends with a resume schema of `decision`
//! (`approved`, `revision` or `rejected`) and optional `revision_requests`.
//! Revisions loop back to review until `MAX_REVISIONS` compositions.

use std::sync::Arc;

use serde_json::{json, Value};
use stategraph::{
    Delta, FieldSpec, FieldType, FnNode, FnRouter, Outcome, ResumeSchema, State, StateGraph,
    StateSchema, Store, END, START,
};

/// Review score below which a human must approve.
pub const APPROVAL_SCORE: f64 = 80.0;
pub const MAX_REVISIONS: i64 = 3;
const CONTACT: &str = "Contact: support@example.com";

pub fn schema() -> StateSchema {
    StateSchema::new()
        .with_field(
            "recipient",
            FieldSpec::overwrite(FieldType::String).with_default("user@example.com"),
        )
        .with_field(
            "email_type",
            FieldSpec::overwrite(FieldType::String).with_default("welcome"),
        )
        .with_field("subject", FieldSpec::overwrite(FieldType::String).with_default(""))
        .with_field("content", FieldSpec::overwrite(FieldType::String).with_default(""))
        .with_field("review_score", FieldSpec::overwrite(FieldType::Number))
        .with_field("review_comments", FieldSpec::overwrite(FieldType::List))
        .with_field(
            "requires_approval",
            FieldSpec::overwrite(FieldType::Boolean).with_default(true),
        )
        .with_field(
            "decision",
            FieldSpec::overwrite(FieldType::String).with_default("pending"),
        )
        .with_field(
            "revision_requests",
            FieldSpec::overwrite(FieldType::List).with_default(json!([])),
        )
        .with_field("attempt_count", FieldSpec::overwrite(FieldType::Number).with_default(0))
        .with_field("is_sent", FieldSpec::overwrite(FieldType::Boolean).with_default(false))
        .with_field("sent_at", FieldSpec::overwrite(FieldType::String))
        .with_field("final_status", FieldSpec::overwrite(FieldType::String))
}

pub fn default_input() -> Delta {
    Delta::new()
}

/// Resume schema of the approval step.
pub fn approval_schema() -> ResumeSchema {
    ResumeSchema::new()
        .required("decision", FieldType::String)
        .optional("revision_requests", FieldType::List)
}

pub fn build(_store: Arc<dyn Store>) -> StateGraph {
    let mut graph = StateGraph::new(schema());
    graph
        .add_node("composer", Arc::new(FnNode::new("composer", compose)))
        .add_node("reviewer", Arc::new(FnNode::new("reviewer", review)))
        .add_node(
            "human_approval",
            Arc::new(FnNode::new("human_approval", request_approval)),
        )
        .add_node("revision_handler", Arc::new(FnNode::new("revision_handler", revise)))
        .add_node("sender", Arc::new(FnNode::new("sender", send)))
        .add_node("final_report", Arc::new(FnNode::new("final_report", report)))
        .add_edge(START, "composer")
        .add_edge("composer", "reviewer")
        .add_conditional_edges(
            "reviewer",
            Arc::new(FnRouter::new(["approval", "send"], |s: &State| {
                if s.get_bool("requires_approval").unwrap_or(true) {
                    "approval".to_string()
                } else {
                    "send".to_string()
                }
            })),
            [("approval", "human_approval"), ("send", "sender")],
        )
        .add_conditional_edges(
            "human_approval",
            Arc::new(FnRouter::new(["send", "revise", "report"], |s: &State| {
                let label = match s.get_str("decision") {
                    Some("approved") => "send",
                    Some("revision") => "revise",
                    _ => "report",
                };
                label.to_string()
            })),
            [
                ("send", "sender"),
                ("revise", "revision_handler"),
                ("report", "final_report"),
            ],
        )
        .add_conditional_edges(
            "revision_handler",
            Arc::new(FnRouter::new(["review", "report"], |s: &State| {
                if s.get_i64("attempt_count").unwrap_or(0) < MAX_REVISIONS {
                    "review".to_string()
                } else {
                    "report".to_string()
                }
            })),
            [("review", "reviewer"), ("report", "final_report")],
        )
        .add_edge("sender", "final_report")
        .add_edge("final_report", END);
    graph
}

fn template(email_type: &str) -> (&'static str, &'static str) {
    match email_type {
        "welcome" => (
            "Welcome! Getting started with the service",
            "Hello,\n\nThank you for signing up. Highlights:\n\
             - live data on your dashboard\n- custom alerts\n- 24/7 support\n\n\
             If you have any questions, contact us any time.\n\nThank you.",
        ),
        "promotion" => (
            "Special discount event",
            "Hello,\n\nWe prepared something special for you!\n\
             - 50% off the premium plan\n- three extra months free\n\n\
             Upgrade now and explore more features~~",
        ),
        _ => (
            "Important notice about your account",
            "Hello,\n\nPlease note the following update:\n\
             - scheduled maintenance on Saturday 02:00-04:00\n\
             - the service may be briefly unavailable\n\n\
             If you have any questions, see the announcements page.",
        ),
    }
}

fn compose(state: &State) -> Outcome {
    let (subject, content) = template(state.get_str("email_type").unwrap_or_default());
    Outcome::success(
        Delta::new()
            .with("subject", subject)
            .with("content", content)
            .with("attempt_count", state.get_i64("attempt_count").unwrap_or(0) + 1),
    )
}

/// Score (0-100) and reviewer comments for a draft.
pub fn score(subject: &str, content: &str) -> (f64, Vec<String>) {
    let subject_len = subject.chars().count();
    let checks = [
        (
            (50..=500).contains(&content.chars().count()),
            "length is appropriate",
            "content should be between 50 and 500 characters",
        ),
        (
            content.contains("Hello"),
            "has a greeting",
            "add a greeting such as 'Hello'",
        ),
        (
            content.contains("Thank you"),
            "has a closing",
            "add a closing such as 'Thank you'",
        ),
        (
            content.contains("contact") || content.contains("Contact"),
            "has contact information",
            "add contact information",
        ),
        (
            !["lol", "~~"].iter().any(|w| content.to_lowercase().contains(w)),
            "professional tone",
            "remove informal expressions",
        ),
        (
            subject_len > 5 && subject_len < 50,
            "clear subject",
            "subject should be between 6 and 49 characters",
        ),
    ];
    let passed = checks.iter().filter(|(ok, _, _)| *ok).count();
    let comments = checks
        .iter()
        .map(|(ok, good, bad)| if *ok { good.to_string() } else { bad.to_string() })
        .collect();
    (passed as f64 * 100.0 / checks.len() as f64, comments)
}

fn review(state: &State) -> Outcome {
    let (score, comments) = score(
        state.get_str("subject").unwrap_or_default(),
        state.get_str("content").unwrap_or_default(),
    );
    let requires_approval =
        score < APPROVAL_SCORE || state.get_str("email_type") == Some("promotion");
    Outcome::success(
        Delta::new()
            .with("review_score", score)
            .with("review_comments", json!(comments))
            .with("requires_approval", requires_approval),
    )
}

fn request_approval(state: &State) -> Outcome {
    Outcome::suspend(
        format!(
            "Approve '{}' to {} (score {:.0})? decision: approved | revision | rejected",
            state.get_str("subject").unwrap_or_default(),
            state.get_str("recipient").unwrap_or_default(),
            state.get_f64("review_score").unwrap_or(0.0)
        ),
        approval_schema(),
    )
}

fn revise(state: &State) -> Outcome {
    let mut subject = state.get_str("subject").unwrap_or_default().to_string();
    let mut content = state.get_str("content").unwrap_or_default().to_string();
    for request in state.get_list("revision_requests").iter().filter_map(Value::as_str) {
        let request = request.to_lowercase();
        if request.contains("subject") && !subject.starts_with("[Important]") {
            subject = format!("[Important] {}", subject);
        }
        if request.contains("greeting") && !content.contains("Hello") {
            content = format!("Hello,\n\n{}", content);
        }
        if request.contains("closing") && !content.contains("Thank you") {
            content.push_str("\n\nThank you.");
        }
        if request.contains("contact") && !content.contains(CONTACT) {
            content.push_str("\n\n");
            content.push_str(CONTACT);
        }
        if request.contains("tone") {
            content = content.replace("~~", ".");
        }
    }
    Outcome::success(
        Delta::new()
            .with("subject", subject)
            .with("content", content)
            .with("decision", "pending")
            .with("revision_requests", json!([]))
            .with("attempt_count", state.get_i64("attempt_count").unwrap_or(0) + 1),
    )
}

fn send(_state: &State) -> Outcome {
    Outcome::success(
        Delta::new()
            .with("is_sent", true)
            .with("sent_at", chrono::Utc::now().to_rfc3339()),
    )
}

fn report(state: &State) -> Outcome {
    let status = if state.get_bool("is_sent").unwrap_or(false) {
        "sent"
    } else {
        match state.get_str("decision") {
            Some("rejected") => "rejected",
            Some("revision") | Some("pending") => "revision limit reached",
            _ => "not sent",
        }
    };
    Outcome::success(Delta::new().with("final_status", status))
}
