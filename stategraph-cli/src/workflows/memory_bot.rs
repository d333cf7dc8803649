//! Chat turn with session memory kept in the injected store.
//!
//! `load_memory` restores the session profile from `["sessions", session_id]`,
//! `process_message` answers and learns, `save_memory` writes the profile back.
//! Runs sharing a store and session id remember each other.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use stategraph::{
    Delta, FieldSpec, FieldType, FnNode, Namespace, Node, Outcome, RunContext, State, StateGraph,
    StateSchema, Store, END, START,
};

const PROFILE_KEY: &str = "profile";

pub fn schema() -> StateSchema {
    StateSchema::new()
        .with_field(
            "session_id",
            FieldSpec::overwrite(FieldType::String).with_default("default"),
        )
        .with_field("user_message", FieldSpec::overwrite(FieldType::String).with_default(""))
        .with_field("user_name", FieldSpec::overwrite(FieldType::String).with_default(""))
        .with_field("likes", FieldSpec::overwrite(FieldType::List).with_default(json!([])))
        .with_field("dislikes", FieldSpec::overwrite(FieldType::List).with_default(json!([])))
        .with_field("history", FieldSpec::append())
        .with_field("response", FieldSpec::overwrite(FieldType::String))
}

pub fn default_input() -> Delta {
    Delta::new().with("user_message", "Hello!")
}

pub fn build(store: Arc<dyn Store>) -> StateGraph {
    let mut graph = StateGraph::new(schema()).with_store(store);
    graph
        .add_node("load_memory", Arc::new(LoadMemory))
        .add_node(
            "process_message",
            Arc::new(FnNode::new("process_message", process_message)),
        )
        .add_node("save_memory", Arc::new(SaveMemory))
        .add_edge(START, "load_memory")
        .add_edge("load_memory", "process_message")
        .add_edge("process_message", "save_memory")
        .add_edge("save_memory", END);
    graph
}

pub fn session_namespace(session_id: &str) -> Namespace {
    vec!["sessions".to_string(), session_id.to_string()]
}

fn session_of(state: &State) -> Namespace {
    session_namespace(state.get_str("session_id").unwrap_or("default"))
}

fn store_of(ctx: &RunContext) -> Result<&Arc<dyn Store>, Outcome> {
    ctx.store
        .as_ref()
        .ok_or_else(|| Outcome::fatal("memory-bot needs a session store"))
}

struct LoadMemory;

#[async_trait]
impl Node for LoadMemory {
    fn id(&self) -> &str {
        "load_memory"
    }

    async fn run(&self, _state: Arc<State>) -> Outcome {
        Outcome::fatal("memory-bot needs a session store")
    }

    async fn run_with_context(&self, state: Arc<State>, ctx: &RunContext) -> Outcome {
        let store = match store_of(ctx) {
            Ok(store) => store,
            Err(outcome) => return outcome,
        };
        let profile = match store.get(&session_of(&state), PROFILE_KEY).await {
            Ok(Some(profile)) => profile,
            Ok(None) => return Outcome::empty(),
            Err(e) => return Outcome::failure(format!("load profile: {}", e)),
        };
        let mut delta = Delta::new();
        if let Some(name) = profile.get("user_name").filter(|v| v.is_string()) {
            delta.insert("user_name", name.clone());
        }
        for key in ["likes", "dislikes", "history"] {
            if let Some(list) = profile.get(key).filter(|v| v.is_array()) {
                delta.insert(key, list.clone());
            }
        }
        Outcome::success(delta)
    }
}

struct SaveMemory;

#[async_trait]
impl Node for SaveMemory {
    fn id(&self) -> &str {
        "save_memory"
    }

    async fn run(&self, _state: Arc<State>) -> Outcome {
        Outcome::fatal("memory-bot needs a session store")
    }

    async fn run_with_context(&self, state: Arc<State>, ctx: &RunContext) -> Outcome {
        let store = match store_of(ctx) {
            Ok(store) => store,
            Err(outcome) => return outcome,
        };
        let profile = json!({
            "user_name": state.get_str("user_name").unwrap_or_default(),
            "likes": state.get_list("likes"),
            "dislikes": state.get_list("dislikes"),
            "history": state.get_list("history"),
        });
        match store.put(&session_of(&state), PROFILE_KEY, &profile).await {
            Ok(()) => Outcome::empty(),
            Err(e) => Outcome::failure(format!("save profile: {}", e)),
        }
    }
}

/// Text after `marker`, trimmed of surrounding punctuation.
fn after<'a>(message: &'a str, lowered: &str, marker: &str) -> Option<&'a str> {
    let start = lowered.find(marker)? + marker.len();
    let rest = message.get(start..)?;
    let rest = rest.trim().trim_end_matches(|c: char| c.is_ascii_punctuation());
    (!rest.is_empty()).then_some(rest)
}

fn listed(values: &[Value]) -> String {
    values
        .iter()
        .filter_map(Value::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn process_message(state: &State) -> Outcome {
    let message = state.get_str("user_message").unwrap_or_default().trim();
    let lowered = message.to_lowercase();
    let name = state.get_str("user_name").unwrap_or_default();
    let mut delta = Delta::new();

    let response = if lowered.contains("what is my name") || lowered.contains("what's my name") {
        if name.is_empty() {
            "You have not told me your name yet.".to_string()
        } else {
            format!("Your name is {}!", name)
        }
    } else if lowered.contains("what do i like") {
        let likes = state.get_list("likes");
        if likes.is_empty() {
            "You have not told me what you like yet.".to_string()
        } else {
            format!("So far you like: {}.", listed(likes))
        }
    } else if lowered.contains("what did we talk about") {
        let turns = state.get_list("history").len();
        if turns == 0 {
            "We are just getting started!".to_string()
        } else {
            format!("We have talked {} times so far.", turns)
        }
    } else if let Some(new_name) = after(message, &lowered, "my name is ")
        .or_else(|| after(message, &lowered, "i am "))
        .and_then(|rest| rest.split_whitespace().next())
    {
        let new_name = new_name.trim_matches(|c: char| c.is_ascii_punctuation());
        delta.insert("user_name", new_name);
        format!("Nice to meet you, {}! I will remember your name.", new_name)
    } else if let Some(item) = after(message, &lowered, "i don't like ")
        .or_else(|| after(message, &lowered, "i hate "))
    {
        let mut dislikes = state.get_list("dislikes").to_vec();
        dislikes.push(json!(item));
        delta.insert("dislikes", dislikes);
        format!("Noted, you don't like {}.", item)
    } else if let Some(item) = after(message, &lowered, "i like ") {
        let mut likes = state.get_list("likes").to_vec();
        likes.push(json!(item));
        delta.insert("likes", likes);
        format!("You like {}! I will remember that.", item)
    } else if name.is_empty() {
        "Hello! I remember the people I talk to. What is your name?".to_string()
    } else {
        format!("Hello {}, what would you like to talk about today?", name)
    };

    delta.insert(
        "history",
        json!([{ "user": message, "bot": response.clone() }]),
    );
    delta.insert("response", response);
    Outcome::success(delta)
}
