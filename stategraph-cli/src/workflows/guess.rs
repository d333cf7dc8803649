//! Number guessing loop: guess, check, hint, repeat until won or out of attempts.
//!
//! With `interactive = true` the `user_guess` node suspends and waits for a
//! `{"guess": n}` answer; otherwise it plays by bisecting the known range.

use std::sync::Arc;

use serde_json::json;
use stategraph::{
    Delta, FieldSpec, FieldType, FnNode, FnRouter, Outcome, ResumeSchema, State, StateGraph,
    StateSchema, Store, END, START,
};

pub const MAX_ATTEMPTS: i64 = 7;
pub const LOW: i64 = 1;
pub const HIGH: i64 = 100;

pub fn schema() -> StateSchema {
    StateSchema::new()
        .with_field("seed", FieldSpec::overwrite(FieldType::Number).with_default(42))
        .with_field("target", FieldSpec::overwrite(FieldType::Number))
        .with_field("guess", FieldSpec::overwrite(FieldType::Number))
        .with_field("attempts", FieldSpec::overwrite(FieldType::Number).with_default(0))
        .with_field(
            "max_attempts",
            FieldSpec::overwrite(FieldType::Number).with_default(MAX_ATTEMPTS),
        )
        .with_field("low", FieldSpec::overwrite(FieldType::Number).with_default(LOW))
        .with_field("high", FieldSpec::overwrite(FieldType::Number).with_default(HIGH))
        .with_field(
            "status",
            FieldSpec::overwrite(FieldType::String).with_default("playing"),
        )
        .with_field("last_result", FieldSpec::overwrite(FieldType::String).with_default(""))
        .with_field("hint", FieldSpec::overwrite(FieldType::String).with_default(""))
        .with_field("guess_history", FieldSpec::append())
        .with_field(
            "interactive",
            FieldSpec::overwrite(FieldType::Boolean).with_default(false),
        )
        .with_field("message", FieldSpec::overwrite(FieldType::String))
}

pub fn default_input() -> Delta {
    Delta::new()
}

pub fn build(_store: Arc<dyn Store>) -> StateGraph {
    let mut graph = StateGraph::new(schema());
    graph
        .add_node("setup", Arc::new(FnNode::new("setup", setup)))
        .add_node("user_guess", Arc::new(FnNode::new("user_guess", user_guess)))
        .add_node("check_guess", Arc::new(FnNode::new("check_guess", check_guess)))
        .add_node("provide_hint", Arc::new(FnNode::new("provide_hint", provide_hint)))
        .add_node("game_end", Arc::new(FnNode::new("game_end", game_end)))
        .add_edge(START, "setup")
        .add_edge("setup", "user_guess")
        .add_edge("user_guess", "check_guess")
        .add_conditional_edges(
            "check_guess",
            Arc::new(FnRouter::new(["continue", "end"], |s: &State| {
                match s.get_str("status") {
                    Some("playing") => "continue".to_string(),
                    _ => "end".to_string(),
                }
            })),
            [("continue", "provide_hint"), ("end", "game_end")],
        )
        .add_edge("provide_hint", "user_guess")
        .add_edge("game_end", END);
    graph
}

fn int(state: &State, key: &str, default: i64) -> i64 {
    state
        .get_f64(key)
        .map(|v| v as i64)
        .unwrap_or(default)
}

fn setup(state: &State) -> Outcome {
    let mut delta = Delta::new()
        .with("attempts", 0)
        .with("low", LOW)
        .with("high", HIGH)
        .with("status", "playing");
    let target = int(state, "target", 0);
    if !(LOW..=HIGH).contains(&target) {
        let seed = int(state, "seed", 42).unsigned_abs();
        let target = (seed.wrapping_mul(37) % HIGH as u64) as i64 + 1;
        delta.insert("target", target);
    }
    Outcome::success(delta)
}

fn user_guess(state: &State) -> Outcome {
    let low = int(state, "low", LOW);
    let high = int(state, "high", HIGH);
    if state.get_bool("interactive").unwrap_or(false) {
        let mut prompt = format!("Guess a number between {} and {}", low, high);
        if let Some(hint) = state.get_str("hint").filter(|h| !h.is_empty()) {
            prompt.push_str(&format!(" ({})", hint));
        }
        return Outcome::suspend(prompt, ResumeSchema::new().required("guess", FieldType::Number));
    }
    Outcome::success(Delta::new().with("guess", (low + high) / 2))
}

fn check_guess(state: &State) -> Outcome {
    let Some(guess) = state.get_f64("guess").map(|g| g as i64) else {
        return Outcome::fatal("no guess to check");
    };
    let target = int(state, "target", 0);
    let attempts = int(state, "attempts", 0) + 1;
    let max_attempts = int(state, "max_attempts", MAX_ATTEMPTS);
    let mut delta = Delta::new()
        .with("attempts", attempts)
        .with("guess_history", json!([guess]));
    if guess == target {
        delta.insert("status", "won");
        delta.insert("last_result", "correct");
    } else if attempts >= max_attempts {
        delta.insert("status", "lost");
        delta.insert("last_result", if guess < target { "too_low" } else { "too_high" });
    } else if guess < target {
        delta.insert("last_result", "too_low");
        delta.insert("low", int(state, "low", LOW).max(guess + 1));
    } else {
        delta.insert("last_result", "too_high");
        delta.insert("high", int(state, "high", HIGH).min(guess - 1));
    }
    Outcome::success(delta)
}

fn provide_hint(state: &State) -> Outcome {
    let attempts = int(state, "attempts", 0);
    let target = int(state, "target", 0);
    let mut hint = match state.get_str("last_result") {
        Some("too_low") => "Go higher".to_string(),
        _ => "Go lower".to_string(),
    };
    if attempts >= 3 {
        hint.push_str(if target % 2 == 0 {
            "; the number is even"
        } else {
            "; the number is odd"
        });
    }
    if attempts >= 5 {
        let quarter = (target - 1) / 25;
        hint.push_str(&format!(
            "; it lies between {} and {}",
            quarter * 25 + 1,
            quarter * 25 + 25
        ));
    }
    Outcome::success(Delta::new().with("hint", hint))
}

fn game_end(state: &State) -> Outcome {
    let attempts = int(state, "attempts", 0);
    let target = int(state, "target", 0);
    let message = match state.get_str("status") {
        Some("won") => format!("Correct! {} found in {} attempts", target, attempts),
        _ => format!("Out of attempts; the number was {}", target),
    };
    Outcome::success(Delta::new().with("message", message))
}
