//! Keyword sentiment analysis with a three-way conditional edge.

use std::sync::Arc;

use serde_json::json;
use stategraph::{
    Delta, FieldSpec, FieldType, FnNode, FnRouter, Outcome, State, StateGraph, StateSchema, Store,
    END, START,
};

const POSITIVE: &[&str] = &[
    "good", "great", "happy", "love", "excellent", "wonderful", "thanks", "awesome", "glad",
];
const NEGATIVE: &[&str] = &[
    "bad", "sad", "angry", "hate", "terrible", "awful", "disappointed", "upset", "annoyed",
];

/// Below this confidence the neutral responder answers.
pub const CONFIDENCE_THRESHOLD: f64 = 0.6;

pub fn schema() -> StateSchema {
    StateSchema::new()
        .with_field("text", FieldSpec::overwrite(FieldType::String).with_default(""))
        .with_field("emotion", FieldSpec::overwrite(FieldType::String))
        .with_field("confidence", FieldSpec::overwrite(FieldType::Number))
        .with_field("keywords", FieldSpec::overwrite(FieldType::List))
        .with_field("response", FieldSpec::overwrite(FieldType::String))
}

pub fn default_input() -> Delta {
    Delta::new().with("text", "I love this, the service was great!")
}

pub fn build(_store: Arc<dyn Store>) -> StateGraph {
    let mut graph = StateGraph::new(schema());
    graph
        .add_node("analyze", Arc::new(FnNode::new("analyze", analyze)))
        .add_node(
            "positive_response",
            Arc::new(FnNode::new("positive_response", |_: &State| {
                respond("Glad to hear it! Keep that energy going.")
            })),
        )
        .add_node(
            "negative_response",
            Arc::new(FnNode::new("negative_response", |_: &State| {
                respond("Sorry that happened. Want to talk through it?")
            })),
        )
        .add_node(
            "neutral_response",
            Arc::new(FnNode::new("neutral_response", |_: &State| {
                respond("Thanks for sharing. Tell me more.")
            })),
        )
        .add_edge(START, "analyze")
        .add_conditional_edges(
            "analyze",
            Arc::new(FnRouter::new(
                ["positive", "negative", "neutral"],
                route_emotion,
            )),
            [
                ("positive", "positive_response"),
                ("negative", "negative_response"),
                ("neutral", "neutral_response"),
            ],
        )
        .add_edge("positive_response", END)
        .add_edge("negative_response", END)
        .add_edge("neutral_response", END);
    graph
}

/// Classification of a text: label, confidence and matched keywords.
pub fn classify(text: &str) -> (&'static str, f64, Vec<String>) {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    let hits = |lexicon: &[&str]| -> Vec<String> {
        words
            .iter()
            .filter(|w| lexicon.contains(&w.as_str()))
            .cloned()
            .collect()
    };
    let positive = hits(POSITIVE);
    let negative = hits(NEGATIVE);
    let confidence = |n: usize| (0.6 + 0.2 * n as f64).min(1.0);
    match positive.len().cmp(&negative.len()) {
        std::cmp::Ordering::Greater => ("positive", confidence(positive.len()), positive),
        std::cmp::Ordering::Less => ("negative", confidence(negative.len()), negative),
        std::cmp::Ordering::Equal => {
            let mut all = positive;
            all.extend(negative);
            ("neutral", 0.5, all)
        }
    }
}

fn analyze(state: &State) -> Outcome {
    let (emotion, confidence, keywords) = classify(state.get_str("text").unwrap_or_default());
    Outcome::success(
        Delta::new()
            .with("emotion", emotion)
            .with("confidence", confidence)
            .with("keywords", json!(keywords)),
    )
}

fn route_emotion(state: &State) -> String {
    let confidence = state.get_f64("confidence").unwrap_or(0.0);
    match state.get_str("emotion") {
        Some(emotion @ ("positive" | "negative")) if confidence >= CONFIDENCE_THRESHOLD => {
            emotion.to_string()
        }
        _ => "neutral".to_string(),
    }
}

fn respond(text: &str) -> Outcome {
    Outcome::success(Delta::new().with("response", text))
}
