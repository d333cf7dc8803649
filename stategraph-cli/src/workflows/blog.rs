//! Three agents in sequence: a researcher gathers facts on the topic, a
//! writer drafts a post from them, and an editor reviews and finalises it.
//! Each agent appends one entry to `collaboration_log`.

use std::sync::Arc;

use serde_json::{json, Value};
use stategraph::{
    Delta, FieldSpec, FieldType, FnNode, Outcome, State, StateGraph, StateSchema, Store, END,
    START,
};

struct Research {
    technology: &'static str,
    version: &'static str,
    features: &'static [&'static str],
    use_cases: &'static [&'static str],
    pros: &'static [&'static str],
    cons: &'static [&'static str],
    learning_curve: &'static str,
    trend: &'static str,
}

/// Topic keyword and what the researcher knows about it.
const LIBRARY: &[(&str, Research)] = &[
    (
        "python",
        Research {
            technology: "Python",
            version: "3.12",
            features: &["improved type hints", "faster interpreter", "pattern matching"],
            use_cases: &["web development", "data science", "machine learning", "automation"],
            pros: &["simple syntax", "rich ecosystem", "active community"],
            cons: &["slower execution", "the GIL"],
            learning_curve: "beginner friendly",
            trend: "steady growth, accelerating in AI",
        },
    ),
    (
        "react",
        Research {
            technology: "React",
            version: "18.2",
            features: &["components", "virtual DOM", "hooks", "concurrent rendering"],
            use_cases: &["single-page apps", "mobile apps", "desktop apps"],
            pros: &["reusable components", "strong ecosystem", "corporate backing"],
            cons: &["steep learning curve", "fast-moving APIs"],
            learning_curve: "intermediate",
            trend: "still the most used front-end library",
        },
    ),
    (
        "ai",
        Research {
            technology: "AI",
            version: "2024",
            features: &["generative models", "multimodal input", "agent systems"],
            use_cases: &["automation", "content generation", "analytics", "customer support"],
            pros: &["productivity gains", "new business models", "creative uses"],
            cons: &["ethical concerns", "job displacement", "high cost"],
            learning_curve: "varies by field",
            trend: "explosive growth across industries",
        },
    ),
];

pub fn schema() -> StateSchema {
    StateSchema::new()
        .with_field("topic", FieldSpec::overwrite(FieldType::String).with_default(""))
        .with_field(
            "requirements",
            FieldSpec::overwrite(FieldType::String).with_default(""),
        )
        .with_field("research", FieldSpec::overwrite(FieldType::Map))
        .with_field("key_points", FieldSpec::overwrite(FieldType::List))
        .with_field("draft", FieldSpec::overwrite(FieldType::String))
        .with_field("editor_feedback", FieldSpec::overwrite(FieldType::List))
        .with_field("final_post", FieldSpec::overwrite(FieldType::String))
        .with_field("current_agent", FieldSpec::overwrite(FieldType::String))
        .with_field("collaboration_log", FieldSpec::append())
}

pub fn default_input() -> Delta {
    Delta::new()
        .with("topic", "Python for beginners")
        .with("requirements", "practical, friendly tone")
}

pub fn build(_store: Arc<dyn Store>) -> StateGraph {
    let mut graph = StateGraph::new(schema());
    graph
        .add_node("researcher", Arc::new(FnNode::new("researcher", research)))
        .add_node("writer", Arc::new(FnNode::new("writer", write)))
        .add_node("editor", Arc::new(FnNode::new("editor", edit)))
        .add_edge(START, "researcher")
        .add_edge("researcher", "writer")
        .add_edge("writer", "editor")
        .add_edge("editor", END);
    graph
}

fn log_entry(agent: &str, action: &str, summary: String) -> Value {
    json!([{ "agent": agent, "action": action, "summary": summary }])
}

/// Research notes for `topic`: the first known keyword among its words, or a
/// generic profile named after the topic.
pub fn research_for(topic: &str) -> Value {
    let words: Vec<String> = topic
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .collect();
    match LIBRARY.iter().find(|(key, _)| words.iter().any(|w| w == key)) {
        Some((_, r)) => json!({
            "technology": r.technology,
            "version": r.version,
            "features": r.features,
            "use_cases": r.use_cases,
            "pros": r.pros,
            "cons": r.cons,
            "learning_curve": r.learning_curve,
            "trend": r.trend,
        }),
        None => json!({
            "technology": topic,
            "version": "latest",
            "features": ["a fresh approach", "user focus", "scalability"],
            "use_cases": ["varied projects", "business solutions"],
            "pros": ["efficiency", "ease of use", "community support"],
            "cons": ["time to learn", "initial setup"],
            "learning_curve": "intermediate",
            "trend": "a growing field",
        }),
    }
}

fn texts<'a>(research: &'a Value, key: &str, limit: usize) -> Vec<&'a str> {
    research[key]
        .as_array()
        .map(|items| items.iter().filter_map(Value::as_str).take(limit).collect())
        .unwrap_or_default()
}

fn research(state: &State) -> Outcome {
    let topic = state.get_str("topic").unwrap_or_default().trim();
    if topic.is_empty() {
        return Outcome::fatal("topic is required");
    }
    let notes = research_for(topic);
    let technology = notes["technology"].as_str().unwrap_or(topic);
    let key_points = vec![
        format!("{} key features: {}", technology, texts(&notes, "features", 3).join(", ")),
        format!("Main use cases: {}", texts(&notes, "use_cases", 3).join(", ")),
        format!("Strengths: {}", texts(&notes, "pros", 2).join(", ")),
        format!("Market trend: {}", notes["trend"].as_str().unwrap_or_default()),
    ];
    let summary = format!("{} key points", key_points.len());
    Outcome::success(
        Delta::new()
            .with("research", notes)
            .with("key_points", json!(key_points))
            .with("current_agent", "researcher")
            .with("collaboration_log", log_entry("researcher", "research complete", summary)),
    )
}

fn bullets(items: &[&str], suffix: &str) -> String {
    items
        .iter()
        .map(|item| format!("- **{}**{}", item, suffix))
        .collect::<Vec<_>>()
        .join("\n")
}

fn write(state: &State) -> Outcome {
    let Some(notes) = state.get("research") else {
        return Outcome::fatal("writer needs research notes");
    };
    let technology = notes["technology"].as_str().unwrap_or_default();
    let use_cases = texts(notes, "use_cases", 3)
        .iter()
        .enumerate()
        .map(|(i, case)| format!("### {}. {}", i + 1, case))
        .collect::<Vec<_>>()
        .join("\n");

    let draft = format!(
        "# {tech}: what every developer should know\n\n\
         ## Introduction\n\n\
         Hello, developers! Today we look at **{tech}** ({version}). \
         Market trend: {trend}.\n\n\
         ## What is {tech}?\n\n{features}\n\n\
         ## Where it is used\n\n{use_cases}\n\n\
         ## Strengths and limits\n\n{pros}\n\n{cons}\n\n\
         ## Conclusion\n\n\
         {tech} is {curve}; with steady practice anyone can master it.\n",
        tech = technology,
        version = notes["version"].as_str().unwrap_or_default(),
        trend = notes["trend"].as_str().unwrap_or_default(),
        features = bullets(&texts(notes, "features", 3), ""),
        use_cases = use_cases,
        pros = bullets(&texts(notes, "pros", 3), ""),
        cons = bullets(&texts(notes, "cons", 2), " (worth weighing)"),
        curve = notes["learning_curve"].as_str().unwrap_or_default(),
    );
    let summary = format!("{} character draft", draft.chars().count());
    Outcome::success(
        Delta::new()
            .with("draft", draft)
            .with("current_agent", "writer")
            .with("collaboration_log", log_entry("writer", "draft complete", summary)),
    )
}

/// Editor's review of `draft`: one line per check, passed checks first.
pub fn review(draft: &str, features: &[&str]) -> Vec<String> {
    let sections = draft.lines().filter(|l| l.starts_with("## ")).count();
    let missing: Vec<&str> = features
        .iter()
        .filter(|f| !draft.contains(*f))
        .copied()
        .collect();
    let checks = [
        (sections >= 4, format!("structure: {} sections", sections)),
        (
            missing.is_empty(),
            if missing.is_empty() {
                "covers every key feature".to_string()
            } else {
                format!("missing features: {}", missing.join(", "))
            },
        ),
        (draft.contains("## Introduction"), "has an introduction".to_string()),
        (draft.contains("## Conclusion"), "has a conclusion".to_string()),
    ];
    let (passed, failed): (Vec<_>, Vec<_>) = checks.into_iter().partition(|(ok, _)| *ok);
    passed
        .into_iter()
        .map(|(_, text)| format!("ok: {}", text))
        .chain(failed.into_iter().map(|(_, text)| format!("fix: {}", text)))
        .collect()
}

fn edit(state: &State) -> Outcome {
    let draft = state.get_str("draft").unwrap_or_default();
    let notes = state.get("research").cloned().unwrap_or(Value::Null);
    let technology = notes["technology"].as_str().unwrap_or_default();
    let feedback = review(draft, &texts(&notes, "features", 3));

    let tag: String = technology
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase();
    let final_post = format!(
        "{draft}\n## Learning path\n\n\
         1. Core concepts (1-2 weeks)\n\
         2. Practice project (2-3 weeks)\n\
         3. Advanced features (3-4 weeks)\n\
         4. Real-world project (ongoing)\n\n\
         ---\n\n#{tag} #programming #devblog\n",
        draft = draft.trim_end(),
        tag = tag,
    );
    let fixes = feedback.iter().filter(|f| f.starts_with("fix:")).count();
    let summary = format!("{} checks, {} to fix", feedback.len(), fixes);
    Outcome::success(
        Delta::new()
            .with("editor_feedback", json!(feedback))
            .with("final_post", final_post)
            .with("current_agent", "editor")
            .with("collaboration_log", log_entry("editor", "final edit complete", summary)),
    )
}
