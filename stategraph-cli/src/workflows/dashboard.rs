//! Parallel dashboard: one coordinator, three concurrent fetchers, one aggregator.
//!
//! The fetchers share a round, so the aggregator sees all three results after
//! the barrier; `sources` is an append field recording who contributed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use stategraph::{
    Delta, FieldSpec, FieldType, FnNode, Node, Outcome, State, StateGraph, StateSchema, Store,
    END, START,
};

pub fn schema() -> StateSchema {
    StateSchema::new()
        .with_field(
            "location",
            FieldSpec::overwrite(FieldType::String).with_default("Seoul"),
        )
        .with_field(
            "topics",
            FieldSpec::overwrite(FieldType::List).with_default(json!(["technology", "economy"])),
        )
        .with_field(
            "symbols",
            FieldSpec::overwrite(FieldType::List).with_default(json!(["KOSPI", "NASDAQ"])),
        )
        .with_field(
            "status",
            FieldSpec::overwrite(FieldType::String).with_default("idle"),
        )
        .with_field("weather", FieldSpec::overwrite(FieldType::Map))
        .with_field("news", FieldSpec::overwrite(FieldType::List))
        .with_field("stocks", FieldSpec::overwrite(FieldType::Map))
        .with_field("sources", FieldSpec::append())
        .with_field("dashboard", FieldSpec::overwrite(FieldType::String))
}

pub fn default_input() -> Delta {
    Delta::new()
}

pub fn build(_store: Arc<dyn Store>) -> StateGraph {
    let mut graph = StateGraph::new(schema());
    graph
        .add_node("coordinator", Arc::new(FnNode::new("coordinator", coordinate)))
        .add_node("weather", Arc::new(Fetcher::new(Source::Weather, 30)))
        .add_node("news", Arc::new(Fetcher::new(Source::News, 50)))
        .add_node("stocks", Arc::new(Fetcher::new(Source::Stocks, 40)))
        .add_node("aggregator", Arc::new(FnNode::new("aggregator", aggregate)))
        .add_edge(START, "coordinator")
        .add_edge("coordinator", "weather")
        .add_edge("coordinator", "news")
        .add_edge("coordinator", "stocks")
        .add_edge("weather", "aggregator")
        .add_edge("news", "aggregator")
        .add_edge("stocks", "aggregator")
        .add_edge("aggregator", END);
    graph
}

fn coordinate(state: &State) -> Outcome {
    match state.get_str("location") {
        Some(location) if !location.trim().is_empty() => {
            Outcome::success(Delta::new().with("status", "collecting"))
        }
        _ => Outcome::fatal("location must not be empty"),
    }
}

/// Stable pseudo-random seed so simulated data is reproducible.
fn seed(text: &str) -> u64 {
    text.bytes()
        .fold(7u64, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(b)))
}

#[derive(Clone, Copy)]
enum Source {
    Weather,
    News,
    Stocks,
}

impl Source {
    fn name(self) -> &'static str {
        match self {
            Source::Weather => "weather",
            Source::News => "news",
            Source::Stocks => "stocks",
        }
    }

    fn fetch(self, state: &State) -> Value {
        match self {
            Source::Weather => {
                let location = state.get_str("location").unwrap_or_default();
                let s = seed(location);
                let conditions = ["sunny", "cloudy", "rainy", "windy"];
                json!({
                    "location": location,
                    "condition": conditions[(s % conditions.len() as u64) as usize],
                    "temperature_c": 5 + (s % 25),
                    "humidity_pct": 30 + (s / 7) % 60,
                })
            }
            Source::News => {
                let templates = [
                    "markets react to new policy",
                    "five trends to watch this quarter",
                    "experts weigh in on latest developments",
                ];
                let headlines = strings(state, "topics")
                    .map(|topic| {
                        let t = templates[(seed(topic) % templates.len() as u64) as usize];
                        json!({ "topic": topic, "headline": format!("{}: {}", topic, t) })
                    })
                    .collect::<Vec<_>>();
                Value::Array(headlines)
            }
            Source::Stocks => {
                let quotes = strings(state, "symbols")
                    .map(|symbol| {
                        let s = seed(symbol);
                        let price = 1000.0 + (s % 400_000) as f64 / 100.0;
                        let change = ((s / 13) % 600) as f64 / 100.0 - 3.0;
                        (
                            symbol.to_string(),
                            json!({ "price": price, "change_pct": change }),
                        )
                    })
                    .collect::<Map<_, _>>();
                Value::Object(quotes)
            }
        }
    }
}

fn strings<'a>(state: &'a State, key: &str) -> impl Iterator<Item = &'a str> {
    state.get_list(key).iter().filter_map(Value::as_str)
}

/// Simulated remote source with fixed latency.
struct Fetcher {
    source: Source,
    latency: Duration,
}

impl Fetcher {
    fn new(source: Source, latency_ms: u64) -> Self {
        Self {
            source,
            latency: Duration::from_millis(latency_ms),
        }
    }
}

#[async_trait]
impl Node for Fetcher {
    fn id(&self) -> &str {
        self.source.name()
    }

    async fn run(&self, state: Arc<State>) -> Outcome {
        tokio::time::sleep(self.latency).await;
        let name = self.source.name();
        Outcome::success(
            Delta::new()
                .with(name, self.source.fetch(&state))
                .with("sources", json!([name])),
        )
    }
}

fn aggregate(state: &State) -> Outcome {
    let (Some(weather), Some(stocks)) = (state.get("weather"), state.get("stocks")) else {
        return Outcome::fatal("aggregator ran before every source reported");
    };
    let mut lines = vec![format!(
        "Weather in {}: {}, {}C",
        weather["location"].as_str().unwrap_or("?"),
        weather["condition"].as_str().unwrap_or("?"),
        weather["temperature_c"]
    )];
    for item in state.get_list("news") {
        lines.push(format!("News: {}", item["headline"].as_str().unwrap_or("?")));
    }
    if let Some(quotes) = stocks.as_object() {
        for (symbol, quote) in quotes {
            lines.push(format!(
                "{}: {:.2} ({:+.2}%)",
                symbol,
                quote["price"].as_f64().unwrap_or(0.0),
                quote["change_pct"].as_f64().unwrap_or(0.0)
            ));
        }
    }
    Outcome::success(
        Delta::new()
            .with("dashboard", lines.join("\n"))
            .with("status", "ready"),
    )
}
