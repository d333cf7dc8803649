//! Tool dispatch: an analyzer picks one of three tools by keyword, the chosen
//! tool runs, and every branch joins at one formatter.
//!
//! Queries with no recognised intent skip the tools and go straight to the
//! formatter.

use std::sync::Arc;

use serde_json::{json, Value};
use stategraph::{
    Delta, FieldSpec, FieldType, FnNode, FnRouter, Outcome, State, StateGraph, StateSchema, Store,
    END, START,
};

pub const CALCULATOR: &str = "calculator";
pub const WEATHER: &str = "weather";
pub const CURRENCY: &str = "currency_converter";

/// Intent keywords, in tie-break order.
const INTENTS: &[(&str, &[&str])] = &[
    (
        CALCULATOR,
        &[
            "calculate", "plus", "minus", "times", "divided", "sqrt", "sin", "cos", "tan", "math",
            "+", "-", "*", "/", "^", "=",
        ],
    ),
    (
        WEATHER,
        &[
            "weather", "temperature", "forecast", "rain", "snow", "sunny", "cloudy", "humidity",
            "wind",
        ],
    ),
    (
        CURRENCY,
        &[
            "exchange", "convert", "currency", "dollar", "won", "yen", "euro", "usd", "krw", "jpy",
            "eur",
        ],
    ),
];

const FUNCTIONS: &[&str] = &["sqrt", "sin", "cos", "tan", "abs"];

/// City key, display name, temperature (°C), condition, humidity (%), wind (m/s).
const CITIES: &[(&str, &str, i64, &str, i64, i64)] = &[
    ("seoul", "Seoul", 15, "clear", 60, 10),
    ("busan", "Busan", 18, "cloudy", 70, 15),
    ("tokyo", "Tokyo", 12, "rainy", 80, 8),
    ("new york", "New York", 5, "snowy", 40, 20),
    ("london", "London", 8, "cloudy", 75, 12),
    ("paris", "Paris", 11, "clear", 65, 9),
];

const CURRENCY_WORDS: &[(&str, &str)] = &[
    ("usd", "USD"),
    ("dollar", "USD"),
    ("krw", "KRW"),
    ("won", "KRW"),
    ("jpy", "JPY"),
    ("yen", "JPY"),
    ("eur", "EUR"),
    ("euro", "EUR"),
    ("cny", "CNY"),
    ("yuan", "CNY"),
];

const RATES: &[(&str, &str, f64)] = &[
    ("USD", "KRW", 1320.50),
    ("KRW", "USD", 1.0 / 1320.50),
    ("USD", "JPY", 149.80),
    ("JPY", "USD", 1.0 / 149.80),
    ("USD", "EUR", 0.92),
    ("EUR", "USD", 1.0 / 0.92),
    ("KRW", "JPY", 0.113),
    ("JPY", "KRW", 8.85),
    ("EUR", "KRW", 1435.60),
    ("KRW", "EUR", 1.0 / 1435.60),
];

pub fn schema() -> StateSchema {
    StateSchema::new()
        .with_field("query", FieldSpec::overwrite(FieldType::String).with_default(""))
        .with_field(
            "intent",
            FieldSpec::overwrite(FieldType::String).with_default("unknown"),
        )
        .with_field("tool_input", FieldSpec::overwrite(FieldType::Map))
        .with_field("tool_output", FieldSpec::overwrite(FieldType::Map))
        .with_field("answer", FieldSpec::overwrite(FieldType::String))
}

pub fn default_input() -> Delta {
    Delta::new().with("query", "Calculate 2 + 3 * 4")
}

pub fn build(_store: Arc<dyn Store>) -> StateGraph {
    let mut graph = StateGraph::new(schema());
    graph
        .add_node("query_analyzer", Arc::new(FnNode::new("query_analyzer", analyze)))
        .add_node(CALCULATOR, Arc::new(FnNode::new(CALCULATOR, calculate)))
        .add_node(WEATHER, Arc::new(FnNode::new(WEATHER, weather)))
        .add_node(CURRENCY, Arc::new(FnNode::new(CURRENCY, convert)))
        .add_node("result_formatter", Arc::new(FnNode::new("result_formatter", format_answer)))
        .add_edge(START, "query_analyzer")
        .add_conditional_edges(
            "query_analyzer",
            Arc::new(FnRouter::new(
                [CALCULATOR, WEATHER, CURRENCY, "formatter"],
                |s: &State| match s.get_str("intent") {
                    Some(tool @ (CALCULATOR | WEATHER | CURRENCY)) => tool.to_string(),
                    _ => "formatter".to_string(),
                },
            )),
            [
                (CALCULATOR, CALCULATOR),
                (WEATHER, WEATHER),
                (CURRENCY, CURRENCY),
                ("formatter", "result_formatter"),
            ],
        )
        .add_edge(CALCULATOR, "result_formatter")
        .add_edge(WEATHER, "result_formatter")
        .add_edge(CURRENCY, "result_formatter")
        .add_edge("result_formatter", END);
    graph
}

/// Intent with the most keyword hits; the earlier intent wins ties.
pub fn detect_intent(query: &str) -> &'static str {
    let lowered = query.to_lowercase();
    let mut best = ("unknown", 0);
    for (intent, keywords) in INTENTS {
        let hits = keywords.iter().filter(|k| lowered.contains(*k)).count();
        if hits > best.1 {
            best = (*intent, hits);
        }
    }
    best.0
}

fn analyze(state: &State) -> Outcome {
    let query = state.get_str("query").unwrap_or_default();
    let intent = detect_intent(query);
    let lowered = query.to_lowercase();
    let tool_input = match intent {
        CALCULATOR => json!({ "expression": extract_expression(query) }),
        WEATHER => {
            let city = CITIES
                .iter()
                .find(|c| lowered.contains(c.0))
                .map_or("seoul", |c| c.0);
            json!({ "city": city })
        }
        CURRENCY => {
            let (from, to) = currency_pair(&lowered);
            let amount = lowered
                .split(|c: char| !c.is_ascii_digit())
                .find(|w| !w.is_empty())
                .and_then(|w| w.parse::<i64>().ok())
                .unwrap_or(100);
            json!({ "amount": amount, "from": from, "to": to })
        }
        _ => json!({}),
    };
    Outcome::success(
        Delta::new()
            .with("intent", intent)
            .with("tool_input", tool_input),
    )
}

/// The arithmetic part of a query: from the first number, `(` or function
/// name up to the last digit or `)`.
pub fn extract_expression(query: &str) -> String {
    let lowered = query.to_lowercase();
    let starts_here = |i: usize, c: char| {
        let at_word = lowered[..i]
            .chars()
            .next_back()
            .map_or(true, |p| !p.is_ascii_alphabetic());
        c.is_ascii_digit()
            || c == '('
            || (at_word && FUNCTIONS.iter().any(|f| lowered[i..].starts_with(f)))
    };
    let Some(start) = lowered.char_indices().find(|&(i, c)| starts_here(i, c)).map(|(i, _)| i) else {
        return query.trim().to_string();
    };
    lowered[start..]
        .trim_end_matches(|c: char| !(c.is_ascii_digit() || c == ')'))
        .to_string()
}

/// Currencies in the order they are mentioned. One currency converts to
/// KRW (or from KRW to USD); none means USD to KRW.
fn currency_pair(lowered: &str) -> (&'static str, &'static str) {
    let mut found: Vec<(usize, &'static str)> = CURRENCY_WORDS
        .iter()
        .filter_map(|(word, code)| lowered.find(word).map(|at| (at, *code)))
        .collect();
    found.sort();
    let mut codes: Vec<&'static str> = Vec::new();
    for (_, code) in found {
        if !codes.contains(&code) {
            codes.push(code);
        }
    }
    match codes.as_slice() {
        [from, to, ..] => (*from, *to),
        ["KRW"] => ("KRW", "USD"),
        [from] => (*from, "KRW"),
        [] => ("USD", "KRW"),
    }
}

fn calculate(state: &State) -> Outcome {
    let expression = state
        .get_path("tool_input.expression")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let output = match evaluate(expression) {
        Ok(result) => json!({ "status": "success", "expression": expression, "result": number(result) }),
        Err(error) => json!({ "status": "error", "expression": expression, "error": error }),
    };
    Outcome::success(Delta::new().with("tool_output", output))
}

fn weather(state: &State) -> Outcome {
    let key = state
        .get_path("tool_input.city")
        .and_then(Value::as_str)
        .unwrap_or("seoul");
    let output = match CITIES.iter().find(|c| c.0 == key) {
        Some(&(_, city, temperature, condition, humidity, wind)) => json!({
            "status": "success",
            "city": city,
            "temperature": temperature,
            "condition": condition,
            "humidity": humidity,
            "wind_speed": wind,
        }),
        None => json!({ "status": "error", "error": format!("no weather data for '{}'", key) }),
    };
    Outcome::success(Delta::new().with("tool_output", output))
}

fn convert(state: &State) -> Outcome {
    let field = |name: &str| state.get_path(&format!("tool_input.{}", name)).cloned();
    let amount = field("amount").and_then(|v| v.as_i64()).unwrap_or(100);
    let from = field("from").and_then(|v| v.as_str().map(str::to_string)).unwrap_or_default();
    let to = field("to").and_then(|v| v.as_str().map(str::to_string)).unwrap_or_default();

    let rate = if from == to {
        Some(1.0)
    } else {
        RATES
            .iter()
            .find(|(f, t, _)| *f == from && *t == to)
            .map(|(_, _, rate)| *rate)
    };
    let output = match rate {
        Some(rate) => json!({
            "status": "success",
            "amount": amount,
            "from": from,
            "to": to,
            "rate": number(round_to(rate, 4)),
            "converted": number(round_to(amount as f64 * rate, 2)),
        }),
        None => json!({
            "status": "error",
            "error": format!("no exchange rate for {} -> {}", from, to),
        }),
    };
    Outcome::success(Delta::new().with("tool_output", output))
}

fn format_answer(state: &State) -> Outcome {
    let out = |key: &str| {
        state
            .get_path(&format!("tool_output.{}", key))
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default()
    };
    let answer = if out("status") == "error" {
        format!("Error: {}", out("error"))
    } else {
        match state.get_str("intent") {
            Some(CALCULATOR) => format!("{} = {}", out("expression"), out("result")),
            Some(WEATHER) => format!(
                "Weather in {}: {}°C, {}, humidity {}%, wind {} m/s",
                out("city"),
                out("temperature"),
                out("condition"),
                out("humidity"),
                out("wind_speed")
            ),
            Some(CURRENCY) => format!(
                "{} {} = {} {} (1 {} = {} {})",
                out("amount"),
                out("from"),
                out("converted"),
                out("to"),
                out("from"),
                out("rate"),
                out("to")
            ),
            _ => "Sorry, I can only calculate, check the weather or convert currencies.".to_string(),
        }
    };
    Outcome::success(Delta::new().with("answer", answer))
}

fn round_to(x: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (x * scale).round() / scale
}

fn number(x: f64) -> Value {
    if x.fract() == 0.0 && x.abs() < i64::MAX as f64 {
        Value::from(x as i64)
    } else {
        Value::from(x)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Op(char),
    Ident(String),
}

/// Evaluates `+ - * / ^`, parentheses, unary signs and the functions
/// `sqrt sin cos tan abs` (radians).
pub fn evaluate(expression: &str) -> Result<f64, String> {
    let mut parser = Parser {
        tokens: tokenize(expression)?,
        pos: 0,
    };
    let value = parser.sum()?;
    if let Some(extra) = parser.tokens.get(parser.pos) {
        return Err(format!("unexpected {:?}", extra));
    }
    if !value.is_finite() {
        return Err("result is not a finite number".into());
    }
    Ok(value)
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut text = String::new();
            while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit() || **d == '.') {
                text.push(d);
                chars.next();
            }
            let n = text.parse().map_err(|_| format!("bad number '{}'", text))?;
            tokens.push(Token::Num(n));
        } else if c.is_ascii_alphabetic() {
            let mut name = String::new();
            while let Some(&d) = chars.peek().filter(|d| d.is_ascii_alphabetic()) {
                name.push(d.to_ascii_lowercase());
                chars.next();
            }
            tokens.push(Token::Ident(name));
        } else if "+-*/^()".contains(c) {
            tokens.push(Token::Op(c));
            chars.next();
        } else {
            return Err(format!("unexpected character '{}'", c));
        }
    }
    Ok(tokens)
}

/// Recursive descent: sum > product > unary > power > atom.
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn eat(&mut self, op: char) -> bool {
        if self.tokens.get(self.pos) == Some(&Token::Op(op)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn sum(&mut self) -> Result<f64, String> {
        let mut value = self.product()?;
        loop {
            if self.eat('+') {
                value += self.product()?;
            } else if self.eat('-') {
                value -= self.product()?;
            } else {
                return Ok(value);
            }
        }
    }

    fn product(&mut self) -> Result<f64, String> {
        let mut value = self.unary()?;
        loop {
            if self.eat('*') {
                value *= self.unary()?;
            } else if self.eat('/') {
                let divisor = self.unary()?;
                if divisor == 0.0 {
                    return Err("division by zero".into());
                }
                value /= divisor;
            } else {
                return Ok(value);
            }
        }
    }

    fn unary(&mut self) -> Result<f64, String> {
        if self.eat('-') {
            Ok(-self.unary()?)
        } else if self.eat('+') {
            self.unary()
        } else {
            self.power()
        }
    }

    fn power(&mut self) -> Result<f64, String> {
        let base = self.atom()?;
        if self.eat('^') {
            Ok(base.powf(self.unary()?))
        } else {
            Ok(base)
        }
    }

    fn atom(&mut self) -> Result<f64, String> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        match token {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::Op('(')) => {
                let value = self.sum()?;
                self.close()?;
                Ok(value)
            }
            Some(Token::Ident(name)) => {
                let f: fn(f64) -> f64 = match name.as_str() {
                    "sqrt" => f64::sqrt,
                    "sin" => f64::sin,
                    "cos" => f64::cos,
                    "tan" => f64::tan,
                    "abs" => f64::abs,
                    _ => return Err(format!("unknown function '{}'", name)),
                };
                if !self.eat('(') {
                    return Err(format!("expected '(' after {}", name));
                }
                let arg = self.sum()?;
                self.close()?;
                Ok(f(arg))
            }
            Some(other) => Err(format!("unexpected {:?}", other)),
            None => Err("unexpected end of expression".into()),
        }
    }

    fn close(&mut self) -> Result<(), String> {
        if self.eat(')') {
            Ok(())
        } else {
            Err("missing ')'".into())
        }
    }
}
