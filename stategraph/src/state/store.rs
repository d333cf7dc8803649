//! Runtime state values, deltas and the merge step.
//!
//! Nodes never mutate [`State`]; they return a [`Delta`]. The engine wraps each
//! delta in a [`StateUpdate`] carrying its precedence and merges a whole round
//! at once with [`State::apply`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::schema::{value_kind, FieldType, MergePolicy, StateSchema};

/// State schema violations raised while building or merging state.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StateError {
    /// A delta wrote a field the schema does not declare.
    #[error("unknown field '{field}' written by {origin}")]
    UnknownField { field: String, origin: String },

    /// A value does not match the declared field type.
    #[error("field '{field}' expects {expected}, got {found}")]
    TypeMismatch {
        field: String,
        expected: FieldType,
        found: &'static str,
    },

    /// The merge policy could not combine the values.
    #[error("merge conflict on field '{field}': {detail}")]
    MergeConflict { field: String, detail: String },

    /// A required key is absent.
    #[error("missing required field '{field}'")]
    MissingField { field: String },
}

/// Partial state written by one node invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Delta(Map<String, Value>);

impl Delta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Builds a delta from a JSON object; any other value yields `None`.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Delta {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Delta {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// One delta queued for merge, tagged with where it came from.
///
/// `order` is the precedence of the contributing branch within its round
/// (its position in the frontier). Within one `apply` call every update must
/// have a distinct `(order, source)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    pub source: String,
    pub order: usize,
    pub delta: Delta,
}

impl StateUpdate {
    pub fn new(source: impl Into<String>, order: usize, delta: Delta) -> Self {
        Self {
            source: source.into(),
            order,
            delta,
        }
    }
}

/// Versioned state shared by all nodes of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    values: Map<String, Value>,
    version: u64,
}

impl State {
    /// Builds the initial state: schema defaults overlaid with `initial`.
    ///
    /// Every key of `initial` must be declared and match its field type.
    pub fn from_schema(schema: &StateSchema, initial: Delta) -> Result<Self, StateError> {
        let mut values = Map::new();
        for (name, spec) in schema.iter() {
            if let Some(default) = &spec.default {
                values.insert(name.to_string(), default.clone());
            }
        }
        for (key, value) in initial.0 {
            let spec = schema.get(&key).ok_or_else(|| StateError::UnknownField {
                field: key.clone(),
                origin: "initial state".into(),
            })?;
            if !spec.field_type.accepts(&value) {
                return Err(StateError::TypeMismatch {
                    field: key,
                    expected: spec.field_type,
                    found: value_kind(&value),
                });
            }
            values.insert(key, value);
        }
        Ok(Self { values, version: 0 })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Nested lookup with dot notation, e.g. `"weather.status"`.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.values.get(parts.next()?)?;
        for part in parts {
            current = match current {
                Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                other => other.get(part)?,
            };
        }
        Some(current)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn get_list(&self, key: &str) -> &[Value] {
        self.get(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of successful merges applied since the run started.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.values.clone())
    }

    /// Merges one round of updates under the schema's merge policies.
    ///
    /// Updates are applied in `(order, source)` order, so the result does not
    /// depend on the order of `updates`. On error nothing is changed.
    pub fn apply(
        &mut self,
        schema: &StateSchema,
        mut updates: Vec<StateUpdate>,
    ) -> Result<(), StateError> {
        if updates.is_empty() {
            return Ok(());
        }
        updates.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.source.cmp(&b.source)));

        let mut working = self.values.clone();
        for update in &updates {
            for (key, value) in update.delta.iter() {
                let spec = schema.get(key).ok_or_else(|| StateError::UnknownField {
                    field: key.clone(),
                    origin: format!("node '{}'", update.source),
                })?;
                match &spec.policy {
                    MergePolicy::Overwrite => {
                        check_type(key, spec.field_type, value)?;
                        working.insert(key.clone(), value.clone());
                    }
                    MergePolicy::Append => {
                        let slot = working
                            .entry(key.clone())
                            .or_insert_with(|| Value::Array(Vec::new()));
                        if slot.is_null() {
                            *slot = Value::Array(Vec::new());
                        }
                        let list = slot.as_array_mut().ok_or_else(|| StateError::MergeConflict {
                            field: key.clone(),
                            detail: "append target is not a list".into(),
                        })?;
                        match value {
                            Value::Array(items) => list.extend(items.iter().cloned()),
                            other => list.push(other.clone()),
                        }
                    }
                    MergePolicy::Custom(reducer) => {
                        check_type(key, spec.field_type, value)?;
                        let merged = reducer.reduce(working.get(key), value).map_err(|detail| {
                            StateError::MergeConflict {
                                field: key.clone(),
                                detail,
                            }
                        })?;
                        working.insert(key.clone(), merged);
                    }
                }
            }
        }

        self.values = working;
        self.version += 1;
        Ok(())
    }
}

fn check_type(field: &str, expected: FieldType, value: &Value) -> Result<(), StateError> {
    if expected.accepts(value) {
        Ok(())
    } else {
        Err(StateError::TypeMismatch {
            field: field.to_string(),
            expected,
            found: value_kind(value),
        })
    }
}
