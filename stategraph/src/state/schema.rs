//! State schema: typed fields, merge policies and resume schemas.
//!
//! A [`StateSchema`] is declared once per graph. Every field names a
//! [`FieldType`] and a [`MergePolicy`]; deltas touching undeclared fields are
//! rejected when merged. [`ResumeSchema`] describes the external input a
//! suspended node accepts.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::reducer::Reducer;
use super::store::{Delta, StateError};

/// JSON shape accepted by a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Any,
    String,
    Number,
    Boolean,
    List,
    Map,
}

impl FieldType {
    /// Returns true when `value` has this shape. `null` is only accepted by `Any`.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldType::Any => true,
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::List => value.is_array(),
            FieldType::Map => value.is_object(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Any => "any",
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::List => "list",
            FieldType::Map => "map",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of the JSON shape of `value`, used in type mismatch errors.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

/// How concurrent writes to one field are combined.
#[derive(Clone, Default)]
pub enum MergePolicy {
    /// Highest precedence writer wins.
    #[default]
    Overwrite,
    /// Lists are concatenated in precedence order.
    Append,
    /// Caller-supplied combinator; must be associative and commutative.
    Custom(Arc<dyn Reducer>),
}

impl fmt::Debug for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergePolicy::Overwrite => f.write_str("Overwrite"),
            MergePolicy::Append => f.write_str("Append"),
            MergePolicy::Custom(r) => write!(f, "Custom({})", r.name()),
        }
    }
}

/// Declaration of one state field.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub field_type: FieldType,
    pub policy: MergePolicy,
    /// Initial value when the caller does not supply one.
    pub default: Option<Value>,
}

impl FieldSpec {
    /// Overwrite field of the given type, no default.
    pub fn overwrite(field_type: FieldType) -> Self {
        Self {
            field_type,
            policy: MergePolicy::Overwrite,
            default: None,
        }
    }

    /// Append-only list field, defaulting to `[]`.
    pub fn append() -> Self {
        Self {
            field_type: FieldType::List,
            policy: MergePolicy::Append,
            default: Some(Value::Array(Vec::new())),
        }
    }

    /// Field merged with `reducer`.
    pub fn custom(field_type: FieldType, reducer: Arc<dyn Reducer>) -> Self {
        Self {
            field_type,
            policy: MergePolicy::Custom(reducer),
            default: None,
        }
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Ordered field declarations for a graph's state.
///
/// Redeclaring a name replaces the earlier spec but keeps its position.
#[derive(Debug, Clone, Default)]
pub struct StateSchema {
    fields: Vec<(String, FieldSpec)>,
}

impl StateSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares (or replaces) a field. Returns `self` for chaining.
    pub fn with_field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = spec,
            None => self.fields.push((name, spec)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Field names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// One key a suspended node accepts on resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeField {
    pub name: String,
    pub field_type: FieldType,
    #[serde(default = "required_default")]
    pub required: bool,
}

fn required_default() -> bool {
    true
}

/// Shape of the external input a suspended node expects.
///
/// Input keys must be declared here; required keys must be present and every
/// value must match its type. An empty schema accepts only an empty input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeSchema {
    pub fields: Vec<ResumeField>,
}

impl ResumeSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(ResumeField {
            name: name.into(),
            field_type,
            required: true,
        });
        self
    }

    pub fn optional(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(ResumeField {
            name: name.into(),
            field_type,
            required: false,
        });
        self
    }

    /// Checks `input` against the declared keys.
    pub fn validate(&self, input: &Delta) -> Result<(), StateError> {
        for (key, value) in input.iter() {
            let field = self
                .fields
                .iter()
                .find(|f| f.name == *key)
                .ok_or_else(|| StateError::UnknownField {
                    field: key.clone(),
                    origin: "resume input".into(),
                })?;
            if !field.field_type.accepts(value) {
                return Err(StateError::TypeMismatch {
                    field: key.clone(),
                    expected: field.field_type,
                    found: value_kind(value),
                });
            }
        }
        for field in self.fields.iter().filter(|f| f.required) {
            if input.get(&field.name).is_none() {
                return Err(StateError::MissingField {
                    field: field.name.clone(),
                });
            }
        }
        Ok(())
    }
}
