//! Custom merge combinators for `MergePolicy::Custom` fields.

use serde_json::{Map, Value};

/// Combines an incoming value into the current value of a field.
///
/// Implementations must be associative and commutative so that concurrent
/// writes from one round merge to the same result in any order. An `Err`
/// aborts the merge as a conflict.
pub trait Reducer: Send + Sync {
    /// Short name used in logs and `Debug` output.
    fn name(&self) -> &str;

    fn reduce(&self, current: Option<&Value>, incoming: &Value) -> Result<Value, String>;
}

fn as_number(value: &Value, what: &str) -> Result<f64, String> {
    value
        .as_f64()
        .ok_or_else(|| format!("{} expects numbers, got {}", what, value))
}

fn number(n: f64) -> Value {
    // Keep integers integral so `1 + 2` reads back as 3, not 3.0.
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}

/// Numeric sum; a missing current value counts as zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sum;

impl Reducer for Sum {
    fn name(&self) -> &str {
        "sum"
    }

    fn reduce(&self, current: Option<&Value>, incoming: &Value) -> Result<Value, String> {
        let current = match current {
            Some(Value::Null) | None => return as_number(incoming, "sum").map(|_| incoming.clone()),
            Some(v) => v,
        };
        // Integers stay exact; anything else (or an overflow) goes through f64.
        if let (Some(a), Some(b)) = (current.as_i64(), incoming.as_i64()) {
            if let Some(total) = a.checked_add(b) {
                return Ok(Value::from(total));
            }
        }
        Ok(number(as_number(current, "sum")? + as_number(incoming, "sum")?))
    }
}

/// Keeps the larger number.
#[derive(Debug, Clone, Copy, Default)]
pub struct Max;

impl Reducer for Max {
    fn name(&self) -> &str {
        "max"
    }

    fn reduce(&self, current: Option<&Value>, incoming: &Value) -> Result<Value, String> {
        let inc = as_number(incoming, "max")?;
        match current {
            Some(Value::Null) | None => Ok(incoming.clone()),
            Some(v) if as_number(v, "max")? >= inc => Ok(v.clone()),
            Some(_) => Ok(incoming.clone()),
        }
    }
}

/// Keeps the smaller number.
#[derive(Debug, Clone, Copy, Default)]
pub struct Min;

impl Reducer for Min {
    fn name(&self) -> &str {
        "min"
    }

    fn reduce(&self, current: Option<&Value>, incoming: &Value) -> Result<Value, String> {
        let inc = as_number(incoming, "min")?;
        match current {
            Some(Value::Null) | None => Ok(incoming.clone()),
            Some(v) if as_number(v, "min")? <= inc => Ok(v.clone()),
            Some(_) => Ok(incoming.clone()),
        }
    }
}

/// Shallow union of two maps.
///
/// A key written on both sides with different values is a conflict, which is
/// what keeps the union order-independent.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeObject;

impl Reducer for MergeObject {
    fn name(&self) -> &str {
        "merge_object"
    }

    fn reduce(&self, current: Option<&Value>, incoming: &Value) -> Result<Value, String> {
        let incoming = incoming
            .as_object()
            .ok_or_else(|| format!("merge_object expects a map, got {}", incoming))?;
        let mut merged = match current {
            Some(Value::Object(m)) => m.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(other) => return Err(format!("merge_object expects a map, got {}", other)),
        };
        for (k, v) in incoming {
            match merged.get(k) {
                Some(existing) if existing != v => {
                    return Err(format!(
                        "key '{}' written twice with different values ({} vs {})",
                        k, existing, v
                    ));
                }
                _ => {
                    merged.insert(k.clone(), v.clone());
                }
            }
        }
        Ok(Value::Object(merged))
    }
}
