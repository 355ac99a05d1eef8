//! Fixed coercion table applied by the parameter firewall.

use super::{Map, Value, ValueKind};
use crate::error::TypeError;

/// Words accepted as `true` when coercing strings to booleans.
const TRUTHY_WORDS: [&str; 4] = ["true", "yes", "on", "1"];

pub(super) fn coerce(value: &Value, kind: ValueKind) -> Result<Value, TypeError> {
    match kind {
        ValueKind::Bool => Ok(Value::Bool(to_bool(value))),
        ValueKind::Int => Ok(Value::Int(to_int(value))),
        ValueKind::Double => Ok(Value::Double(to_double(value))),
        ValueKind::String => Ok(Value::String(value.render())),
        ValueKind::List => Ok(Value::List(to_list(value))),
        ValueKind::Map => Ok(Value::Map(to_map(value))),
        ValueKind::Null | ValueKind::Error => Err(TypeError::Unsupported { kind }),
    }
}

fn to_bool(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Int(number) => *number != 0,
        Value::Double(number) => *number != 0.0,
        Value::String(text) => {
            let lowered = text.trim().to_ascii_lowercase();
            TRUTHY_WORDS.contains(&lowered.as_str())
        }
        Value::List(items) => !items.is_empty(),
        Value::Map(map) => !map.is_empty(),
        Value::Error(_) => false,
    }
}

fn to_int(value: &Value) -> i64 {
    match value {
        Value::Null | Value::Error(_) => 0,
        Value::Bool(flag) => i64::from(*flag),
        Value::Int(number) => *number,
        Value::Double(number) => truncate(*number),
        Value::String(text) => {
            let trimmed = text.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().map(truncate))
                .unwrap_or(0)
        }
        Value::List(items) => count(items.len()),
        Value::Map(map) => count(map.len()),
    }
}

fn to_double(value: &Value) -> f64 {
    match value {
        Value::Null | Value::Error(_) => 0.0,
        Value::Bool(flag) => f64::from(u8::from(*flag)),
        Value::Int(number) => widen(*number),
        Value::Double(number) => *number,
        Value::String(text) => text.trim().parse::<f64>().unwrap_or(0.0),
        Value::List(items) => f64::from(u32::try_from(items.len()).unwrap_or(u32::MAX)),
        Value::Map(map) => f64::from(u32::try_from(map.len()).unwrap_or(u32::MAX)),
    }
}

fn to_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::List(items) => items.clone(),
        Value::Map(map) => map.values().cloned().collect(),
        scalar => vec![scalar.clone()],
    }
}

fn to_map(value: &Value) -> Map {
    match value {
        Value::Null => Map::new(),
        Value::Map(map) => map.clone(),
        Value::List(items) => items
            .iter()
            .enumerate()
            .map(|(index, item)| (index.to_string(), item.clone()))
            .collect(),
        scalar => Map::from([(String::from("0"), scalar.clone())]),
    }
}

/// Truncates towards zero, saturating at the `i64` bounds (NaN becomes 0).
#[expect(
    clippy::cast_possible_truncation,
    reason = "saturating float to int conversion is the documented rule"
)]
const fn truncate(number: f64) -> i64 {
    number as i64
}

#[expect(clippy::cast_precision_loss, reason = "int to double is lossy by contract")]
const fn widen(number: i64) -> f64 {
    number as f64
}

fn count(len: usize) -> i64 {
    i64::try_from(len).unwrap_or(i64::MAX)
}
