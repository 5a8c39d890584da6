//! Conversion of raw input values into a property's declared type.
//!
//! Coercion never fails: input that cannot be read as the target type
//! degrades to that type's zero value. Coercing an already-coerced value
//! returns it unchanged.

use crate::schema::{BuiltinType, PropertyDef, PropertyType};
use kvmodel_types::parse_timestamp_millis;
use serde_json::Value;

/// The zero value of a built-in type.
#[must_use]
pub fn zero_value(ty: BuiltinType) -> Value {
    match ty {
        BuiltinType::String => Value::String(String::new()),
        BuiltinType::Boolean => Value::Bool(false),
        BuiltinType::Integer | BuiltinType::Timestamp => Value::from(0i64),
        BuiltinType::Float => Value::from(0.0f64),
        BuiltinType::Json => Value::String("{}".into()),
    }
}

/// Coerces `raw` into the given built-in type.
#[must_use]
pub fn coerce(ty: BuiltinType, raw: &Value) -> Value {
    match ty {
        BuiltinType::String => Value::String(to_plain_string(raw)),
        BuiltinType::Boolean => Value::Bool(truthy(raw)),
        BuiltinType::Integer => Value::from(to_integer(raw)),
        BuiltinType::Float => Value::from(to_float(raw)),
        BuiltinType::Timestamp => Value::from(to_timestamp(raw)),
        BuiltinType::Json => Value::String(to_json_text(raw)),
    }
}

/// Renders a coerced value as the string written to the store hash.
#[must_use]
pub fn encode_stored(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Renders a property value as the text written to its hash field.
///
/// Behavior properties have no declared type, so their values are written as
/// JSON and read back with their type intact.
#[must_use]
pub fn encode_field(property: &PropertyDef, value: &Value) -> String {
    match &property.kind {
        PropertyType::Builtin(_) => encode_stored(value),
        PropertyType::Behavior(_) => value.to_string(),
    }
}

/// Reads a stored hash field back into a typed value.
///
/// Built-in types go through [`coerce`]. Behavior fields are parsed as JSON;
/// text that is not valid JSON is kept as a plain string.
#[must_use]
pub fn decode_stored(property: &PropertyDef, stored: &str) -> Value {
    match &property.kind {
        PropertyType::Builtin(ty) => coerce(*ty, &Value::String(stored.to_string())),
        PropertyType::Behavior(_) => serde_json::from_str(stored)
            .unwrap_or_else(|_| Value::String(stored.to_string())),
    }
}

/// The score of a coerced numeric value, for scored indexes.
#[must_use]
pub fn score_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn to_plain_string(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    }
}

fn truthy(raw: &Value) -> bool {
    match raw {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty() && s != "false",
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn to_integer(raw: &Value) -> i64 {
    match raw {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::String(s) => parse_int_prefix(s).unwrap_or(0),
        _ => 0,
    }
}

fn to_float(raw: &Value) -> f64 {
    match raw {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()).unwrap_or(0.0),
        Value::String(s) => parse_float_prefix(s).unwrap_or(0.0),
        _ => 0.0,
    }
}

fn to_timestamp(raw: &Value) -> i64 {
    match raw {
        Value::Number(_) => to_integer(raw),
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(millis) = trimmed.parse::<i64>() {
                millis
            } else if let Some(f) = trimmed.parse::<f64>().ok().filter(|f| f.is_finite()) {
                f.trunc() as i64
            } else {
                parse_timestamp_millis(trimmed).unwrap_or(0)
            }
        }
        _ => 0,
    }
}

fn to_json_text(raw: &Value) -> String {
    match raw {
        Value::String(s) if serde_json::from_str::<Value>(s).is_ok() => s.clone(),
        other => other.to_string(),
    }
}

/// Leading-integer parse: optional sign then digits, ignoring any tail.
fn parse_int_prefix(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == digits_start {
        return None;
    }
    s[..end].parse::<i64>().ok()
}

/// Leading-float parse: the longest prefix that reads as a decimal number.
fn parse_float_prefix(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let mut digits = 0;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
        digits += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
            digits += 1;
        }
    }
    if digits == 0 {
        return None;
    }
    // Exponent only counts when followed by at least one digit.
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }
    s[..end].parse::<f64>().ok().filter(|f| f.is_finite())
}
