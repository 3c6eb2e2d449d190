//! Built-in qualifiers.
//!
//! A qualifier is the word after the colon in a result descriptor
//! (`<total: sum>`). Known names transform the produced value before the
//! specifier is applied; anything else is treated as a plain annotation and
//! leaves the value untouched.

use std::cmp::Ordering;

use crate::value::Value;

/// Apply the named qualifier, or return `value` as-is when the name is not a
/// known transform.
pub fn apply_qualifier(name: &str, value: Value) -> Value {
    match name.trim().to_ascii_lowercase().as_str() {
        "sort" | "sorted" => map_list(value, |mut items| {
            items.sort_by(|a, b| a.compare(b).unwrap_or(Ordering::Equal));
            Value::List(items)
        }),
        "reverse" | "reversed" => match value {
            Value::String(s) => Value::String(s.chars().rev().collect()),
            other => map_list(other, |mut items| {
                items.reverse();
                Value::List(items)
            }),
        },
        "unique" | "distinct" => map_list(value, |items| {
            let mut out: Vec<Value> = Vec::with_capacity(items.len());
            for item in items {
                if !out.iter().any(|seen| seen.loose_eq(&item)) {
                    out.push(item);
                }
            }
            Value::List(out)
        }),
        "sum" => map_list(value, |items| sum(&items)),
        "avg" | "average" => map_list(value, |items| {
            let nums: Vec<f64> = items.iter().filter_map(Value::as_f64).collect();
            if nums.is_empty() {
                Value::Null
            } else {
                Value::Float(nums.iter().sum::<f64>() / nums.len() as f64)
            }
        }),
        "min" => map_list(value, |items| extreme(items, Ordering::Less)),
        "max" => map_list(value, |items| extreme(items, Ordering::Greater)),
        "count" | "length" => match &value {
            Value::List(items) => Value::Int(items.len() as i64),
            Value::Map(map) => Value::Int(map.len() as i64),
            Value::String(s) => Value::Int(s.chars().count() as i64),
            Value::Null => Value::Int(0),
            _ => Value::Int(1),
        },
        "uppercase" => map_string(value, |s| s.to_uppercase()),
        "lowercase" => map_string(value, |s| s.to_lowercase()),
        "trim" => map_string(value, |s| s.trim().to_string()),
        _ => value,
    }
}

fn map_list(value: Value, f: impl FnOnce(Vec<Value>) -> Value) -> Value {
    match value {
        Value::List(items) => f(items),
        other => other,
    }
}

fn map_string(value: Value, f: impl FnOnce(&str) -> String) -> Value {
    match value {
        Value::String(s) => Value::String(f(&s)),
        other => other,
    }
}

fn sum(items: &[Value]) -> Value {
    let ints: Option<Vec<i64>> = items
        .iter()
        .map(|v| match v {
            Value::Int(i) => Some(*i),
            _ => None,
        })
        .collect();
    if let Some(ints) = ints {
        Value::Int(ints.into_iter().fold(0i64, i64::wrapping_add))
    } else {
        Value::Float(items.iter().filter_map(Value::as_f64).sum())
    }
}

fn extreme(items: Vec<Value>, keep: Ordering) -> Value {
    items
        .into_iter()
        .reduce(|best, candidate| match candidate.compare(&best) {
            Some(ord) if ord == keep => candidate,
            _ => best,
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v(j: serde_json::Value) -> Value {
        Value::from(j)
    }

    #[test]
    fn numeric_aggregates() {
        assert_eq!(apply_qualifier("sum", v(json!([1, 2, 3]))), Value::Int(6));
        assert_eq!(apply_qualifier("sum", v(json!([1, 2.5]))), Value::Float(3.5));
        assert_eq!(apply_qualifier("avg", v(json!([2, 4]))), Value::Float(3.0));
        assert_eq!(apply_qualifier("min", v(json!([5, 1, 3]))), Value::Int(1));
        assert_eq!(apply_qualifier("max", v(json!([5, 1, 3]))), Value::Int(5));
        assert_eq!(apply_qualifier("max", v(json!([]))), Value::Null);
    }

    #[test]
    fn collection_reshaping() {
        assert_eq!(apply_qualifier("sort", v(json!([3, 1, 2]))), v(json!([1, 2, 3])));
        assert_eq!(apply_qualifier("unique", v(json!([1, 1, 2, 1]))), v(json!([1, 2])));
        assert_eq!(apply_qualifier("reverse", v(json!("abc"))), v(json!("cba")));
        assert_eq!(apply_qualifier("count", v(json!([1, 1]))), Value::Int(2));
    }

    #[test]
    fn unknown_qualifier_is_an_annotation() {
        assert_eq!(apply_qualifier("status", v(json!("x"))), v(json!("x")));
        assert_eq!(apply_qualifier("uppercase", Value::Int(3)), Value::Int(3));
    }
}
