//! Result specifiers.
//!
//! A specifier reduces a collection to the value that gets bound. Numeric
//! indices count from the END of the list: `0` is the last element, `n-1` the
//! first. Nothing here fails; out-of-range access resolves to null.
//!
//! ```text
//! first      → element 0
//! last       → element n-1
//! k          → element n-1-k
//! a-b        → reverse indices a..=b, clamped, source order kept
//! i1,i2,...  → each reverse index resolved independently
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ResultSpecifier {
    #[default]
    None,
    First,
    Last,
    ReverseIndex(usize),
    Range(usize, usize),
    Pick(Vec<usize>),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid result specifier '{0}'")]
pub struct SpecifierParseError(pub String);

impl ResultSpecifier {
    pub fn is_none(&self) -> bool {
        matches!(self, ResultSpecifier::None)
    }

    /// Reduce `value` according to this specifier.
    ///
    /// `None` passes the value through unchanged. Every other specifier
    /// expects a list; applied to anything else it yields null.
    pub fn apply(&self, value: &Value) -> Value {
        if self.is_none() {
            return value.clone();
        }
        let Some(items) = value.as_list() else {
            return Value::Null;
        };
        match self {
            ResultSpecifier::None => value.clone(),
            ResultSpecifier::First => items.first().cloned().unwrap_or_default(),
            ResultSpecifier::Last => items.last().cloned().unwrap_or_default(),
            ResultSpecifier::ReverseIndex(k) => reverse_get(items, *k),
            ResultSpecifier::Range(a, b) => Value::List(reverse_range(items, *a, *b).to_vec()),
            ResultSpecifier::Pick(indices) => {
                Value::List(indices.iter().map(|k| reverse_get(items, *k)).collect())
            }
        }
    }
}

fn reverse_get(items: &[Value], k: usize) -> Value {
    match k.checked_add(1).and_then(|k1| items.len().checked_sub(k1)) {
        Some(pos) => items[pos].clone(),
        None => Value::Null,
    }
}

fn reverse_range(items: &[Value], a: usize, b: usize) -> &[Value] {
    let (a, b) = if a <= b { (a, b) } else { (b, a) };
    let n = items.len();
    if a >= n {
        return &[];
    }
    let b = b.min(n - 1);
    &items[n - 1 - b..=n - 1 - a]
}

impl FromStr for ResultSpecifier {
    type Err = SpecifierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let err = || SpecifierParseError(s.to_string());
        match text.to_ascii_lowercase().as_str() {
            "" => return Ok(ResultSpecifier::None),
            "first" => return Ok(ResultSpecifier::First),
            "last" => return Ok(ResultSpecifier::Last),
            _ => {}
        }

        if text.contains(',') {
            let indices = text
                .split(',')
                .map(|part| part.trim().parse::<usize>().map_err(|_| err()))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(ResultSpecifier::Pick(indices));
        }

        if let Some((a, b)) = text.split_once('-') {
            let a = a.trim().parse::<usize>().map_err(|_| err())?;
            let b = b.trim().parse::<usize>().map_err(|_| err())?;
            return Ok(ResultSpecifier::Range(a, b));
        }

        text.parse::<usize>()
            .map(ResultSpecifier::ReverseIndex)
            .map_err(|_| err())
    }
}

impl TryFrom<String> for ResultSpecifier {
    type Error = SpecifierParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ResultSpecifier> for String {
    fn from(spec: ResultSpecifier) -> Self {
        spec.to_string()
    }
}

impl fmt::Display for ResultSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultSpecifier::None => Ok(()),
            ResultSpecifier::First => f.write_str("first"),
            ResultSpecifier::Last => f.write_str("last"),
            ResultSpecifier::ReverseIndex(k) => write!(f, "{k}"),
            ResultSpecifier::Range(a, b) => write!(f, "{a}-{b}"),
            ResultSpecifier::Pick(indices) => {
                let parts: Vec<String> = indices.iter().map(|i| i.to_string()).collect();
                f.write_str(&parts.join(","))
            }
        }
    }
}
