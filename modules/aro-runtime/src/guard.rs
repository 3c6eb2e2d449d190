//! State guards: declarative payload filters for event handlers.
//!
//! ```text
//! guards := group (";" group)*
//! group  := path ":" value ("," value)*
//! path   := field ("." field)*
//! ```
//!
//! Groups are ANDed, values within a group are ORed. Comparison is
//! case-insensitive on the string form of the payload value. A missing field
//! anywhere along the path fails that group.

use std::fmt;
use std::str::FromStr;

use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardParseError {
    #[error("guard group '{0}' is missing ':'")]
    MissingColon(String),

    #[error("guard group '{0}' has an empty field path")]
    EmptyPath(String),

    #[error("guard group '{0}' has an empty field segment")]
    EmptySegment(String),

    #[error("guard group '{0}' lists no values")]
    NoValues(String),
}

/// One `path:value,value` group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateGuard {
    pub path: Vec<String>,
    /// Accepted values, already case-folded.
    pub values: Vec<String>,
}

impl StateGuard {
    pub fn new<S: AsRef<str>>(path: &str, values: &[S]) -> Self {
        Self {
            path: path.split('.').map(|s| s.trim().to_string()).collect(),
            values: values.iter().map(|v| fold(v.as_ref())).collect(),
        }
    }

    pub fn matches(&self, payload: &Value) -> bool {
        let Some(actual) = payload.path(&self.path) else {
            return false;
        };
        let actual = match actual {
            Value::Null | Value::List(_) | Value::Map(_) => return false,
            other => fold(&other.to_display_string()),
        };
        self.values.iter().any(|v| *v == actual)
    }
}

/// Ordered guards combined with AND. Empty means "always matches".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateGuardSet {
    guards: Vec<StateGuard>,
}

impl StateGuardSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn parse(expr: &str) -> Result<Self, GuardParseError> {
        let mut guards = Vec::new();
        for group in expr.split(';') {
            let group = group.trim();
            if group.is_empty() {
                continue;
            }
            let (path, values) = group
                .split_once(':')
                .ok_or_else(|| GuardParseError::MissingColon(group.to_string()))?;

            let path = path.trim();
            if path.is_empty() {
                return Err(GuardParseError::EmptyPath(group.to_string()));
            }
            let segments: Vec<String> = path.split('.').map(|s| s.trim().to_string()).collect();
            if segments.iter().any(String::is_empty) {
                return Err(GuardParseError::EmptySegment(group.to_string()));
            }

            let values: Vec<String> = values
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(fold)
                .collect();
            if values.is_empty() {
                return Err(GuardParseError::NoValues(group.to_string()));
            }

            guards.push(StateGuard {
                path: segments,
                values,
            });
        }
        Ok(Self { guards })
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    pub fn guards(&self) -> &[StateGuard] {
        &self.guards
    }

    pub fn matches(&self, payload: &Value) -> bool {
        self.guards.iter().all(|g| g.matches(payload))
    }
}

impl FromStr for StateGuardSet {
    type Err = GuardParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for StateGuardSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let groups: Vec<String> = self
            .guards
            .iter()
            .map(|g| format!("{}:{}", g.path.join("."), g.values.join(",")))
            .collect();
        f.write_str(&groups.join(";"))
    }
}

fn fold(s: &str) -> String {
    s.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(j: serde_json::Value) -> Value {
        Value::from(j)
    }

    #[test]
    fn or_within_a_group_is_case_insensitive() {
        let set = StateGuardSet::parse("status: paid,shipped").unwrap();
        assert!(set.matches(&payload(json!({"status": "PAID"}))));
        assert!(set.matches(&payload(json!({"status": "shipped"}))));
        assert!(!set.matches(&payload(json!({"status": "pending"}))));
    }

    #[test]
    fn and_across_groups() {
        let set = StateGuardSet::parse("status:a,b; tier:c,d").unwrap();
        assert!(set.matches(&payload(json!({"status": "a", "tier": "d"}))));
        assert!(!set.matches(&payload(json!({"status": "a", "tier": "x"}))));
        assert!(!set.matches(&payload(json!({"status": "x", "tier": "c"}))));
        assert!(!set.matches(&payload(json!({"status": "b"}))));
    }

    #[test]
    fn nested_paths_and_missing_segments() {
        let set = StateGuardSet::parse("order.customer.tier:gold").unwrap();
        assert!(set.matches(&payload(json!({"order": {"customer": {"tier": "Gold"}}}))));
        assert!(!set.matches(&payload(json!({"order": {"customer": {}}}))));
        assert!(!set.matches(&payload(json!({"order": "flat"}))));
    }

    #[test]
    fn scalar_values_compare_by_string_form() {
        let set = StateGuardSet::parse("priority:1;urgent:true").unwrap();
        assert!(set.matches(&payload(json!({"priority": 1, "urgent": true}))));
    }

    #[test]
    fn empty_set_always_matches() {
        let set = StateGuardSet::parse("  ").unwrap();
        assert!(set.is_empty());
        assert!(set.matches(&payload(json!({}))));
    }

    #[test]
    fn malformed_expressions_are_rejected() {
        assert_eq!(
            StateGuardSet::parse("status"),
            Err(GuardParseError::MissingColon("status".into()))
        );
        assert!(matches!(StateGuardSet::parse(":x"), Err(GuardParseError::EmptyPath(_))));
        assert!(matches!(StateGuardSet::parse("a..b:x"), Err(GuardParseError::EmptySegment(_))));
        assert!(matches!(StateGuardSet::parse("a: ,"), Err(GuardParseError::NoValues(_))));
    }

    #[test]
    fn display_round_trips_the_normalized_form() {
        let set: StateGuardSet = "Status: PAID, Shipped ; tier:gold".parse().unwrap();
        assert_eq!(set.to_string(), "Status:paid,shipped;tier:gold");
    }
}
