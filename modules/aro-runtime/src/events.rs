//! Event and notification types. Domain-agnostic.
//!
//! Handlers never mutate the event they receive; each gets its own copy of
//! the payload. Derived events reference their trigger through `caused_by`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value::Value;

/// Event type published when a handler fails.
pub const FEATURE_SET_FAILED: &str = "FeatureSetFailed";

/// A published domain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub event_type: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub caused_by: Option<Uuid>,
}

impl Event {
    /// Create a root event. Non-map payloads are wrapped as `{"value": ...}`.
    pub fn new(event_type: impl Into<String>, payload: impl Into<Value>) -> Self {
        let payload = match payload.into() {
            map @ Value::Map(_) => map,
            Value::Null => Value::map(Vec::<(String, Value)>::new()),
            other => Value::map([("value", other)]),
        };
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            payload,
            created_at: Utc::now(),
            caused_by: None,
        }
    }

    pub fn caused_by(mut self, parent: Uuid) -> Self {
        self.caused_by = Some(parent);
        self
    }

    pub fn is_failure(&self) -> bool {
        self.event_type == FEATURE_SET_FAILED
    }
}

/// How a repository entity changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeKind::Created => "created",
            ChangeKind::Updated => "updated",
            ChangeKind::Deleted => "deleted",
        })
    }
}

/// Notification that an entity in a repository changed.
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryChange {
    pub id: Uuid,
    pub repository: String,
    pub change: ChangeKind,
    pub entity_id: String,
    pub new_value: Option<Value>,
    pub old_value: Option<Value>,
}

impl RepositoryChange {
    pub fn new(
        repository: impl Into<String>,
        change: ChangeKind,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            repository: repository.into(),
            change,
            entity_id: entity_id.into(),
            new_value: None,
            old_value: None,
        }
    }

    pub fn with_values(mut self, new_value: Option<Value>, old_value: Option<Value>) -> Self {
        self.new_value = new_value;
        self.old_value = old_value;
        self
    }

    pub(crate) fn to_value(&self) -> Value {
        Value::map([
            ("repository", Value::from(self.repository.as_str())),
            ("changeType", Value::from(self.change.to_string())),
            ("entityId", Value::from(self.entity_id.as_str())),
            ("newValue", self.new_value.clone().unwrap_or_default()),
            ("oldValue", self.old_value.clone().unwrap_or_default()),
        ])
    }
}

/// Notification that an entity field moved from one state to another.
#[derive(Debug, Clone, PartialEq)]
pub struct StateTransition {
    pub id: Uuid,
    pub field: String,
    pub from: String,
    pub to: String,
    pub entity: Value,
}

impl StateTransition {
    pub fn new(
        field: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        entity: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            field: field.into(),
            from: from.into(),
            to: to.into(),
            entity,
        }
    }

    pub(crate) fn to_value(&self) -> Value {
        Value::map([
            ("field", Value::from(self.field.as_str())),
            ("fromState", Value::from(self.from.as_str())),
            ("toState", Value::from(self.to.as_str())),
            ("entity", self.entity.clone()),
        ])
    }
}

/// Something a feature set produced for the engine to dispatch after it
/// finishes.
#[derive(Debug, Clone, PartialEq)]
pub enum Emission {
    Event(Event),
    RepositoryChange(RepositoryChange),
    StateTransition(StateTransition),
}

impl Emission {
    pub fn id(&self) -> Uuid {
        match self {
            Emission::Event(e) => e.id,
            Emission::RepositoryChange(c) => c.id,
            Emission::StateTransition(t) => t.id,
        }
    }

    /// Trigger kind reported in failure events.
    pub fn kind(&self) -> &'static str {
        match self {
            Emission::Event(_) => "event",
            Emission::RepositoryChange(_) => "repository",
            Emission::StateTransition(_) => "stateTransition",
        }
    }

    /// Link a derived event to the emission that caused it. Events that
    /// already name a cause keep it.
    pub(crate) fn caused_by(self, parent: Uuid) -> Self {
        match self {
            Emission::Event(e) if e.caused_by.is_none() => Emission::Event(e.caused_by(parent)),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_builder_chain() {
        let parent = Event::new("OrderPlaced", Value::from(json!({"id": 1})));
        let child = Event::new("OrderShipped", Value::from(json!({"id": 1}))).caused_by(parent.id);
        assert_eq!(child.caused_by, Some(parent.id));
        assert_ne!(child.id, parent.id);
        assert!(parent.caused_by.is_none());
    }

    #[test]
    fn scalar_payloads_are_wrapped() {
        let e = Event::new("Tick", Value::Int(4));
        assert_eq!(e.payload.field("value"), Some(&Value::Int(4)));
        let empty = Event::new("Tick", Value::Null);
        assert_eq!(empty.payload, Value::Map(Default::default()));
    }

    #[test]
    fn event_is_serializable() {
        let e = Event::new("UserCreated", Value::from(json!({"name": "Ada"})));
        let text = serde_json::to_string(&e).unwrap();
        assert!(text.contains("UserCreated"));
        let back: Event = serde_json::from_str(&text).unwrap();
        assert_eq!(back.event_type, "UserCreated");
        assert_eq!(back.payload.field("name"), Some(&Value::from("Ada")));
    }
}
