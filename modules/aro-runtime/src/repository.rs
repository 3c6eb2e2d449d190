//! Repository boundary.
//!
//! Persistence semantics live outside the runtime. Actions talk to a
//! [`RepositoryProvider`]; [`InMemoryRepositories`] backs tests and local runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::events::ChangeKind;
use crate::value::Value;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("repository '{0}' rejected the value: {1}")]
    Rejected(String, String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// What a `store` call changed.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreReceipt {
    pub entity_id: String,
    pub change: ChangeKind,
    pub stored: Value,
    pub previous: Option<Value>,
}

#[async_trait]
pub trait RepositoryProvider: Send + Sync {
    /// Return every entity whose fields equal the fields of `filter`
    /// (a map). No filter returns the whole repository.
    async fn retrieve(&self, repository: &str, filter: Option<&Value>)
        -> Result<Value, RepositoryError>;

    /// Insert or replace an entity, keyed by its `id` field.
    async fn store(&self, repository: &str, value: Value) -> Result<StoreReceipt, RepositoryError>;
}

/// In-memory repositories keyed by name. Thread-safe.
#[derive(Default)]
pub struct InMemoryRepositories {
    data: Mutex<HashMap<String, Vec<Value>>>,
}

impl InMemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a repository's contents (for test assertions).
    pub fn contents(&self, repository: &str) -> Vec<Value> {
        self.data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(repository)
            .cloned()
            .unwrap_or_default()
    }
}

fn entity_id(value: &Value) -> Option<String> {
    value.field("id").filter(|v| !v.is_null()).map(Value::to_display_string)
}

fn matches_filter(entity: &Value, filter: &Value) -> bool {
    match filter.as_map() {
        Some(fields) => fields
            .iter()
            .all(|(k, v)| entity.field(k).is_some_and(|actual| actual.loose_eq(v))),
        None => true,
    }
}

#[async_trait]
impl RepositoryProvider for InMemoryRepositories {
    async fn retrieve(
        &self,
        repository: &str,
        filter: Option<&Value>,
    ) -> Result<Value, RepositoryError> {
        let data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        let entities = data.get(repository).map(Vec::as_slice).unwrap_or(&[]);
        let found = entities
            .iter()
            .filter(|e| filter.map_or(true, |f| matches_filter(e, f)))
            .cloned()
            .collect();
        Ok(Value::List(found))
    }

    async fn store(&self, repository: &str, value: Value) -> Result<StoreReceipt, RepositoryError> {
        let mut fields = match value {
            Value::Map(fields) => fields,
            other => {
                return Err(RepositoryError::Rejected(
                    repository.to_string(),
                    format!("expected a map, got {}", other.type_name()),
                ))
            }
        };
        let id = match entity_id(&Value::Map(fields.clone())) {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4().to_string();
                fields.insert("id".to_string(), Value::String(id.clone()));
                id
            }
        };
        let stored = Value::Map(fields);

        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        let entities = data.entry(repository.to_string()).or_default();
        let existing = entities
            .iter()
            .position(|e| entity_id(e).as_deref() == Some(id.as_str()));

        let (change, previous) = match existing {
            Some(pos) => {
                let previous = std::mem::replace(&mut entities[pos], stored.clone());
                (ChangeKind::Updated, Some(previous))
            }
            None => {
                entities.push(stored.clone());
                (ChangeKind::Created, None)
            }
        };

        Ok(StoreReceipt {
            entity_id: id,
            change,
            stored,
            previous,
        })
    }
}
