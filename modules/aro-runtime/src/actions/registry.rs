use std::collections::HashMap;
use std::sync::Arc;

use tracing::error;

use super::{
    AcceptAction, Action, ActionRole, CreateAction, EmitAction, ExtractAction, KeepaliveAction,
    LogAction, PublishAction, RetrieveAction, ReturnAction, StartAction, StopAction, StoreAction,
    ThrowAction, UpdateAction, ValidateAction,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("verb '{verb}' is already registered as {existing}")]
    DuplicateVerb { verb: String, existing: ActionRole },

    #[error("action declares no verbs")]
    NoVerbs,
}

/// Verb → action lookup.
#[derive(Default, Clone)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in action.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for action in builtin_actions() {
            let registered = registry.register(action);
            debug_assert!(registered.is_ok(), "built-in action collides: {registered:?}");
            if let Err(e) = registered {
                error!(error = %e, "Built-in action not registered");
            }
        }
        registry
    }

    /// Register every verb of `action`. Nothing is registered if any verb
    /// is already taken.
    pub fn register(&mut self, action: Arc<dyn Action>) -> Result<(), RegistryError> {
        let verbs: Vec<String> = action.verbs().iter().map(|v| v.to_lowercase()).collect();
        if verbs.is_empty() {
            return Err(RegistryError::NoVerbs);
        }
        if let Some((verb, existing)) = verbs
            .iter()
            .find_map(|v| self.actions.get(v).map(|a| (v.clone(), a.role())))
        {
            return Err(RegistryError::DuplicateVerb { verb, existing });
        }
        for verb in verbs {
            self.actions.insert(verb, action.clone());
        }
        Ok(())
    }

    pub fn get(&self, verb: &str) -> Option<&Arc<dyn Action>> {
        self.actions.get(&verb.to_lowercase())
    }

    pub fn role_of(&self, verb: &str) -> Option<ActionRole> {
        self.get(verb).map(|a| a.role())
    }

    /// Sorted verbs registered under `role`.
    pub fn verbs_for(&self, role: ActionRole) -> Vec<String> {
        let mut verbs: Vec<String> = self
            .actions
            .iter()
            .filter(|(_, a)| a.role() == role)
            .map(|(v, _)| v.clone())
            .collect();
        verbs.sort();
        verbs
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

fn builtin_actions() -> Vec<Arc<dyn Action>> {
    vec![
        Arc::new(ExtractAction),
        Arc::new(RetrieveAction),
        Arc::new(CreateAction),
        Arc::new(ValidateAction),
        Arc::new(UpdateAction),
        Arc::new(AcceptAction),
        Arc::new(ReturnAction),
        Arc::new(ThrowAction),
        Arc::new(LogAction),
        Arc::new(EmitAction),
        Arc::new(PublishAction),
        Arc::new(StoreAction),
        Arc::new(StartAction),
        Arc::new(StopAction),
        Arc::new(KeepaliveAction),
    ]
}
