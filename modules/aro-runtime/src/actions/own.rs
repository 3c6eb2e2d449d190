use std::collections::BTreeMap;

use async_trait::async_trait;

use super::{verbs, Action, ActionError, ActionOutcome, ActionRole};
use crate::ast::{Expression, ObjectDescriptor, Preposition, ResultDescriptor};
use crate::context::RuntimeContext;
use crate::events::{Emission, StateTransition};
use crate::value::Value;

/// `Create the <greeting> with "Hello"`, `Compute the <total: sum> from <prices>`
pub struct CreateAction;

#[async_trait]
impl Action for CreateAction {
    fn role(&self) -> ActionRole {
        ActionRole::Own
    }

    fn verbs(&self) -> Vec<String> {
        verbs(&["create", "compute", "transform"])
    }

    async fn execute(
        &self,
        ctx: &RuntimeContext,
        _result: &ResultDescriptor,
        object: &ObjectDescriptor,
    ) -> Result<ActionOutcome, ActionError> {
        Ok(ActionOutcome::Bind(ctx.resolve_object(object)?))
    }
}

/// `Validate the <input> against <condition>`; fails unless the object is
/// truthy.
pub struct ValidateAction;

#[async_trait]
impl Action for ValidateAction {
    fn role(&self) -> ActionRole {
        ActionRole::Own
    }

    fn verbs(&self) -> Vec<String> {
        verbs(&["validate"])
    }

    async fn execute(
        &self,
        ctx: &RuntimeContext,
        result: &ResultDescriptor,
        object: &ObjectDescriptor,
    ) -> Result<ActionOutcome, ActionError> {
        let verdict = ctx.resolve_object(object)?;
        if !verdict.is_truthy() {
            return Err(ActionError::Validation(result.to_string()));
        }
        Ok(ActionOutcome::Bind(verdict))
    }
}

/// `Update the <user> with { "name": ... }`: shallow merge into the
/// existing map binding.
pub struct UpdateAction;

#[async_trait]
impl Action for UpdateAction {
    fn role(&self) -> ActionRole {
        ActionRole::Own
    }

    fn verbs(&self) -> Vec<String> {
        verbs(&["update", "merge"])
    }

    async fn execute(
        &self,
        ctx: &RuntimeContext,
        result: &ResultDescriptor,
        object: &ObjectDescriptor,
    ) -> Result<ActionOutcome, ActionError> {
        let mut target = match ctx.resolve(&result.name) {
            Some(Value::Map(map)) => map,
            None | Some(Value::Null) => BTreeMap::new(),
            Some(other) => {
                return Err(ActionError::WrongType {
                    action: "update",
                    expected: "map",
                    actual: other.type_name(),
                })
            }
        };
        match ctx.resolve_object(object)? {
            Value::Map(patch) => target.extend(patch),
            other => {
                return Err(ActionError::WrongType {
                    action: "update",
                    expected: "map",
                    actual: other.type_name(),
                })
            }
        }
        Ok(ActionOutcome::Bind(Value::Map(target)))
    }
}

/// `Accept the <transition: draft_to_placed> on <order: status>`
///
/// Checks the entity field is in the `from` state, moves it to `to`, rebinds
/// the entity and emits a state-transition notification.
pub struct AcceptAction;

#[async_trait]
impl Action for AcceptAction {
    fn role(&self) -> ActionRole {
        ActionRole::Own
    }

    fn verbs(&self) -> Vec<String> {
        verbs(&["accept"])
    }

    fn prepositions(&self) -> &[Preposition] {
        &[Preposition::On, Preposition::For]
    }

    async fn execute(
        &self,
        ctx: &RuntimeContext,
        result: &ResultDescriptor,
        object: &ObjectDescriptor,
    ) -> Result<ActionOutcome, ActionError> {
        let label = result.qualifier.as_deref().unwrap_or(&result.name);
        let (from, to) = label
            .split_once("_to_")
            .ok_or_else(|| ActionError::Validation(format!("'{label}' is not <from>_to_<to>")))?;

        let Expression::Variable { name, path, .. } = &object.source else {
            return Err(ActionError::UnnamedObject("accept"));
        };
        let Some(field) = path.last() else {
            return Err(ActionError::Validation(format!(
                "accept needs a field on <{name}>"
            )));
        };

        let entity = ctx.resolve(name).unwrap_or_default();
        let current = entity
            .path(path)
            .map(Value::to_display_string)
            .unwrap_or_default();
        if !current.eq_ignore_ascii_case(from) {
            return Err(ActionError::InvalidTransition {
                field: field.clone(),
                expected: from.to_string(),
                actual: current,
            });
        }

        let updated = set_path(entity, path, Value::from(to))?;
        ctx.emit(Emission::StateTransition(StateTransition::new(
            field.as_str(),
            from,
            to,
            updated.clone(),
        )));
        Ok(ActionOutcome::Assign(name.clone(), updated))
    }
}

fn set_path(value: Value, path: &[String], new: Value) -> Result<Value, ActionError> {
    let Some((head, rest)) = path.split_first() else {
        return Ok(new);
    };
    match value {
        Value::Map(mut map) => {
            let child = map.remove(head).unwrap_or_default();
            map.insert(head.clone(), set_path(child, rest, new)?);
            Ok(Value::Map(map))
        }
        Value::Null => set_path(Value::Map(BTreeMap::new()), path, new),
        other => Err(ActionError::WrongType {
            action: "accept",
            expected: "map",
            actual: other.type_name(),
        }),
    }
}
