use async_trait::async_trait;

use super::{verbs, Action, ActionError, ActionOutcome, ActionRole};
use crate::ast::{ObjectDescriptor, ResultDescriptor};
use crate::context::RuntimeContext;
use crate::value::Value;

/// `Extract the <id> from the <pathParameters: id>`
pub struct ExtractAction;

#[async_trait]
impl Action for ExtractAction {
    fn role(&self) -> ActionRole {
        ActionRole::Request
    }

    fn verbs(&self) -> Vec<String> {
        verbs(&["extract", "parse"])
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

/// `Retrieve the <user> from the <user-repository> where <filter>`
///
/// The object names the repository. With a `where` map and no result
/// specifier, binds the first match (or null); otherwise binds the list.
pub struct RetrieveAction;

#[async_trait]
impl Action for RetrieveAction {
    fn role(&self) -> ActionRole {
        ActionRole::Request
    }

    fn verbs(&self) -> Vec<String> {
        verbs(&["retrieve"])
    }

    async fn execute(
        &self,
        ctx: &RuntimeContext,
        result: &ResultDescriptor,
        object: &ObjectDescriptor,
    ) -> Result<ActionOutcome, ActionError> {
        let repository = object
            .source_name()
            .ok_or(ActionError::UnnamedObject("retrieve"))?;
        let filter = match &object.filter {
            Some(expr) => Some(ctx.evaluate(expr)?),
            None => None,
        };

        let found = ctx
            .services()
            .repositories
            .retrieve(repository, filter.as_ref())
            .await?;

        let value = match (&filter, result.specifier.is_none()) {
            (Some(_), true) => found
                .as_list()
                .and_then(|items| items.first().cloned())
                .unwrap_or(Value::Null),
            _ => found,
        };
        Ok(ActionOutcome::Bind(value))
    }
}
