use async_trait::async_trait;
use tracing::info;

use super::{verbs, Action, ActionError, ActionOutcome, ActionRole};
use crate::ast::{ObjectDescriptor, Preposition, ResultDescriptor};
use crate::context::RuntimeContext;
use crate::events::{Emission, Event, RepositoryChange};

/// `Log <console> with "message"`: the result names the channel, the object
/// is the message.
pub struct LogAction;

#[async_trait]
impl Action for LogAction {
    fn role(&self) -> ActionRole {
        ActionRole::Export
    }

    fn verbs(&self) -> Vec<String> {
        verbs(&["log", "print"])
    }

    async fn execute(
        &self,
        ctx: &RuntimeContext,
        result: &ResultDescriptor,
        object: &ObjectDescriptor,
    ) -> Result<ActionOutcome, ActionError> {
        let message = ctx.resolve_object(object)?;
        info!(
            target: "aro::log",
            channel = %result.name,
            feature_set = ctx.name(),
            "{message}"
        );
        Ok(ActionOutcome::Continue)
    }
}

/// `Emit a <UserCreated: event> with <user>`: queues a domain event that is
/// published once the feature set finishes.
pub struct EmitAction;

#[async_trait]
impl Action for EmitAction {
    fn role(&self) -> ActionRole {
        ActionRole::Export
    }

    fn verbs(&self) -> Vec<String> {
        verbs(&["emit", "raise"])
    }

    async fn execute(
        &self,
        ctx: &RuntimeContext,
        result: &ResultDescriptor,
        object: &ObjectDescriptor,
    ) -> Result<ActionOutcome, ActionError> {
        let payload = ctx.resolve_object(object)?;
        ctx.emit(Emission::Event(Event::new(result.name.as_str(), payload)));
        Ok(ActionOutcome::Continue)
    }
}

/// `Publish as <app-config> with <config>`: makes a value visible to every
/// feature set through the symbol table.
pub struct PublishAction;

#[async_trait]
impl Action for PublishAction {
    fn role(&self) -> ActionRole {
        ActionRole::Export
    }

    fn verbs(&self) -> Vec<String> {
        verbs(&["publish", "export"])
    }

    async fn execute(
        &self,
        ctx: &RuntimeContext,
        result: &ResultDescriptor,
        object: &ObjectDescriptor,
    ) -> Result<ActionOutcome, ActionError> {
        let value = ctx.resolve_object(object)?;
        ctx.publish(result.name.as_str(), value.clone());
        Ok(ActionOutcome::Bind(value))
    }
}

/// `Store the <user> into the <user-repository>`
///
/// Stores the result binding, rebinds it with any assigned id, and emits a
/// repository-change notification.
pub struct StoreAction;

#[async_trait]
impl Action for StoreAction {
    fn role(&self) -> ActionRole {
        ActionRole::Export
    }

    fn verbs(&self) -> Vec<String> {
        verbs(&["store", "save", "persist"])
    }

    fn prepositions(&self) -> &[Preposition] {
        &[Preposition::Into, Preposition::To]
    }

    async fn execute(
        &self,
        ctx: &RuntimeContext,
        result: &ResultDescriptor,
        object: &ObjectDescriptor,
    ) -> Result<ActionOutcome, ActionError> {
        let repository = object
            .source_name()
            .ok_or(ActionError::UnnamedObject("store"))?;
        let value = ctx.resolve(&result.name).unwrap_or_default();

        let receipt = ctx
            .services()
            .repositories
            .store(repository, value)
            .await?;

        ctx.emit(Emission::RepositoryChange(
            RepositoryChange::new(repository, receipt.change, receipt.entity_id.as_str())
                .with_values(Some(receipt.stored.clone()), receipt.previous),
        ));
        Ok(ActionOutcome::Bind(receipt.stored))
    }
}
