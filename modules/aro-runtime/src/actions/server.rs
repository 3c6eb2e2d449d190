use async_trait::async_trait;
use tracing::info;

use super::{verbs, Action, ActionError, ActionOutcome, ActionRole};
use crate::ast::{ObjectDescriptor, ResultDescriptor};
use crate::context::{DeadlineExceeded, RuntimeContext};
use crate::value::Value;

/// `Start the <http-server> with <contract>`. Marks the named resource as
/// running; the host decides what actually listens.
pub struct StartAction;

#[async_trait]
impl Action for StartAction {
    fn role(&self) -> ActionRole {
        ActionRole::Server
    }

    fn verbs(&self) -> Vec<String> {
        verbs(&["start"])
    }

    async fn execute(
        &self,
        ctx: &RuntimeContext,
        result: &ResultDescriptor,
        _object: &ObjectDescriptor,
    ) -> Result<ActionOutcome, ActionError> {
        let started = ctx.services().lifecycle.start_server(&result.name);
        info!(server = %result.name, started, "Server started");
        Ok(ActionOutcome::Bind(Value::Bool(started)))
    }
}

pub struct StopAction;

#[async_trait]
impl Action for StopAction {
    fn role(&self) -> ActionRole {
        ActionRole::Server
    }

    fn verbs(&self) -> Vec<String> {
        verbs(&["stop"])
    }

    async fn execute(
        &self,
        ctx: &RuntimeContext,
        result: &ResultDescriptor,
        _object: &ObjectDescriptor,
    ) -> Result<ActionOutcome, ActionError> {
        let stopped = ctx.services().lifecycle.stop_server(&result.name);
        info!(server = %result.name, stopped, "Server stopped");
        Ok(ActionOutcome::Bind(Value::Bool(stopped)))
    }
}

/// `Keepalive the <application> for the <events>`: suspends until shutdown
/// is signalled, or the context deadline passes.
pub struct KeepaliveAction;

#[async_trait]
impl Action for KeepaliveAction {
    fn role(&self) -> ActionRole {
        ActionRole::Server
    }

    fn verbs(&self) -> Vec<String> {
        verbs(&["keepalive", "wait"])
    }

    async fn execute(
        &self,
        ctx: &RuntimeContext,
        _result: &ResultDescriptor,
        _object: &ObjectDescriptor,
    ) -> Result<ActionOutcome, ActionError> {
        let lifecycle = &ctx.services().lifecycle;
        match ctx.deadline() {
            Some(deadline) => {
                tokio::time::timeout_at(deadline, lifecycle.wait_for_shutdown())
                    .await
                    .map_err(|_| DeadlineExceeded {
                        context: ctx.name().to_string(),
                    })?;
            }
            None => lifecycle.wait_for_shutdown().await,
        }
        Ok(ActionOutcome::Continue)
    }
}
