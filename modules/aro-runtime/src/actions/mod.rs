//! Actions: the verbs of ARO statements.
//!
//! Every verb is registered under exactly one [`ActionRole`]. An action sees
//! the context it runs in plus the statement's result and object descriptors,
//! and reports what should happen next through an [`ActionOutcome`]. Actions
//! never write bindings themselves; the executor applies the outcome.

mod export;
mod own;
mod registry;
mod request;
mod response;
mod server;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ast::{ObjectDescriptor, Preposition, ResultDescriptor};
use crate::context::{DeadlineExceeded, RuntimeContext};
use crate::eval::EvalError;
use crate::repository::RepositoryError;
use crate::value::Value;

pub use export::{EmitAction, LogAction, PublishAction, StoreAction};
pub use own::{AcceptAction, CreateAction, UpdateAction, ValidateAction};
pub use registry::{ActionRegistry, RegistryError};
pub use request::{ExtractAction, RetrieveAction};
pub use response::{status_code, Response, ReturnAction, ThrowAction};
pub use server::{KeepaliveAction, StartAction, StopAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionRole {
    /// Read from a source into a new binding.
    Request,
    /// Transform already-bound values.
    Own,
    /// Terminate the feature set.
    Response,
    /// External side effect without terminating.
    Export,
    /// Manage listeners and long-lived resources.
    Server,
}

impl fmt::Display for ActionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ActionRole::Request => "REQUEST",
            ActionRole::Own => "OWN",
            ActionRole::Response => "RESPONSE",
            ActionRole::Export => "EXPORT",
            ActionRole::Server => "SERVER",
        })
    }
}

/// What the executor does after an action returns.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// Bind to the statement's result, after qualifier and specifier.
    Bind(Value),
    /// Bind to an explicit name in the current context.
    Assign(String, Value),
    /// Nothing to bind.
    Continue,
    /// Terminate the feature set with this response.
    Respond(Response),
}

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error("{reason}: {value}")]
    Thrown { reason: String, value: Value },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{action} expected {expected}, got {actual}")]
    WrongType {
        action: &'static str,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("cannot transition '{field}' from '{expected}': current state is '{actual}'")]
    InvalidTransition {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("{0} needs a named object")]
    UnnamedObject(&'static str),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Deadline(#[from] DeadlineExceeded),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// An executable verb. Implement this to extend the language.
#[async_trait]
pub trait Action: Send + Sync {
    fn role(&self) -> ActionRole;

    /// Verbs this action answers to. Matched case-insensitively.
    fn verbs(&self) -> Vec<String>;

    /// Accepted prepositions. Empty accepts any.
    fn prepositions(&self) -> &[Preposition] {
        &[]
    }

    async fn execute(
        &self,
        ctx: &RuntimeContext,
        result: &ResultDescriptor,
        object: &ObjectDescriptor,
    ) -> Result<ActionOutcome, ActionError>;
}

fn verbs(names: &[&str]) -> Vec<String> {
    names.iter().map(|v| v.to_string()).collect()
}
