use async_trait::async_trait;
use serde::Serialize;

use super::{verbs, Action, ActionError, ActionOutcome, ActionRole};
use crate::ast::{ObjectDescriptor, ResultDescriptor};
use crate::context::RuntimeContext;
use crate::value::Value;

/// The value a feature set terminates with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    /// Status label as written, e.g. `OK` or `Created`.
    pub status: String,
    pub code: u16,
    pub body: Value,
}

impl Response {
    pub fn new(status: impl Into<String>, body: Value) -> Self {
        let status = status.into();
        let code = status_code(&status).unwrap_or(200);
        Self { status, code, body }
    }

    pub fn ok(body: Value) -> Self {
        Self::new("OK", body)
    }
}

/// HTTP status for a status label. Labels are matched ignoring case,
/// dashes and underscores.
pub fn status_code(label: &str) -> Option<u16> {
    let key: String = label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    let code = match key.as_str() {
        "ok" | "success" => 200,
        "created" => 201,
        "accepted" => 202,
        "nocontent" => 204,
        "badrequest" | "invalid" => 400,
        "unauthorized" => 401,
        "forbidden" => 403,
        "notfound" => 404,
        "conflict" => 409,
        "unprocessable" | "unprocessableentity" => 422,
        "error" | "servererror" | "internalerror" | "internalservererror" => 500,
        _ => return None,
    };
    Some(code)
}

/// `Return an <OK: status> with <user>`
pub struct ReturnAction;

#[async_trait]
impl Action for ReturnAction {
    fn role(&self) -> ActionRole {
        ActionRole::Response
    }

    fn verbs(&self) -> Vec<String> {
        verbs(&["return", "respond"])
    }

    async fn execute(
        &self,
        ctx: &RuntimeContext,
        result: &ResultDescriptor,
        object: &ObjectDescriptor,
    ) -> Result<ActionOutcome, ActionError> {
        let body = ctx.resolve_object(object)?;
        Ok(ActionOutcome::Respond(Response::new(result.name.as_str(), body)))
    }
}

/// `Throw a <NotFound: error> for the <user>`
pub struct ThrowAction;

#[async_trait]
impl Action for ThrowAction {
    fn role(&self) -> ActionRole {
        ActionRole::Response
    }

    fn verbs(&self) -> Vec<String> {
        verbs(&["throw"])
    }

    async fn execute(
        &self,
        ctx: &RuntimeContext,
        result: &ResultDescriptor,
        object: &ObjectDescriptor,
    ) -> Result<ActionOutcome, ActionError> {
        Err(ActionError::Thrown {
            reason: result.name.clone(),
            value: ctx.resolve_object(object)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_labels_map_to_codes() {
        assert_eq!(status_code("OK"), Some(200));
        assert_eq!(status_code("Created"), Some(201));
        assert_eq!(status_code("not-found"), Some(404));
        assert_eq!(status_code("NotFound"), Some(404));
        assert_eq!(status_code("greeting"), None);
        assert_eq!(Response::new("greeting", Value::Null).code, 200);
    }
}
