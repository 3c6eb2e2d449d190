//! Statement execution.
//!
//! A feature set runs top to bottom in one context. A RESPONSE-role action
//! that actually runs terminates the feature set; nothing after it executes,
//! including statements of enclosing loops and match arms. Loop iterations
//! and match arms run in child contexts, so their bindings never leak out.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tracing::debug;

use crate::actions::{ActionError, ActionOutcome, ActionRegistry, ActionRole, Response};
use crate::ast::{
    AroStatement, FeatureSet, ForEachLoop, MatchStatement, Pattern, Preposition, ResultDescriptor,
    Statement,
};
use crate::context::{DeadlineExceeded, RuntimeContext};
use crate::eval::{compile_regex, EvalError};
use crate::qualifier::apply_qualifier;
use crate::value::Value;

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error("'{verb}' does not accept the preposition '{preposition}'")]
    UnsupportedPreposition {
        verb: String,
        preposition: Preposition,
    },

    #[error("{verb} <{result}>: {source}")]
    Action {
        verb: String,
        result: String,
        #[source]
        source: ActionError,
    },

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error("cannot iterate over {0}")]
    NotIterable(&'static str),

    #[error(transparent)]
    Deadline(#[from] DeadlineExceeded),
}

impl ExecutionError {
    /// The `throw` reason, if the feature set failed by throwing.
    pub fn thrown_reason(&self) -> Option<&str> {
        match self {
            ExecutionError::Action {
                source: ActionError::Thrown { reason, .. },
                ..
            } => Some(reason),
            _ => None,
        }
    }
}

/// Where a feature set ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Running,
    TerminatedSuccess,
    TerminatedError,
}

impl ExecutionState {
    pub fn of<T>(result: &Result<T, ExecutionError>) -> Self {
        match result {
            Ok(_) => ExecutionState::TerminatedSuccess,
            Err(_) => ExecutionState::TerminatedError,
        }
    }
}

enum Flow {
    Continue,
    Return(Response),
}

#[derive(Clone)]
pub struct FeatureSetExecutor {
    actions: Arc<ActionRegistry>,
}

impl FeatureSetExecutor {
    pub fn new(actions: Arc<ActionRegistry>) -> Self {
        Self { actions }
    }

    pub fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    /// Run every statement of `feature_set` in `ctx`. `Ok(None)` means the
    /// statements ran out without a response.
    pub async fn execute(
        &self,
        feature_set: &FeatureSet,
        ctx: &mut RuntimeContext,
    ) -> Result<Option<Response>, ExecutionError> {
        debug!(feature_set = %feature_set.name, "Executing feature set");
        let flow = self.run_block(&feature_set.statements, ctx).await?;
        Ok(match flow {
            Flow::Return(response) => Some(response),
            Flow::Continue => None,
        })
    }

    fn run_block<'a>(
        &'a self,
        statements: &'a [Statement],
        ctx: &'a mut RuntimeContext,
    ) -> BoxFuture<'a, Result<Flow, ExecutionError>> {
        async move {
            for statement in statements {
                ctx.check_deadline()?;
                let flow = match statement {
                    Statement::Aro(aro) => self.run_aro(aro, ctx).await?,
                    Statement::Match(m) => self.run_match(m, ctx).await?,
                    Statement::ForEach(l) => self.run_for_each(l, ctx).await?,
                };
                if let Flow::Return(response) = flow {
                    return Ok(Flow::Return(response));
                }
            }
            Ok(Flow::Continue)
        }
        .boxed()
    }

    async fn run_aro(
        &self,
        statement: &AroStatement,
        ctx: &mut RuntimeContext,
    ) -> Result<Flow, ExecutionError> {
        if let Some(guard) = &statement.guard {
            if !ctx.evaluate(guard)?.is_truthy() {
                return Ok(Flow::Continue);
            }
        }

        let verb = statement.action.as_str();
        let action = self
            .actions
            .get(verb)
            .cloned()
            .ok_or_else(|| ExecutionError::UnknownAction(verb.to_string()))?;

        let accepted = action.prepositions();
        if !accepted.is_empty() && !accepted.contains(&statement.object.preposition) {
            return Err(ExecutionError::UnsupportedPreposition {
                verb: verb.to_string(),
                preposition: statement.object.preposition,
            });
        }

        let result = &statement.result;
        let outcome = action
            .execute(ctx, result, &statement.object)
            .await
            .map_err(|source| ExecutionError::Action {
                verb: verb.to_string(),
                result: result.name.clone(),
                source,
            })?;
        let terminal = action.role() == ActionRole::Response;

        match outcome {
            ActionOutcome::Respond(response) => return Ok(Flow::Return(response)),
            ActionOutcome::Bind(value) => {
                let value = shape(result, value);
                if terminal {
                    return Ok(Flow::Return(Response::new(result.name.as_str(), value)));
                }
                ctx.bind(result.name.as_str(), value);
            }
            ActionOutcome::Assign(name, value) => ctx.bind(name, value),
            ActionOutcome::Continue if terminal => {
                return Ok(Flow::Return(Response::new(result.name.as_str(), Value::Null)));
            }
            ActionOutcome::Continue => {}
        }
        Ok(Flow::Continue)
    }

    async fn run_match(
        &self,
        statement: &MatchStatement,
        ctx: &mut RuntimeContext,
    ) -> Result<Flow, ExecutionError> {
        let subject = ctx.evaluate(&statement.subject)?;
        let scope_name = format!("{}/match", ctx.name());

        for case in &statement.cases {
            if !pattern_matches(&case.pattern, &subject)? {
                continue;
            }
            let mut scope = ctx.child(scope_name.as_str());
            if let Some(guard) = &case.guard {
                if !scope.evaluate(guard)?.is_truthy() {
                    continue;
                }
            }
            return self.run_block(&case.body, &mut scope).await;
        }

        match &statement.otherwise {
            Some(body) => {
                let mut scope = ctx.child(scope_name);
                self.run_block(body, &mut scope).await
            }
            None => Ok(Flow::Continue),
        }
    }

    async fn run_for_each(
        &self,
        statement: &ForEachLoop,
        ctx: &mut RuntimeContext,
    ) -> Result<Flow, ExecutionError> {
        let items = match ctx.evaluate(&statement.collection)? {
            Value::List(items) => items,
            Value::Null => Vec::new(),
            other => return Err(ExecutionError::NotIterable(other.type_name())),
        };

        let base = ctx.name().to_string();
        for (i, item) in items.into_iter().enumerate() {
            ctx.check_deadline()?;
            let mut scope = ctx.child(format!("{base}[{i}]"));
            scope.bind(statement.item.as_str(), item);
            if let Some(index) = &statement.index {
                scope.bind(index.as_str(), Value::Int(i as i64));
            }
            if let Some(filter) = &statement.filter {
                if !scope.evaluate(filter)?.is_truthy() {
                    continue;
                }
            }
            if let Flow::Return(response) = self.run_block(&statement.body, &mut scope).await? {
                return Ok(Flow::Return(response));
            }
        }
        Ok(Flow::Continue)
    }
}

/// Qualifier first, then specifier.
fn shape(result: &ResultDescriptor, value: Value) -> Value {
    let value = match &result.qualifier {
        Some(qualifier) => apply_qualifier(qualifier, value),
        None => value,
    };
    if result.specifier.is_none() {
        value
    } else {
        result.specifier.apply(&value)
    }
}

fn pattern_matches(pattern: &Pattern, subject: &Value) -> Result<bool, EvalError> {
    Ok(match pattern {
        Pattern::Literal(expected) => expected.loose_eq(subject),
        Pattern::Range { low, high } => subject
            .as_f64()
            .map(|n| *low <= n && n <= *high)
            .unwrap_or(false),
        Pattern::Regex { pattern } => {
            !subject.is_null() && compile_regex(pattern)?.is_match(&subject.to_display_string())
        }
    })
}
