//! The execution engine.
//!
//! Owns the application and its registries. Every trigger (HTTP operation,
//! domain event, repository change, state transition, lifecycle phase) runs
//! its feature set through one generic handler runner: spawn a context from
//! the application root, bind the trigger's payload, execute, collect what
//! the feature set emitted, and turn a failure into a `FeatureSetFailed`
//! event.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::actions::{ActionRegistry, Response};
use crate::activity::{ActivityBinding, ActivityError, APPLICATION_END, APPLICATION_START};
use crate::ast::{Application, FeatureSet};
use crate::bus::{DispatchReport, EmissionRouter, EventBus, Subscription, DEFAULT_MAX_CASCADE};
use crate::context::{ContextSnapshot, RuntimeContext};
use crate::events::{Emission, Event, RepositoryChange, StateTransition, FEATURE_SET_FAILED};
use crate::executor::{ExecutionError, ExecutionState, FeatureSetExecutor};
use crate::guard::GuardParseError;
use crate::journal::{EventJournal, NullJournal};
use crate::routing::{
    Contract, ContractError, HttpRequest, HttpResponse, OpenApiRouteRegistry, RouteMatch,
};
use crate::services::Services;
use crate::value::Value;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Deadline for one handler invocation. Lifecycle handlers never get one.
    pub request_timeout: Option<Duration>,
    /// Derivation levels followed when dispatching emissions.
    pub max_cascade: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            max_cascade: DEFAULT_MAX_CASCADE,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StartupProblem {
    #[error("feature set '{0}' is defined more than once")]
    DuplicateFeatureSet(String),

    #[error("feature set '{feature_set}': {source}")]
    Activity {
        feature_set: String,
        #[source]
        source: ActivityError,
    },

    #[error("no feature set handles operation '{0}'")]
    MissingHandler(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error("{} startup problem(s): {}", .0.len(), join(.0))]
    Invalid(Vec<StartupProblem>),
}

impl StartupError {
    /// Operation ids that have no feature set.
    pub fn missing_handlers(&self) -> Vec<&str> {
        match self {
            StartupError::Invalid(problems) => problems
                .iter()
                .filter_map(|p| match p {
                    StartupProblem::MissingHandler(id) => Some(id.as_str()),
                    _ => None,
                })
                .collect(),
            StartupError::Contract(_) => Vec::new(),
        }
    }
}

fn join(problems: &[StartupProblem]) -> String {
    problems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, thiserror::Error)]
pub enum SubscribeError {
    #[error("no feature set named '{0}'")]
    UnknownFeatureSet(String),

    #[error(transparent)]
    Guard(#[from] GuardParseError),
}

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

/// Something that starts a feature set.
pub trait Trigger: Send + Sync {
    /// Reported as `triggerKind` in failure events.
    fn kind(&self) -> &'static str;

    fn id(&self) -> Uuid;

    fn event_type(&self) -> Option<&str> {
        None
    }
}

impl Trigger for Event {
    fn kind(&self) -> &'static str {
        "event"
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn event_type(&self) -> Option<&str> {
        Some(&self.event_type)
    }
}

impl Trigger for RepositoryChange {
    fn kind(&self) -> &'static str {
        "repository"
    }

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Trigger for StateTransition {
    fn kind(&self) -> &'static str {
        "stateTransition"
    }

    fn id(&self) -> Uuid {
        self.id
    }
}

pub struct HttpTrigger<'a> {
    pub id: Uuid,
    pub request: &'a HttpRequest,
    pub matched: RouteMatch<'a>,
}

impl Trigger for HttpTrigger<'_> {
    fn kind(&self) -> &'static str {
        "http"
    }

    fn id(&self) -> Uuid {
        self.id
    }
}

/// A direct call through [`ExecutionEngine::invoke`].
pub struct InvocationTrigger {
    pub id: Uuid,
    pub input: Value,
}

impl Trigger for InvocationTrigger {
    fn kind(&self) -> &'static str {
        "invocation"
    }

    fn id(&self) -> Uuid {
        self.id
    }
}

pub struct LifecycleTrigger {
    pub id: Uuid,
    pub phase: &'static str,
}

impl LifecycleTrigger {
    fn new(phase: &'static str) -> Self {
        Self {
            id: Uuid::new_v4(),
            phase,
        }
    }
}

impl Trigger for LifecycleTrigger {
    fn kind(&self) -> &'static str {
        "lifecycle"
    }

    fn id(&self) -> Uuid {
        self.id
    }
}

// ---------------------------------------------------------------------------
// Payload binders
// ---------------------------------------------------------------------------

fn bind_event(ctx: &mut RuntimeContext, event: &Event) {
    ctx.bind("event", event.payload.clone());
    ctx.bind("event-type", Value::from(event.event_type.as_str()));
    ctx.bind("event-id", Value::from(event.id.to_string()));
}

fn bind_change(ctx: &mut RuntimeContext, change: &RepositoryChange) {
    let value = change.to_value();
    ctx.bind("change", value.clone());
    ctx.bind("event", value);
}

fn bind_transition(ctx: &mut RuntimeContext, transition: &StateTransition) {
    let value = transition.to_value();
    ctx.bind("transition", value.clone());
    ctx.bind("entity", transition.entity.clone());
    ctx.bind("event", value);
}

fn bind_request(ctx: &mut RuntimeContext, trigger: &HttpTrigger<'_>) {
    let strings = |map: &std::collections::BTreeMap<String, String>| {
        Value::map(map.iter().map(|(k, v)| (k.as_str(), Value::from(v.as_str()))))
    };
    let path_parameters = strings(&trigger.matched.params);
    let query_parameters = strings(&trigger.request.query);
    let headers = strings(&trigger.request.headers);
    let body = trigger.request.body_value();

    ctx.bind(
        "request",
        Value::map([
            ("method", Value::from(trigger.request.method.as_str())),
            ("path", Value::from(trigger.request.path.as_str())),
            ("operationId", Value::from(trigger.matched.operation_id)),
            ("pathParameters", path_parameters.clone()),
            ("queryParameters", query_parameters.clone()),
            ("headers", headers.clone()),
            ("body", body.clone()),
        ]),
    );
    ctx.bind("pathParameters", path_parameters);
    ctx.bind("queryParameters", query_parameters);
    ctx.bind("headers", headers);
    ctx.bind("body", body);
}

fn bind_input(ctx: &mut RuntimeContext, trigger: &InvocationTrigger) {
    ctx.bind("input", trigger.input.clone());
}

fn bind_lifecycle(ctx: &mut RuntimeContext, trigger: &LifecycleTrigger) {
    let name = ctx.name().to_string();
    ctx.bind(
        "application",
        Value::map([
            ("featureSet", Value::from(name)),
            ("phase", Value::from(trigger.phase)),
        ]),
    );
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Result of one feature-set invocation.
#[derive(Debug)]
pub struct HandlerRun {
    pub feature_set: String,
    pub result: Result<Option<Response>, ExecutionError>,
    /// Emissions produced, failure event included. Drained once the engine
    /// has dispatched them.
    pub emissions: Vec<Emission>,
}

impl HandlerRun {
    pub fn state(&self) -> ExecutionState {
        ExecutionState::of(&self.result)
    }
}

/// Shared dependencies for building an engine.
#[derive(TypedBuilder)]
pub struct EngineDeps {
    pub application: Application,
    #[builder(default)]
    pub contract: Option<Contract>,
    #[builder(default)]
    pub services: Arc<Services>,
    #[builder(default = ActionRegistry::with_builtins())]
    pub actions: ActionRegistry,
    #[builder(default = Arc::new(NullJournal) as Arc<dyn EventJournal>)]
    pub journal: Arc<dyn EventJournal>,
    #[builder(default)]
    pub config: EngineConfig,
}

impl EngineDeps {
    pub fn build_engine(self) -> Result<ExecutionEngine, StartupError> {
        ExecutionEngine::new(self)
    }
}

struct StateObserver {
    field: String,
    transition: Option<(String, String)>,
    feature_set: Arc<FeatureSet>,
}

impl StateObserver {
    fn accepts(&self, t: &StateTransition) -> bool {
        self.field.eq_ignore_ascii_case(&t.field)
            && self.transition.as_ref().map_or(true, |(from, to)| {
                from.eq_ignore_ascii_case(&t.from) && to.eq_ignore_ascii_case(&t.to)
            })
    }
}

struct Inner {
    name: String,
    feature_sets: HashMap<String, Arc<FeatureSet>>,
    end_handlers: Vec<Arc<FeatureSet>>,
    repository_observers: Vec<(String, Arc<FeatureSet>)>,
    state_observers: Vec<StateObserver>,
    routes: Option<OpenApiRouteRegistry>,
    executor: FeatureSetExecutor,
    bus: EventBus,
    root: ContextSnapshot,
    services: Arc<Services>,
    config: EngineConfig,
}

#[derive(Clone)]
pub struct ExecutionEngine {
    inner: Arc<Inner>,
}

impl ExecutionEngine {
    /// Validate the application against the contract and wire every
    /// feature set to its trigger. All problems are reported at once.
    pub fn new(deps: EngineDeps) -> Result<Self, StartupError> {
        let EngineDeps {
            application,
            contract,
            services,
            actions,
            journal,
            config,
        } = deps;

        let routes = contract
            .as_ref()
            .map(OpenApiRouteRegistry::compile)
            .transpose()?;

        let bus = EventBus::new(journal, config.max_cascade);
        let mut problems = Vec::new();
        let mut feature_sets: HashMap<String, Arc<FeatureSet>> = HashMap::new();
        let mut end_handlers = Vec::new();
        let mut repository_observers = Vec::new();
        let mut state_observers = Vec::new();

        for feature_set in application.feature_sets {
            let feature_set = Arc::new(feature_set);
            // One Application-End per outcome is allowed.
            if feature_set.name == APPLICATION_END {
                end_handlers.push(feature_set);
                continue;
            }
            if feature_sets.contains_key(&feature_set.name) {
                problems.push(StartupProblem::DuplicateFeatureSet(feature_set.name.clone()));
                continue;
            }

            match ActivityBinding::parse(&feature_set.business_activity) {
                Ok(ActivityBinding::Event { event_type, guards }) => bus.add(Subscription {
                    event_type,
                    guards,
                    feature_set: feature_set.name.clone(),
                }),
                Ok(ActivityBinding::RepositoryObserver { repository }) => {
                    repository_observers.push((repository, feature_set.clone()))
                }
                Ok(ActivityBinding::StateObserver { field, transition }) => {
                    state_observers.push(StateObserver {
                        field,
                        transition,
                        feature_set: feature_set.clone(),
                    })
                }
                Ok(ActivityBinding::None) => {}
                Err(source) => problems.push(StartupProblem::Activity {
                    feature_set: feature_set.name.clone(),
                    source,
                }),
            }
            feature_sets.insert(feature_set.name.clone(), feature_set);
        }

        if let Some(routes) = &routes {
            problems.extend(
                routes
                    .operation_ids()
                    .filter(|id| !feature_sets.contains_key(*id))
                    .map(|id| StartupProblem::MissingHandler(id.to_string())),
            );
        }
        if !problems.is_empty() {
            return Err(StartupError::Invalid(problems));
        }

        let root = RuntimeContext::new(application.name.as_str(), services.clone()).snapshot();

        info!(
            application = %application.name,
            feature_sets = feature_sets.len() + end_handlers.len(),
            routes = routes.as_ref().map_or(0, |r| r.len()),
            subscriptions = bus.subscription_count(),
            "Application loaded"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                name: application.name,
                feature_sets,
                end_handlers,
                repository_observers,
                state_observers,
                routes,
                executor: FeatureSetExecutor::new(Arc::new(actions)),
                bus,
                root,
                services,
                config,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.inner.services
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// `None` when the application was loaded without a contract.
    pub fn routes(&self) -> Option<&OpenApiRouteRegistry> {
        self.inner.routes.as_ref()
    }

    pub fn feature_set(&self, name: &str) -> Option<&FeatureSet> {
        self.inner.feature_sets.get(name).map(|fs| fs.as_ref())
    }

    /// Subscribe a feature set to an event type with a guard expression.
    pub fn subscribe(
        &self,
        event_type: &str,
        guard: &str,
        feature_set: &str,
    ) -> Result<(), SubscribeError> {
        if !self.inner.feature_sets.contains_key(feature_set) {
            return Err(SubscribeError::UnknownFeatureSet(feature_set.to_string()));
        }
        self.inner.bus.subscribe(event_type, guard, feature_set)?;
        Ok(())
    }

    /// Publish a domain event and wait for every handler it reaches.
    pub async fn publish(&self, event_type: &str, payload: impl Into<Value>) -> DispatchReport {
        self.publish_event(Event::new(event_type, payload)).await
    }

    pub async fn publish_event(&self, event: Event) -> DispatchReport {
        self.notify(Emission::Event(event)).await
    }

    /// Dispatch any emission: event, repository change or state transition.
    pub async fn notify(&self, emission: Emission) -> DispatchReport {
        self.inner.bus.dispatch(emission, self.inner.as_ref()).await
    }

    /// Run a feature set by name with `input` bound as `input`, then
    /// dispatch what it emitted. `None` when no such feature set exists.
    pub async fn invoke(&self, name: &str, input: impl Into<Value>) -> Option<HandlerRun> {
        let feature_set = self.inner.feature_sets.get(name).cloned()?;
        let trigger = InvocationTrigger {
            id: Uuid::new_v4(),
            input: input.into(),
        };
        let mut run = self
            .inner
            .run_handler(&feature_set, &trigger, self.inner.deadline(), bind_input)
            .await;
        self.dispatch_all(std::mem::take(&mut run.emissions)).await;
        Some(run)
    }

    /// Run `Application-Start`, if present, then dispatch what it emitted.
    /// Blocks for as long as the feature set does, e.g. on a keepalive.
    pub async fn start(&self) -> Result<(), ExecutionError> {
        let Some(feature_set) = self.inner.feature_sets.get(APPLICATION_START).cloned() else {
            debug!(application = %self.inner.name, "No Application-Start feature set");
            return Ok(());
        };
        info!(application = %self.inner.name, "Starting application");
        let trigger = LifecycleTrigger::new("start");
        let run = self
            .inner
            .run_handler(&feature_set, &trigger, None, bind_lifecycle)
            .await;
        self.dispatch_all(run.emissions).await;
        run.result.map(|_| ())
    }

    /// Signal shutdown, then run the `Application-End` feature sets whose
    /// activity fits the outcome (`Success` or `Error`; any other label runs
    /// on both).
    pub async fn shutdown(&self, success: bool) -> Result<(), ExecutionError> {
        self.inner.services.lifecycle.signal_shutdown();
        let outcome = if success { "success" } else { "error" };
        info!(application = %self.inner.name, outcome, "Shutting down");

        let mut first_error = None;
        for feature_set in &self.inner.end_handlers {
            let activity = feature_set.business_activity.trim();
            let wants = match activity.to_ascii_lowercase().as_str() {
                "success" => success,
                "error" => !success,
                _ => true,
            };
            if !wants {
                continue;
            }
            let trigger = LifecycleTrigger::new("end");
            let run = self
                .inner
                .run_handler(feature_set, &trigger, None, bind_lifecycle)
                .await;
            self.dispatch_all(run.emissions).await;
            if let Err(e) = run.result {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Route an HTTP request to its operation's feature set.
    pub async fn handle_request(&self, request: HttpRequest) -> HttpResponse {
        let inner = &self.inner;
        let Some(routes) = &inner.routes else {
            return HttpResponse::not_found(&request.method, &request.path);
        };
        let Some(matched) = routes.match_route(&request.method, &request.path) else {
            debug!(method = %request.method, path = %request.path, "No route");
            return HttpResponse::not_found(&request.method, &request.path);
        };

        let missing = matched.route.missing_query(&request.query);
        if !missing.is_empty() {
            return HttpResponse::json(
                400,
                json!({ "error": "missing required query parameters", "missing": missing }),
            );
        }
        if matched.route.body_required && request.body_value().is_null() {
            return HttpResponse::error(400, "request body is required");
        }

        let Some(feature_set) = inner.feature_sets.get(matched.operation_id).cloned() else {
            // Checked at startup.
            return HttpResponse::error(500, format!("no handler for {}", matched.operation_id));
        };

        let trigger = HttpTrigger {
            id: Uuid::new_v4(),
            request: &request,
            matched,
        };
        let run = inner
            .run_handler(&feature_set, &trigger, inner.deadline(), bind_request)
            .await;
        self.dispatch_all(run.emissions).await;

        match run.result {
            Ok(Some(response)) => response.into(),
            Ok(None) => HttpResponse::json(204, serde_json::Value::Null),
            Err(e) => HttpResponse::json(
                500,
                json!({
                    "error": e.to_string(),
                    "featureSet": run.feature_set,
                    "reason": e.thrown_reason(),
                }),
            ),
        }
    }

    async fn dispatch_all(&self, emissions: Vec<Emission>) {
        for emission in emissions {
            self.notify(emission).await;
        }
    }
}

impl Inner {
    fn deadline(&self) -> Option<Instant> {
        self.config.request_timeout.map(|t| Instant::now() + t)
    }

    /// The one path every trigger takes into a feature set.
    async fn run_handler<T, B>(
        &self,
        feature_set: &FeatureSet,
        trigger: &T,
        deadline: Option<Instant>,
        bind: B,
    ) -> HandlerRun
    where
        T: Trigger + ?Sized,
        B: FnOnce(&mut RuntimeContext, &T) + Send,
    {
        let mut ctx = self
            .root
            .spawn(feature_set.name.as_str())
            .with_deadline(deadline);
        bind(&mut ctx, trigger);

        let result = self.executor.execute(feature_set, &mut ctx).await;
        let mut emissions: Vec<Emission> = ctx
            .outbox()
            .drain()
            .into_iter()
            .map(|e| e.caused_by(trigger.id()))
            .collect();

        match &result {
            Ok(_) => debug!(
                feature_set = %feature_set.name,
                trigger = trigger.kind(),
                emissions = emissions.len(),
                "Feature set completed"
            ),
            Err(e) if trigger.event_type() == Some(FEATURE_SET_FAILED) => error!(
                feature_set = %feature_set.name,
                error = %e,
                "Failure handler failed"
            ),
            Err(e) => {
                warn!(
                    feature_set = %feature_set.name,
                    trigger = trigger.kind(),
                    error = %e,
                    "Feature set failed"
                );
                emissions.push(Emission::Event(failure_event(feature_set, trigger, e)));
            }
        }

        HandlerRun {
            feature_set: feature_set.name.clone(),
            result,
            emissions,
        }
    }
}

fn failure_event<T: Trigger + ?Sized>(
    feature_set: &FeatureSet,
    trigger: &T,
    error: &ExecutionError,
) -> Event {
    Event::new(
        FEATURE_SET_FAILED,
        Value::map([
            ("featureSet", Value::from(feature_set.name.as_str())),
            ("triggerKind", Value::from(trigger.kind())),
            ("triggerId", Value::from(trigger.id().to_string())),
            (
                "eventType",
                trigger.event_type().map(Value::from).unwrap_or_default(),
            ),
            ("error", Value::from(error.to_string())),
        ]),
    )
    .caused_by(trigger.id())
}

#[async_trait]
impl EmissionRouter for Inner {
    async fn route(&self, emission: &Emission, bus: &EventBus) -> Vec<Emission> {
        let deadline = self.deadline();
        let runs = match emission {
            Emission::Event(event) => {
                let handlers: Vec<Arc<FeatureSet>> = bus
                    .subscribers(event)
                    .into_iter()
                    .filter_map(|s| self.feature_sets.get(&s.feature_set).cloned())
                    .collect();
                if handlers.is_empty() {
                    debug!(event_type = %event.event_type, "No handlers for event");
                }
                join_all(
                    handlers
                        .iter()
                        .map(|fs| self.run_handler(fs, event, deadline, bind_event)),
                )
                .await
            }
            Emission::RepositoryChange(change) => {
                join_all(
                    self.repository_observers
                        .iter()
                        .filter(|(repository, _)| *repository == change.repository)
                        .map(|(_, fs)| self.run_handler(fs, change, deadline, bind_change)),
                )
                .await
            }
            Emission::StateTransition(transition) => {
                join_all(
                    self.state_observers
                        .iter()
                        .filter(|o| o.accepts(transition))
                        .map(|o| {
                            self.run_handler(&o.feature_set, transition, deadline, bind_transition)
                        }),
                )
                .await
            }
        };

        runs.into_iter().flat_map(|run| run.emissions).collect()
    }
}
