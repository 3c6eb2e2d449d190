//! Runtime for ARO (Action-Result-Object) applications.
//!
//! An application is a set of feature sets: named statement lists whose
//! business-activity label says what triggers them. The [`ExecutionEngine`]
//! loads an application (plus an optional OpenAPI contract), routes HTTP
//! requests to operations, dispatches events to guarded handlers, and runs
//! lifecycle feature sets.

pub mod actions;
pub mod activity;
pub mod ast;
pub mod bus;
pub mod context;
pub mod engine;
pub mod eval;
pub mod events;
pub mod executor;
pub mod guard;
pub mod journal;
pub mod qualifier;
pub mod repository;
pub mod routing;
pub mod services;
pub mod specifier;
pub mod value;

pub use actions::{
    Action, ActionError, ActionOutcome, ActionRegistry, ActionRole, RegistryError, Response,
};
pub use activity::{ActivityBinding, APPLICATION_END, APPLICATION_START};
pub use ast::{
    Application, AroStatement, BinaryOp, Expression, FeatureSet, ForEachLoop, MatchCase,
    MatchStatement, ObjectDescriptor, Pattern, Preposition, ResultDescriptor, Statement, UnaryOp,
};
pub use bus::{DispatchReport, EmissionRouter, EventBus, Subscription};
pub use context::{ContextSnapshot, RuntimeContext};
pub use engine::{
    EngineConfig, EngineDeps, ExecutionEngine, HandlerRun, HttpTrigger, InvocationTrigger,
    LifecycleTrigger, StartupError, StartupProblem, SubscribeError, Trigger,
};
pub use events::{
    ChangeKind, Emission, Event, RepositoryChange, StateTransition, FEATURE_SET_FAILED,
};
pub use executor::{ExecutionError, ExecutionState, FeatureSetExecutor};
pub use guard::{GuardParseError, StateGuard, StateGuardSet};
pub use journal::{EventJournal, JournalEntry, MemoryJournal, NullJournal};
pub use repository::{InMemoryRepositories, RepositoryError, RepositoryProvider, StoreReceipt};
pub use routing::{Contract, ContractError, HttpRequest, HttpResponse, OpenApiRouteRegistry};
pub use services::{Lifecycle, ServiceRegistry, Services, SymbolTable};
pub use specifier::ResultSpecifier;
pub use value::Value;
