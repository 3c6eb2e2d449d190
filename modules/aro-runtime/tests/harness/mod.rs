//! Shared builders for runtime integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use aro_runtime::{
    Application, AroStatement, Contract, EngineConfig, EngineDeps, EventJournal,
    ExecutionEngine, Expression, FeatureSet, InMemoryRepositories, MemoryJournal, Preposition,
    RepositoryProvider, ResultDescriptor, Services, StartupError,
};

/// An engine plus handles for asserting on what it did.
pub struct Harness {
    pub engine: ExecutionEngine,
    pub journal: Arc<MemoryJournal>,
    pub repositories: Arc<InMemoryRepositories>,
}

impl Harness {
    pub fn new(feature_sets: Vec<FeatureSet>) -> Self {
        Self::try_build(feature_sets, None, EngineConfig::default()).unwrap()
    }

    pub fn with_contract(feature_sets: Vec<FeatureSet>, contract: &str) -> Self {
        Self::try_build(feature_sets, Some(contract), EngineConfig::default()).unwrap()
    }

    pub fn try_build(
        feature_sets: Vec<FeatureSet>,
        contract: Option<&str>,
        config: EngineConfig,
    ) -> Result<Self, StartupError> {
        let journal = Arc::new(MemoryJournal::new());
        let repositories = Arc::new(InMemoryRepositories::new());
        let services = Services::builder()
            .repositories(repositories.clone() as Arc<dyn RepositoryProvider>)
            .build();

        let engine = EngineDeps::builder()
            .application(application(feature_sets))
            .contract(contract.map(|c| Contract::from_json(c).unwrap()))
            .services(Arc::new(services))
            .journal(journal.clone() as Arc<dyn EventJournal>)
            .config(config)
            .build()
            .build_engine()?;

        Ok(Self {
            engine,
            journal,
            repositories,
        })
    }

    /// A value some handler published with the `Publish` action.
    pub fn symbol(&self, name: &str) -> Option<aro_runtime::Value> {
        self.engine.services().symbols.get(name)
    }
}

pub fn application(feature_sets: Vec<FeatureSet>) -> Application {
    feature_sets
        .into_iter()
        .fold(Application::new("Test App"), |app, fs| app.with_feature_set(fs))
}

pub fn stmt(
    action: &str,
    result: &str,
    preposition: Preposition,
    source: Expression,
) -> AroStatement {
    AroStatement::new(action, ResultDescriptor::new(result), preposition, source)
}

/// `Publish as <name> with <source>`
pub fn publish(name: &str, source: Expression) -> AroStatement {
    stmt("Publish", name, Preposition::With, source)
}

/// `Return an <OK: status> with <source>`
pub fn ok(source: Expression) -> AroStatement {
    AroStatement::new(
        "Return",
        ResultDescriptor::qualified("OK", "status"),
        Preposition::With,
        source,
    )
}
