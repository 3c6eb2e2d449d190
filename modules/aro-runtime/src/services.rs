//! Process-wide shared state, passed explicitly.
//!
//! [`Services`] is built once at startup and handed to the engine; every
//! context carries an `Arc` to it. The typed registry is frozen after
//! construction. The only mutable pieces are the [`SymbolTable`] (serialized
//! per key) and the [`Lifecycle`] used by server actions.

use std::any::{Any, TypeId};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::watch;
use typed_builder::TypedBuilder;

use crate::repository::{InMemoryRepositories, RepositoryProvider};
use crate::value::Value;

/// Dependencies shared by every invocation.
#[derive(TypedBuilder)]
pub struct Services {
    #[builder(default = Arc::new(InMemoryRepositories::new()) as Arc<dyn RepositoryProvider>)]
    pub repositories: Arc<dyn RepositoryProvider>,
    #[builder(default)]
    pub registry: ServiceRegistry,
    #[builder(default)]
    pub symbols: SymbolTable,
    #[builder(default)]
    pub lifecycle: Lifecycle,
}

impl Default for Services {
    fn default() -> Self {
        Services::builder().build()
    }
}

// ---------------------------------------------------------------------------
// ServiceRegistry
// ---------------------------------------------------------------------------

/// Typed lookup of host-provided services for extension actions.
///
/// Populated before the engine starts; read-only afterwards.
#[derive(Default)]
pub struct ServiceRegistry {
    entries: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T: Any + Send + Sync>(mut self, service: T) -> Self {
        self.entries.insert(TypeId::of::<T>(), Arc::new(service));
        self
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.entries
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|entry| entry.downcast::<T>().ok())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// SymbolTable
// ---------------------------------------------------------------------------

/// Target of the `publish` action. Last write wins; each write is atomic.
#[derive(Default)]
pub struct SymbolTable {
    symbols: RwLock<HashMap<String, Value>>,
}

impl SymbolTable {
    pub fn publish(&self, name: impl Into<String>, value: Value) {
        let mut symbols = self.symbols.write().unwrap_or_else(|e| e.into_inner());
        symbols.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        let symbols = self.symbols.read().unwrap_or_else(|e| e.into_inner());
        symbols.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let symbols = self.symbols.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = symbols.keys().cloned().collect();
        names.sort();
        names
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Shutdown signal and the set of long-lived resources started by
/// SERVER-role actions.
pub struct Lifecycle {
    shutdown: watch::Sender<bool>,
    servers: Mutex<BTreeSet<String>>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shutdown,
            servers: Mutex::new(BTreeSet::new()),
        }
    }
}

impl Lifecycle {
    pub fn start_server(&self, name: &str) -> bool {
        self.servers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string())
    }

    pub fn stop_server(&self, name: &str) -> bool {
        self.servers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name)
    }

    pub fn running_servers(&self) -> Vec<String> {
        self.servers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn signal_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Suspend until [`signal_shutdown`](Self::signal_shutdown) is called.
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.shutdown.subscribe();
        // Err means the sender is gone, which only happens on teardown.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}
