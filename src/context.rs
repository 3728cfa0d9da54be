//! Application context providing dependency injection root.

use std::ops::Deref;
use std::sync::Arc;

use crate::config::Config;
use crate::di::Context as ContextDerive;
use crate::engine::interrupt::Interrupt;
use crate::store::DocumentStore;

/// Shared handle to the destination document store.
pub type AppStore = Arc<dyn DocumentStore>;

/// The store documents are listed from and purged from.
///
/// A distinct type so components can ask for it separately from
/// [`AppStore`]. Same store as the destination unless `[source_store]` is
/// configured.
#[derive(Clone)]
pub struct SourceStore(AppStore);

impl SourceStore {
    pub fn new(store: AppStore) -> Self {
        Self(store)
    }
}

impl Deref for SourceStore {
    type Target = dyn DocumentStore;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

/// Root application context for dependency injection.
///
/// `#[derive(Context)]` generates a `FromRef` implementation for each field,
/// so engine components declared with `#[derive(FromContext)]` resolve their
/// dependencies from it at compile time.
#[derive(ContextDerive, Clone)]
pub struct Context {
    /// The store relocated documents, scaffolds and owner records go to.
    pub store: AppStore,
    /// The store source documents come from.
    pub source: SourceStore,
    /// Resolved, validated configuration. Immutable for the whole run.
    pub config: Arc<Config>,
    /// Operator stop flag for the run.
    pub interrupt: Interrupt,
}

impl Context {
    /// Creates a context reading and writing one store.
    pub fn new(store: AppStore, config: Config) -> Self {
        Self {
            source: SourceStore::new(store.clone()),
            store,
            config: Arc::new(config),
            interrupt: Interrupt::new(),
        }
    }

    /// Lists and purges source documents from `source` instead.
    pub fn with_source(mut self, source: AppStore) -> Self {
        self.source = SourceStore::new(source);
        self
    }
}
