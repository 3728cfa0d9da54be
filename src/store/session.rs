//! Scoped store acquisition.
//!
//! A [`StoreSession`] owns whatever a backend holds open (a connection pool,
//! a loaded export) and releases it in [`StoreSession::close`]. Callers that
//! only need the store for one unit of work should use [`with_store`], which
//! closes the session on every exit path.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::AppError;
use crate::store::backends::memory::MemoryStore;
use crate::store::backends::postgres::PostgresStore;
use crate::store::traits::DocumentStore;

/// An open document store plus the resources behind it.
#[async_trait]
pub trait StoreSession: Send + Sync {
    /// Shared handle to the store.
    fn store(&self) -> Arc<dyn DocumentStore>;

    /// Flushes and releases the session.
    async fn close(self: Box<Self>) -> Result<(), AppError>;
}

/// Opens the configured backend.
///
/// Opening never creates anything: a missing snapshot file or an unreachable
/// server is an error here, and a missing Postgres table surfaces on first
/// use. See [`prepare`] for one-time setup.
pub async fn open(config: &StoreConfig) -> Result<Box<dyn StoreSession>, AppError> {
    match config.backend {
        StoreBackend::Memory => Ok(Box::new(MemorySession {
            store: Arc::new(MemoryStore::new()),
        })),
        StoreBackend::Snapshot => {
            let path = snapshot_path(config)?;
            let store = MemoryStore::load_snapshot(&path)?;
            tracing::info!(path = %path.display(), documents = store.len(), "Loaded snapshot");
            Ok(Box::new(SnapshotSession {
                store: Arc::new(store),
                path,
            }))
        }
        StoreBackend::Postgres => {
            let store = PostgresStore::connect(postgres_uri(config)?, &config.table).await?;
            Ok(Box::new(PostgresSession {
                store: Arc::new(store),
            }))
        }
    }
}

/// One-time backend setup: creates the Postgres document table, or an empty
/// snapshot file when none exists yet. Safe to repeat.
pub async fn prepare(config: &StoreConfig) -> Result<(), AppError> {
    match config.backend {
        StoreBackend::Memory => Ok(()),
        StoreBackend::Snapshot => {
            let path = snapshot_path(config)?;
            if path.exists() {
                tracing::info!(path = %path.display(), "Snapshot already exists");
                return Ok(());
            }
            MemoryStore::new().save_snapshot(&path)?;
            tracing::info!(path = %path.display(), "Created empty snapshot");
            Ok(())
        }
        StoreBackend::Postgres => {
            let store = PostgresStore::connect(postgres_uri(config)?, &config.table).await?;
            let result = store.ensure_table().await;
            store.close();
            result?;
            tracing::info!(table = %config.table, "Document table ready");
            Ok(())
        }
    }
}

/// Runs `work` against an open store, closing the session afterwards even
/// when `work` fails. A failure from `work` takes precedence over a failure
/// to close.
pub async fn with_store<F, Fut, T>(config: &StoreConfig, work: F) -> Result<T, AppError>
where
    F: FnOnce(Arc<dyn DocumentStore>) -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let session = open(config).await?;
    let result = work(session.store()).await;
    let closed = session.close().await;
    settle(result, closed)
}

/// Like [`with_store`], for a destination store plus an optional separate
/// source store. `work` receives `(destination, source)`; without a source
/// configuration both handles point at the destination.
///
/// Both sessions are closed on every exit path, the source first.
pub async fn with_stores<F, Fut, T>(
    destination: &StoreConfig,
    source: Option<&StoreConfig>,
    work: F,
) -> Result<T, AppError>
where
    F: FnOnce(Arc<dyn DocumentStore>, Arc<dyn DocumentStore>) -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let Some(source) = source else {
        return with_store(destination, |store| work(store.clone(), store)).await;
    };

    let target = open(destination).await?;
    let origin = match open(source).await {
        Ok(session) => session,
        Err(err) => {
            if let Err(close_err) = target.close().await {
                tracing::error!(error = %close_err, "Failed to close store session");
            }
            return Err(err);
        }
    };

    let result = work(target.store(), origin.store()).await;
    let source_closed = origin.close().await;
    let target_closed = target.close().await;
    settle(result, source_closed.and(target_closed))
}

/// A failure from the work takes precedence over a failure to close.
fn settle<T>(result: Result<T, AppError>, closed: Result<(), AppError>) -> Result<T, AppError> {
    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close_err)) => Err(close_err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => {
            tracing::error!(error = %close_err, "Failed to close store session");
            Err(err)
        }
    }
}

fn snapshot_path(config: &StoreConfig) -> Result<PathBuf, AppError> {
    config
        .path
        .clone()
        .ok_or_else(|| AppError::InvalidConfig("store.path is required for the snapshot backend".into()))
}

fn postgres_uri(config: &StoreConfig) -> Result<&str, AppError> {
    config
        .uri
        .as_deref()
        .filter(|uri| !uri.is_empty())
        .ok_or_else(|| AppError::InvalidConfig("store.uri is required for the postgres backend".into()))
}

struct MemorySession {
    store: Arc<MemoryStore>,
}

#[async_trait]
impl StoreSession for MemorySession {
    fn store(&self) -> Arc<dyn DocumentStore> {
        self.store.clone()
    }

    async fn close(self: Box<Self>) -> Result<(), AppError> {
        Ok(())
    }
}

/// Writes the export back on close, but only if something changed.
struct SnapshotSession {
    store: Arc<MemoryStore>,
    path: PathBuf,
}

#[async_trait]
impl StoreSession for SnapshotSession {
    fn store(&self) -> Arc<dyn DocumentStore> {
        self.store.clone()
    }

    async fn close(self: Box<Self>) -> Result<(), AppError> {
        let writes = self.store.writes();
        if writes == 0 {
            return Ok(());
        }
        self.store.save_snapshot(&self.path)?;
        tracing::info!(path = %self.path.display(), writes, "Saved snapshot");
        Ok(())
    }
}

struct PostgresSession {
    store: Arc<PostgresStore>,
}

#[async_trait]
impl StoreSession for PostgresSession {
    fn store(&self) -> Arc<dyn DocumentStore> {
        self.store.clone()
    }

    async fn close(self: Box<Self>) -> Result<(), AppError> {
        self.store.close();
        Ok(())
    }
}
