//! Idempotency guard.

use crate::context::{AppStore, Context};
use crate::di::FromContext;
use crate::error::AppError;
use crate::store::DocumentPath;

/// Refuses relocations whose destination already holds a document.
///
/// A point read per document; an existing destination is never overwritten,
/// which is what makes a re-run resume instead of duplicating.
#[derive(FromContext, Clone)]
pub struct IdempotencyGuard {
    store: AppStore,
}

impl IdempotencyGuard {
    /// Whether `destination` is already occupied.
    pub async fn exists(&self, destination: &DocumentPath) -> Result<bool, AppError> {
        self.store.exists(destination).await
    }
}
