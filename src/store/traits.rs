//! Core traits for document store abstraction.
//!
//! This module defines the trait hierarchy that backends must implement:
//!
//! - [`DocumentReader`] - Point reads and paged equality queries
//! - [`DocumentWriter`] - Set, merge-update and delete
//! - [`DocumentStore`] - Both, blanket-implemented

use async_trait::async_trait;

use crate::error::AppError;
use crate::store::document::{Document, Fields};
use crate::store::path::{CollectionPath, DocumentPath};

/// One page of a collection listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Maximum number of documents to return.
    pub limit: usize,
    /// Return only documents whose id sorts after this one.
    pub after: Option<String>,
}

/// One page of a collection listing, ordered by document id.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub documents: Vec<Document>,
    /// Cursor for the next page; `None` once the listing is exhausted.
    pub next: Option<String>,
}

/// Read access to a document store.
#[async_trait]
pub trait DocumentReader: Send + Sync {
    /// Reads one document, `None` if it does not exist.
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>, AppError>;

    /// Lists direct children of `collection` whose fields equal every entry
    /// of `filter`, in document id order, starting after `page.after`.
    async fn query_page(
        &self,
        collection: &CollectionPath,
        filter: &Fields,
        page: &PageRequest,
    ) -> Result<Page, AppError>;

    /// Whether a document exists at `path`.
    async fn exists(&self, path: &DocumentPath) -> Result<bool, AppError> {
        Ok(self.get(path).await?.is_some())
    }

    /// Verifies the store is reachable. Called once before a run starts.
    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

/// Write access to a document store.
#[async_trait]
pub trait DocumentWriter: Send + Sync {
    /// Writes `fields` at `path`, replacing any existing document.
    async fn set(&self, path: &DocumentPath, fields: Fields) -> Result<(), AppError>;

    /// Merges `fields` into an existing document.
    ///
    /// Fails with [`AppError::NotFound`] if nothing exists at `path`.
    async fn update(&self, path: &DocumentPath, fields: Fields) -> Result<(), AppError>;

    /// Deletes the document at `path`. Deleting a missing document succeeds.
    async fn delete(&self, path: &DocumentPath) -> Result<(), AppError>;
}

/// A readable and writable document store.
pub trait DocumentStore: DocumentReader + DocumentWriter {}

impl<T: DocumentReader + DocumentWriter> DocumentStore for T {}
