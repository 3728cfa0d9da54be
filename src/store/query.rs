//! Query builder for paged equality queries.

use std::pin::Pin;

use futures::{Stream, StreamExt, TryStreamExt};
use serde_json::Value as JsonValue;

use crate::error::AppError;
use crate::store::document::{Document, Fields};
use crate::store::path::CollectionPath;
use crate::store::traits::{DocumentReader, PageRequest};

/// Default number of documents fetched per page.
pub const DEFAULT_PAGE_SIZE: usize = 300;

/// Upper bound on documents fetched per page.
pub const MAX_PAGE_SIZE: usize = 10_000;

/// A stream of documents from a collection listing.
///
/// Pages are fetched on demand with a cursor, so a scan never holds more
/// than one page in memory.
pub type DocumentStream<'a> = Pin<Box<dyn Stream<Item = Result<Document, AppError>> + Send + 'a>>;

/// A builder for listing a collection, optionally filtered by field equality.
///
/// # Example
///
/// ```ignore
/// let docs = store
///     .collection(CollectionPath::root("sucursales")?)
///     .where_eq("empresaId", "E65GgRA804BtOZuWTJ8o")
///     .fetch_all()
///     .await?;
/// ```
pub struct Query<'a, R: DocumentReader + ?Sized> {
    reader: &'a R,
    collection: CollectionPath,
    filter: Fields,
    page_size: usize,
}

impl<'a, R: DocumentReader + ?Sized> Query<'a, R> {
    pub fn new(reader: &'a R, collection: CollectionPath) -> Self {
        Self {
            reader,
            collection,
            filter: Fields::new(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Keeps only documents whose `field` equals `value`.
    pub fn where_eq(mut self, field: &str, value: impl Into<JsonValue>) -> Self {
        self.filter.insert(field.to_string(), value.into());
        self
    }

    /// Documents fetched per round trip, clamped to `1..=MAX_PAGE_SIZE`.
    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// Streams every matching document, following page cursors.
    pub fn stream(self) -> DocumentStream<'a> {
        use async_stream::try_stream;

        let Query {
            reader,
            collection,
            filter,
            page_size,
        } = self;

        Box::pin(try_stream! {
            let mut after: Option<String> = None;
            loop {
                let request = PageRequest { limit: page_size, after: after.take() };
                let page = reader.query_page(&collection, &filter, &request).await?;

                for document in page.documents {
                    yield document;
                }

                match page.next {
                    Some(cursor) => after = Some(cursor),
                    None => break,
                }
            }
        })
    }

    /// Collects all matching documents. Prefer [`Query::stream`] for large
    /// collections.
    pub async fn fetch_all(self) -> Result<Vec<Document>, AppError> {
        self.stream().try_collect().await
    }

    /// Returns the first matching document, if any.
    pub async fn fetch_one(self) -> Result<Option<Document>, AppError> {
        let mut stream = self.page_size(1).stream();
        stream.next().await.transpose()
    }
}

/// Extension trait providing `reader.collection(path)`.
pub trait QueryExt: DocumentReader {
    fn collection(&self, path: CollectionPath) -> Query<'_, Self> {
        Query::new(self, path)
    }
}

impl<R: DocumentReader + ?Sized> QueryExt for R {}
