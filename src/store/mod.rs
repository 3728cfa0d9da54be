//! Hierarchical document store abstraction.
//!
//! The engine only ever talks to [`DocumentStore`]; backends live under
//! [`backends`] and are opened through [`session`].

pub mod backends;
pub mod document;
pub mod path;
pub mod query;
pub mod session;
pub mod traits;

pub use document::{fields_from, Document, Fields};
pub use path::{CollectionPath, DocumentPath};
pub use query::{DocumentStream, Query, QueryExt, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use session::{open, prepare, with_store, with_stores, StoreSession};
pub use traits::{DocumentReader, DocumentStore, DocumentWriter, Page, PageRequest};
