//! Destination addressing.

use crate::config::LayoutConfig;
use crate::context::Context;
use crate::di::FromRef;
use crate::engine::identity::OwnerId;
use crate::error::AppError;
use crate::store::{CollectionPath, DocumentPath};

/// Where a relocated document lands. The document id is carried over as is.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DestinationAddress {
    pub app_namespace: String,
    pub owner: OwnerId,
    pub collection: String,
    pub document_id: String,
}

/// Builds a destination address.
///
/// # Panics
///
/// Panics if any component is empty. Callers only ever pass validated
/// configuration and ids read back from the store.
pub fn build_path(
    app_namespace: &str,
    owner: &OwnerId,
    collection: &str,
    document_id: &str,
) -> DestinationAddress {
    assert!(!app_namespace.is_empty(), "build_path: empty app namespace");
    assert!(!owner.as_str().is_empty(), "build_path: empty owner id");
    assert!(!collection.is_empty(), "build_path: empty collection name");
    assert!(!document_id.is_empty(), "build_path: empty document id");

    DestinationAddress {
        app_namespace: app_namespace.to_string(),
        owner: owner.clone(),
        collection: collection.to_string(),
        document_id: document_id.to_string(),
    }
}

/// Maps addresses onto store paths for a given layout:
///
/// ```text
/// {root_collection}/{app_namespace}/{owners_collection}/{owner}                           scaffold
/// {root_collection}/{app_namespace}/{owners_collection}/{owner}/{collection}/{document}   document
/// ```
#[derive(Debug, Clone)]
pub struct PathBuilder {
    layout: LayoutConfig,
}

impl PathBuilder {
    pub fn new(layout: LayoutConfig) -> Self {
        Self { layout }
    }

    pub fn address(&self, owner: &OwnerId, collection: &str, document_id: &str) -> DestinationAddress {
        build_path(&self.layout.app_namespace, owner, collection, document_id)
    }

    /// The per-owner root document.
    pub fn scaffold_path(&self, owner: &OwnerId) -> Result<DocumentPath, AppError> {
        self.owner_path(&self.layout.app_namespace, owner)
    }

    /// The relocated document itself.
    pub fn document_path(&self, address: &DestinationAddress) -> Result<DocumentPath, AppError> {
        self.owner_path(&address.app_namespace, &address.owner)?
            .collection(&address.collection)?
            .doc(&address.document_id)
    }

    /// A fixed document below the owner, e.g. `{owner}/meta/user`.
    pub fn owner_child(&self, owner: &OwnerId, collection: &str, id: &str) -> Result<DocumentPath, AppError> {
        self.scaffold_path(owner)?.collection(collection)?.doc(id)
    }

    fn owner_path(&self, app_namespace: &str, owner: &OwnerId) -> Result<DocumentPath, AppError> {
        CollectionPath::root(&self.layout.root_collection)?
            .doc(app_namespace)?
            .collection(&self.layout.owners_collection)?
            .doc(owner.as_str())
    }
}

impl FromRef<Context> for PathBuilder {
    fn from_ref(ctx: &Context) -> Self {
        Self::new(ctx.config.layout.clone())
    }
}
