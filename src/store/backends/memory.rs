//! In-process document store.
//!
//! Backs the test suite and the `snapshot` backend, which loads a JSON export
//! into memory and writes it back after a run.
//!
//! Snapshot format is a single JSON object keyed by document path:
//!
//! ```json
//! {
//!   "empresas/E65GgRA804BtOZuWTJ8o": { "nombre": "ACME", "propietarioId": "..." },
//!   "apps/auditoria/users/hTD8FYeueHhuXxGCjxD0DcYmkRG2": { "structureFixed": true }
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::AppError;
use crate::store::document::{Document, Fields};
use crate::store::path::{CollectionPath, DocumentPath};
use crate::store::traits::{DocumentReader, DocumentWriter, Page, PageRequest};

/// Store operations that can be made to fail on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Get,
    Query,
    Set,
    Update,
    Delete,
    /// Matched against the empty path.
    Ping,
}

impl Op {
    fn name(self) -> &'static str {
        match self {
            Op::Get => "get",
            Op::Query => "query",
            Op::Set => "set",
            Op::Update => "update",
            Op::Delete => "delete",
            Op::Ping => "ping",
        }
    }
}

/// Ordered in-memory document store.
///
/// Mutations are counted so callers can assert that a run wrote nothing, and
/// individual operations can be set to fail to exercise recovery paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: RwLock<BTreeMap<DocumentPath, Fields>>,
    faults: Mutex<HashSet<(Op, String)>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a document without counting it as a write.
    pub fn insert(&self, path: &str, fields: Fields) -> Result<(), AppError> {
        let path = DocumentPath::parse(path)?;
        self.docs_mut()?.insert(path, fields);
        Ok(())
    }

    /// Makes `op` on `path` fail from now on. For [`Op::Query`], `path` is the
    /// collection path.
    pub fn fail(&self, op: Op, path: &str) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.insert((op, path.to_string()));
        }
    }

    /// Clears all injected failures.
    pub fn heal(&self) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.clear();
        }
    }

    /// Number of successful set/update/delete calls.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.docs.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the whole store keyed by path string.
    pub fn dump(&self) -> Result<BTreeMap<String, Fields>, AppError> {
        Ok(self
            .docs_ref()?
            .iter()
            .map(|(path, fields)| (path.to_string(), fields.clone()))
            .collect())
    }

    /// Loads a snapshot file.
    pub fn load_snapshot(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)?;
        let entries: BTreeMap<String, JsonValue> = serde_json::from_str(&raw)?;

        let store = Self::new();
        for (key, value) in entries {
            match value {
                JsonValue::Object(fields) => store.insert(&key, fields)?,
                other => {
                    return Err(AppError::InvalidPath {
                        path: key,
                        reason: format!("snapshot entry is not an object: {}", other),
                    })
                }
            }
        }
        Ok(store)
    }

    /// Writes the store to `path`, replacing the file atomically.
    pub fn save_snapshot(&self, path: &Path) -> Result<(), AppError> {
        let dump = self.dump()?;
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, &dump)?;
        tmp.persist(path).map_err(|e| AppError::Io(e.error))?;
        Ok(())
    }

    fn check(&self, op: Op, path: &str) -> Result<(), AppError> {
        let faulted = self
            .faults
            .lock()
            .map(|f| f.contains(&(op, path.to_string())))
            .unwrap_or(false);
        if faulted {
            return Err(AppError::store(op.name(), path, "injected failure"));
        }
        Ok(())
    }

    fn docs_ref(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<DocumentPath, Fields>>, AppError> {
        self.docs
            .read()
            .map_err(|_| AppError::Internal("memory store lock poisoned".to_string()))
    }

    fn docs_mut(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<DocumentPath, Fields>>, AppError> {
        self.docs
            .write()
            .map_err(|_| AppError::Internal("memory store lock poisoned".to_string()))
    }

    fn wrote(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

fn matches(fields: &Fields, filter: &Fields) -> bool {
    filter
        .iter()
        .all(|(key, expected)| fields.get(key) == Some(expected))
}

#[async_trait]
impl DocumentReader for MemoryStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>, AppError> {
        self.check(Op::Get, &path.to_string())?;
        Ok(self
            .docs_ref()?
            .get(path)
            .map(|fields| Document::new(path.clone(), fields.clone())))
    }

    async fn query_page(
        &self,
        collection: &CollectionPath,
        filter: &Fields,
        page: &PageRequest,
    ) -> Result<Page, AppError> {
        self.check(Op::Query, &collection.to_string())?;
        let docs = self.docs_ref()?;

        let mut documents: Vec<Document> = docs
            .iter()
            .filter(|(path, _)| &path.parent() == collection)
            .filter(|(path, _)| match &page.after {
                Some(after) => path.id() > after.as_str(),
                None => true,
            })
            .filter(|(_, fields)| matches(fields, filter))
            .take(page.limit + 1)
            .map(|(path, fields)| Document::new(path.clone(), fields.clone()))
            .collect();

        let next = if documents.len() > page.limit {
            documents.truncate(page.limit);
            documents.last().map(|d| d.id().to_string())
        } else {
            None
        };

        Ok(Page { documents, next })
    }

    async fn ping(&self) -> Result<(), AppError> {
        self.check(Op::Ping, "")
    }
}

#[async_trait]
impl DocumentWriter for MemoryStore {
    async fn set(&self, path: &DocumentPath, fields: Fields) -> Result<(), AppError> {
        self.check(Op::Set, &path.to_string())?;
        self.docs_mut()?.insert(path.clone(), fields);
        self.wrote();
        Ok(())
    }

    async fn update(&self, path: &DocumentPath, fields: Fields) -> Result<(), AppError> {
        self.check(Op::Update, &path.to_string())?;
        let mut docs = self.docs_mut()?;
        let existing = docs
            .get_mut(path)
            .ok_or_else(|| AppError::NotFound(path.to_string()))?;
        existing.extend(fields);
        drop(docs);
        self.wrote();
        Ok(())
    }

    async fn delete(&self, path: &DocumentPath) -> Result<(), AppError> {
        self.check(Op::Delete, &path.to_string())?;
        self.docs_mut()?.remove(path);
        self.wrote();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::document::fields_from;
    use crate::store::query::QueryExt;
    use serde_json::json;

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert("widgets/w2", fields_from(json!({"color": "red"}))).unwrap();
        store.insert("widgets/w1", fields_from(json!({"color": "blue"}))).unwrap();
        store.insert("widgets/w3", fields_from(json!({"color": "red"}))).unwrap();
        store
            .insert("widgets/w1/parts/p1", fields_from(json!({"color": "red"})))
            .unwrap();
        store.insert("gadgets/g1", fields_from(json!({}))).unwrap();
        store
    }

    #[tokio::test]
    async fn test_listing_is_direct_children_in_id_order() {
        let store = seeded();
        let docs = store
            .collection(CollectionPath::root("widgets").unwrap())
            .page_size(2)
            .fetch_all()
            .await
            .unwrap();

        let ids: Vec<_> = docs.iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec!["w1", "w2", "w3"]);
    }

    #[tokio::test]
    async fn test_equality_filter() {
        let store = seeded();
        let docs = store
            .collection(CollectionPath::root("widgets").unwrap())
            .where_eq("color", "red")
            .fetch_all()
            .await
            .unwrap();

        let ids: Vec<_> = docs.iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec!["w2", "w3"]);
    }

    #[tokio::test]
    async fn test_update_merges_and_requires_existing() {
        let store = seeded();
        let path = DocumentPath::parse("widgets/w1").unwrap();

        store
            .update(&path, fields_from(json!({"size": 3})))
            .await
            .unwrap();
        let doc = store.get(&path).await.unwrap().unwrap();
        assert_eq!(doc.get_str("color"), Some("blue"));
        assert_eq!(doc.get::<i64>("size").unwrap(), 3);

        let missing = DocumentPath::parse("widgets/none").unwrap();
        let err = store.update(&missing, Fields::new()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = seeded();
        let path = DocumentPath::parse("widgets/w1").unwrap();
        store.fail(Op::Delete, "widgets/w1");

        assert!(store.delete(&path).await.is_err());
        assert!(store.exists(&path).await.unwrap());

        store.heal();
        store.delete(&path).await.unwrap();
        assert!(!store.exists(&path).await.unwrap());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("export.json");

        let store = seeded();
        store.save_snapshot(&file).unwrap();

        let loaded = MemoryStore::load_snapshot(&file).unwrap();
        assert_eq!(loaded.dump().unwrap(), store.dump().unwrap());
        assert_eq!(loaded.writes(), 0);
    }

    #[test]
    fn test_snapshot_rejects_bad_paths() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("export.json");
        std::fs::write(&file, r#"{"widgets": {"a": 1}}"#).unwrap();

        assert!(MemoryStore::load_snapshot(&file).is_err());
    }
}
