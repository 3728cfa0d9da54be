//! Hierarchical addresses in the document store.
//!
//! Paths alternate collection and document segments, starting with a
//! collection: `empresas/E65G` is a document, `apps/auditoria/users` is a
//! collection. Segments are non-empty and never contain `/`.

use std::fmt;

use crate::error::AppError;

/// Path to a collection (odd number of segments).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(Vec<String>);

/// Path to a document (even number of segments).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentPath(Vec<String>);

fn check_segment(path: &str, segment: &str) -> Result<(), AppError> {
    if segment.is_empty() || segment.contains('/') {
        return Err(AppError::InvalidPath {
            path: path.to_string(),
            reason: format!("invalid segment '{}'", segment),
        });
    }
    Ok(())
}

fn split(path: &str) -> Result<Vec<String>, AppError> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Err(AppError::InvalidPath {
            path: path.to_string(),
            reason: "empty path".to_string(),
        });
    }
    trimmed
        .split('/')
        .map(|s| check_segment(path, s).map(|_| s.to_string()))
        .collect()
}

impl CollectionPath {
    /// A top-level collection.
    pub fn root(name: &str) -> Result<Self, AppError> {
        check_segment(name, name)?;
        Ok(Self(vec![name.to_string()]))
    }

    /// Parses `a`, `a/b/c`, ... (odd segment count).
    pub fn parse(path: &str) -> Result<Self, AppError> {
        let segments = split(path)?;
        if segments.len() % 2 == 0 {
            return Err(AppError::InvalidPath {
                path: path.to_string(),
                reason: "collection paths have an odd number of segments".to_string(),
            });
        }
        Ok(Self(segments))
    }

    /// The document `id` inside this collection.
    pub fn doc(&self, id: &str) -> Result<DocumentPath, AppError> {
        check_segment(id, id)?;
        let mut segments = self.0.clone();
        segments.push(id.to_string());
        Ok(DocumentPath(segments))
    }

    /// Last segment: the collection's own name.
    pub fn name(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or_default()
    }

    /// The document this collection hangs off, if nested.
    pub fn parent(&self) -> Option<DocumentPath> {
        (self.0.len() > 1).then(|| DocumentPath(self.0[..self.0.len() - 1].to_vec()))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl DocumentPath {
    /// Parses `a/b`, `a/b/c/d`, ... (even segment count).
    pub fn parse(path: &str) -> Result<Self, AppError> {
        let segments = split(path)?;
        if segments.len() % 2 != 0 {
            return Err(AppError::InvalidPath {
                path: path.to_string(),
                reason: "document paths have an even number of segments".to_string(),
            });
        }
        Ok(Self(segments))
    }

    /// Last segment: the document id.
    pub fn id(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or_default()
    }

    /// The collection containing this document.
    pub fn parent(&self) -> CollectionPath {
        CollectionPath(self.0[..self.0.len() - 1].to_vec())
    }

    /// Sub-collection `name` under this document.
    pub fn collection(&self, name: &str) -> Result<CollectionPath, AppError> {
        check_segment(name, name)?;
        let mut segments = self.0.clone();
        segments.push(name.to_string());
        Ok(CollectionPath(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}
