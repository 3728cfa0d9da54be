//! Documents and their field maps.

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::error::AppError;
use crate::store::path::DocumentPath;

/// A document's fields, keyed by field name.
pub type Fields = serde_json::Map<String, JsonValue>;

/// A document read from the store.
///
/// The engine never mutates a source document; relocation copies
/// [`Document::fields`] to a new path.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    path: DocumentPath,
    fields: Fields,
}

impl Document {
    pub fn new(path: DocumentPath, fields: Fields) -> Self {
        Self { path, fields }
    }

    pub fn path(&self) -> &DocumentPath {
        &self.path
    }

    /// The document id (last path segment).
    pub fn id(&self) -> &str {
        self.path.id()
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn into_fields(self) -> Fields {
        self.fields
    }

    /// Gets a field, deserializing to the requested type.
    ///
    /// # Errors
    ///
    /// Returns an error if the field is missing or has another shape.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, AppError> {
        self.fields
            .get(key)
            .ok_or_else(|| AppError::Internal(format!("{}: field not found: {}", self.path, key)))
            .and_then(|v| {
                serde_json::from_value(v.clone()).map_err(|e| {
                    AppError::Internal(format!("{}: failed to deserialize '{}': {}", self.path, key, e))
                })
            })
    }

    /// Like [`Document::get`], but missing and null fields are `None`.
    pub fn get_opt<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError> {
        match self.fields.get(key) {
            Some(v) if v.is_null() => Ok(None),
            Some(v) => serde_json::from_value(v.clone()).map(Some).map_err(|e| {
                AppError::Internal(format!("{}: failed to deserialize '{}': {}", self.path, key, e))
            }),
            None => Ok(None),
        }
    }

    /// String value of a field; `None` for missing or non-string values.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(JsonValue::as_str)
    }
}

/// Builds a field map from a JSON object literal. Non-objects yield an empty map.
pub fn fields_from(value: JsonValue) -> Fields {
    match value {
        JsonValue::Object(map) => map,
        _ => Fields::new(),
    }
}
