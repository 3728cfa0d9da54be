//! Per-owner scaffold documents.
//!
//! Some stores do not materialise parent documents implicitly, which leaves
//! relocated children hanging off a document that does not exist. Before the
//! first child of an owner is written, the owner root gets a minimal record:
//!
//! ```json
//! { "ownerId": "...", "createdAt": "...", "structureFixed": true, "fixedAt": "..." }
//! ```

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value as JsonValue;

use crate::config::Config;
use crate::context::{AppStore, Context};
use crate::di::FromContext;
use crate::engine::address::PathBuilder;
use crate::engine::identity::OwnerId;
use crate::error::AppError;
use crate::store::Fields;

/// What [`ScaffoldEnsurer::ensure`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ensured {
    /// PREVIEW run; nothing read or written.
    Skipped,
    /// The scaffold was already there.
    Existing,
    Created,
}

/// RFC 3339 UTC timestamp with milliseconds, as stored in documents.
pub fn timestamp(now: DateTime<Utc>) -> JsonValue {
    JsonValue::String(now.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Field map of a fresh scaffold document.
pub fn scaffold_fields(owner: &OwnerId, now: DateTime<Utc>) -> Fields {
    let stamp = timestamp(now);
    let mut fields = Fields::new();
    fields.insert("ownerId".into(), JsonValue::String(owner.to_string()));
    fields.insert("createdAt".into(), stamp.clone());
    fields.insert("structureFixed".into(), JsonValue::Bool(true));
    fields.insert("fixedAt".into(), stamp);
    fields
}

/// Guarantees the owner root document exists before a child is written.
///
/// Checks the store every time rather than remembering owners it has seen,
/// so it stays correct across runs and after partial failures.
#[derive(FromContext, Clone)]
pub struct ScaffoldEnsurer {
    store: AppStore,
    config: Arc<Config>,
}

impl ScaffoldEnsurer {
    pub async fn ensure(&self, owner: &OwnerId) -> Result<Ensured, AppError> {
        if !self.config.run.mode.is_commit() {
            return Ok(Ensured::Skipped);
        }

        let path = PathBuilder::new(self.config.layout.clone()).scaffold_path(owner)?;
        if self.store.exists(&path).await? {
            return Ok(Ensured::Existing);
        }

        self.store.set(&path, scaffold_fields(owner, Utc::now())).await?;
        tracing::info!(owner = %owner, path = %path, "Created owner scaffold");
        Ok(Ensured::Created)
    }
}
