//! Migration provenance.
//!
//! Opt-in. A stamped copy carries where it came from:
//!
//! ```json
//! "migratedFrom": { "path": "widgets/w1", "ownerField": "creatorId", "source": "...", "legacyOwner": "..." },
//! "migratedAt": "2024-05-01T12:00:00.000Z"
//! ```
//!
//! and each owner can get one record (default `{owner}/meta/user`) naming
//! the legacy ids and emails that were folded into it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value as JsonValue};

use crate::config::Config;
use crate::context::{AppStore, Context};
use crate::di::FromContext;
use crate::engine::address::PathBuilder;
use crate::engine::identity::{OwnerId, Resolution};
use crate::engine::scaffold::{timestamp, Ensured};
use crate::error::AppError;
use crate::store::{DocumentPath, Fields};

pub const MIGRATED_FROM: &str = "migratedFrom";
pub const MIGRATED_AT: &str = "migratedAt";

/// Adds `migratedFrom` and `migratedAt` to a relocated copy.
pub fn stamp_document(
    fields: &mut Fields,
    source: &DocumentPath,
    resolution: &Resolution,
    label: Option<&str>,
    now: DateTime<Utc>,
) {
    let mut origin = Map::new();
    origin.insert("path".into(), JsonValue::String(source.to_string()));
    origin.insert("ownerField".into(), JsonValue::String(resolution.field.clone()));
    if let Some(label) = label {
        origin.insert("source".into(), JsonValue::String(label.to_string()));
    }
    if let Some(legacy) = &resolution.aliased_from {
        origin.insert("legacyOwner".into(), JsonValue::String(legacy.to_string()));
    }

    fields.insert(MIGRATED_FROM.into(), JsonValue::Object(origin));
    fields.insert(MIGRATED_AT.into(), timestamp(now));
}

/// Field map of a fresh owner record.
pub fn owner_record_fields(
    owner: &OwnerId,
    legacy: &[&str],
    emails: &[&str],
    label: Option<&str>,
    now: DateTime<Utc>,
) -> Fields {
    let strings = |values: &[&str]| {
        JsonValue::Array(values.iter().map(|v| JsonValue::String(v.to_string())).collect())
    };

    let mut origin = Map::new();
    if let Some(label) = label {
        origin.insert("source".into(), JsonValue::String(label.to_string()));
    }
    origin.insert("legacyOwners".into(), strings(legacy));

    let mut fields = Fields::new();
    fields.insert("ownerId".into(), JsonValue::String(owner.to_string()));
    fields.insert(MIGRATED_FROM.into(), JsonValue::Object(origin));
    fields.insert(MIGRATED_AT.into(), timestamp(now));
    if !emails.is_empty() {
        fields.insert("emails".into(), strings(emails));
    }
    fields
}

/// Creates the per-owner provenance record when enabled.
///
/// Like the scaffold, checks the store every time instead of remembering
/// owners.
#[derive(FromContext, Clone)]
pub struct OwnerRecords {
    store: AppStore,
    config: Arc<Config>,
}

impl OwnerRecords {
    pub async fn ensure(&self, owner: &OwnerId) -> Result<Ensured, AppError> {
        let provenance = &self.config.provenance;
        if !provenance.owner_record || !self.config.run.mode.is_commit() {
            return Ok(Ensured::Skipped);
        }

        let path = PathBuilder::new(self.config.layout.clone()).owner_child(
            owner,
            &provenance.record_collection,
            &provenance.record_id,
        )?;
        if self.store.exists(&path).await? {
            return Ok(Ensured::Existing);
        }

        let owners = &self.config.owners;
        let canonical = |id: &str| -> bool {
            let id = owners.aliases.get(id).map_or(id, String::as_str);
            id == owner.as_str()
        };
        let legacy: Vec<&str> = owners
            .aliases
            .iter()
            .filter(|(_, target)| target.as_str() == owner.as_str())
            .map(|(legacy, _)| legacy.as_str())
            .collect();
        let emails: Vec<&str> = owners
            .emails
            .iter()
            .filter(|(_, target)| canonical(target))
            .map(|(email, _)| email.as_str())
            .collect();

        let fields = owner_record_fields(
            owner,
            &legacy,
            &emails,
            provenance.source_label.as_deref(),
            Utc::now(),
        );
        self.store.set(&path, fields).await?;
        tracing::info!(owner = %owner, path = %path, "Created owner record");
        Ok(Ensured::Created)
    }
}
