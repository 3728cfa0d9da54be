//! Collection scanner: resolve, guard, ensure and relocate, one document at
//! a time.
//!
//! Documents are listed from (and purged from) the source store; guard,
//! scaffold, owner record and the relocated copy all go to the destination.

use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;

use crate::config::Config;
use crate::context::{AppStore, Context, SourceStore};
use crate::di::FromContext;
use crate::engine::address::PathBuilder;
use crate::engine::guard::IdempotencyGuard;
use crate::engine::identity::{OwnerResolver, Resolution};
use crate::engine::interrupt::Interrupt;
use crate::engine::provenance::{stamp_document, OwnerRecords};
use crate::engine::scaffold::{Ensured, ScaffoldEnsurer};
use crate::engine::stats::CollectionStats;
use crate::error::AppError;
use crate::store::{CollectionPath, Document, DocumentPath, QueryExt};

/// After the first `sample_limit` relocations, only every Nth is logged at
/// info level.
const RELOCATION_LOG_EVERY: usize = 50;

/// How a single document was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Handled {
    Unresolved,
    Excluded,
    Occupied(DocumentPath),
    Relocated(DocumentPath),
}

#[derive(FromContext, Clone)]
pub struct CollectionScanner {
    store: AppStore,
    source: SourceStore,
    config: Arc<Config>,
    interrupt: Interrupt,
    resolver: OwnerResolver,
    paths: PathBuilder,
    guard: IdempotencyGuard,
    scaffolds: ScaffoldEnsurer,
    records: OwnerRecords,
}

impl CollectionScanner {
    /// Scans one top-level collection.
    ///
    /// Per-document errors are counted as `failed` and the scan moves on. If
    /// the listing itself breaks, the collection gets one extra `failed` and
    /// the scan stops there. A raised [`Interrupt`] also stops the scan,
    /// after the document in flight.
    pub async fn scan(&self, collection: &str) -> CollectionStats {
        let mut stats = CollectionStats::new(collection);
        tracing::info!(collection, mode = %self.config.run.mode, "Scanning collection");

        let source = match CollectionPath::root(collection) {
            Ok(path) => path,
            Err(e) => {
                tracing::error!(collection, error = %e, "Invalid collection name");
                stats.failed += 1;
                return stats;
            }
        };

        let mut documents = self
            .source
            .collection(source)
            .page_size(self.config.run.page_size)
            .stream();

        loop {
            if self.interrupt.is_raised() {
                tracing::warn!(collection, seen = stats.seen, "Scan stopped by operator");
                break;
            }
            let Some(next) = documents.next().await else {
                break;
            };
            match next {
                Ok(document) => self.process(document, &mut stats).await,
                Err(e) => {
                    tracing::error!(collection, error = %e, "Failed to list collection");
                    stats.failed += 1;
                    break;
                }
            }
        }

        if stats.seen == 0 && stats.failed == 0 {
            tracing::info!(collection, "Collection is empty or does not exist");
        }
        tracing::info!(
            collection,
            seen = stats.seen,
            relocated = stats.relocated,
            skipped = stats.skipped,
            failed = stats.failed,
            deleted = stats.deleted,
            purge_failed = stats.purge_failed,
            "Collection done"
        );
        stats
    }

    async fn process(&self, document: Document, stats: &mut CollectionStats) {
        stats.seen += 1;
        let source = document.path().clone();

        match self.relocate(document, stats).await {
            Ok(Handled::Unresolved) => {
                stats.skipped += 1;
                self.log_skip(stats, &source, "no valid owner id");
            }
            Ok(Handled::Excluded) => {
                stats.skipped += 1;
                self.log_skip(stats, &source, "owner not selected");
            }
            Ok(Handled::Occupied(destination)) => {
                stats.skipped += 1;
                tracing::debug!(%destination, "Destination occupied");
                self.log_skip(stats, &source, "destination already exists");
            }
            Ok(Handled::Relocated(destination)) => {
                stats.relocated += 1;
                self.log_relocation(stats, &source, &destination);
                if self.config.run.purges() {
                    self.purge(&source, &destination, stats).await;
                }
            }
            Err(e) => {
                stats.failed += 1;
                tracing::error!(
                    collection = %stats.name,
                    doc_id = source.id(),
                    error = %e,
                    "Failed to relocate document"
                );
            }
        }
    }

    /// Everything up to and including the destination write. Never deletes.
    async fn relocate(
        &self,
        document: Document,
        stats: &mut CollectionStats,
    ) -> Result<Handled, AppError> {
        let Some(resolution) = self.resolver.resolve(document.fields()) else {
            return Ok(Handled::Unresolved);
        };
        if !self.selected(&resolution) {
            return Ok(Handled::Excluded);
        }
        stats.owners.insert(resolution.owner.clone());

        let address = self
            .paths
            .address(&resolution.owner, &stats.name, document.id());
        let destination = self.paths.document_path(&address)?;

        if self.guard.exists(&destination).await? {
            return Ok(Handled::Occupied(destination));
        }

        if !self.config.run.mode.is_commit() {
            return Ok(Handled::Relocated(destination));
        }

        if self.scaffolds.ensure(&resolution.owner).await? == Ensured::Created {
            stats.scaffolds_created += 1;
        }
        if self.records.ensure(&resolution.owner).await? == Ensured::Created {
            stats.records_created += 1;
        }

        let source = document.path().clone();
        let mut fields = if self.config.owners.rewrite_aliased_fields {
            self.resolver.rewrite_aliased(document.into_fields(), &resolution)
        } else {
            document.into_fields()
        };
        let provenance = &self.config.provenance;
        if provenance.stamp_documents {
            stamp_document(
                &mut fields,
                &source,
                &resolution,
                provenance.source_label.as_deref(),
                Utc::now(),
            );
        }
        self.store.set(&destination, fields).await?;

        Ok(Handled::Relocated(destination))
    }

    async fn purge(&self, source: &DocumentPath, destination: &DocumentPath, stats: &mut CollectionStats) {
        match self.source.delete(source).await {
            Ok(()) => {
                stats.deleted += 1;
                tracing::debug!(%source, "Deleted source document");
            }
            Err(e) => {
                stats.purge_failed += 1;
                tracing::warn!(
                    collection = %stats.name,
                    doc_id = source.id(),
                    %source,
                    %destination,
                    error = %e,
                    "Relocated but source not deleted; document now exists twice and needs manual reconciliation"
                );
            }
        }
    }

    fn selected(&self, resolution: &Resolution) -> bool {
        let only = &self.config.owners.only;
        only.is_empty() || only.iter().any(|o| o == resolution.owner.as_str())
    }

    fn log_skip(&self, stats: &CollectionStats, source: &DocumentPath, reason: &str) {
        if stats.skipped <= self.config.run.sample_limit {
            tracing::info!(collection = %stats.name, doc_id = source.id(), reason, "Skipped");
        } else {
            tracing::debug!(collection = %stats.name, doc_id = source.id(), reason, "Skipped");
        }
    }

    fn log_relocation(&self, stats: &CollectionStats, source: &DocumentPath, destination: &DocumentPath) {
        let n = stats.relocated;
        let verb = if self.config.run.mode.is_commit() {
            "Relocated"
        } else {
            "Would relocate"
        };
        if n <= self.config.run.sample_limit || n % RELOCATION_LOG_EVERY == 0 {
            tracing::info!(%source, %destination, "{}", verb);
        } else {
            tracing::debug!(%source, %destination, "{}", verb);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RunMode, RunOverrides};
    use crate::di::FromRef;
    use crate::store::backends::memory::{MemoryStore, Op};
    use crate::store::fields_from;
    use serde_json::json;

    const OWNER: &str = "AAAAAAAAAAAAAAAAAAAA";

    fn widgets_config(mode: RunMode, purge: bool) -> Config {
        let mut config = Config::default();
        config.run.mode = mode;
        config.run.purge_source = purge;
        config.run.collections = vec!["widgets".into()];
        config.run.candidate_owner_fields = vec!["ownerRef".into(), "creatorId".into()];
        config
    }

    fn scanner(store: Arc<MemoryStore>, mode: RunMode, purge: bool) -> CollectionScanner {
        CollectionScanner::from_ref(&Context::new(store, widgets_config(mode, purge)))
    }

    fn seeded() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.insert("widgets/w1", fields_from(json!({"ownerRef": OWNER}))).unwrap();
        store.insert("widgets/w2", fields_from(json!({"creatorId": OWNER}))).unwrap();
        store.insert("widgets/w3", fields_from(json!({"ownerRef": "nope"}))).unwrap();
        store
    }

    #[tokio::test]
    async fn test_preview_counts_without_writing() {
        let store = seeded();
        let stats = scanner(store.clone(), RunMode::Preview, true).scan("widgets").await;

        assert_eq!((stats.seen, stats.relocated, stats.skipped, stats.failed), (3, 2, 1, 0));
        assert_eq!(stats.deleted, 0);
        assert_eq!(stats.owners.len(), 1);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_commit_moves_verbatim() {
        let store = seeded();
        let stats = scanner(store.clone(), RunMode::Commit, false).scan("widgets").await;

        assert_eq!((stats.relocated, stats.scaffolds_created), (2, 1));
        let dump = store.dump().unwrap();
        assert_eq!(
            dump[&format!("apps/auditoria/users/{OWNER}/widgets/w2")],
            fields_from(json!({"creatorId": OWNER}))
        );
        // Sources are kept without purge
        assert!(dump.contains_key("widgets/w1"));
    }

    #[tokio::test]
    async fn test_failed_write_continues_scan() {
        let store = seeded();
        store.fail(Op::Set, &format!("apps/auditoria/users/{OWNER}/widgets/w1"));
        let stats = scanner(store.clone(), RunMode::Commit, true).scan("widgets").await;

        assert_eq!((stats.seen, stats.relocated, stats.failed, stats.deleted), (3, 1, 1, 1));
        // The failed document keeps its source
        assert!(store.dump().unwrap().contains_key("widgets/w1"));
    }

    #[tokio::test]
    async fn test_purge_failure_is_counted_separately() {
        let store = seeded();
        store.fail(Op::Delete, "widgets/w2");
        let stats = scanner(store.clone(), RunMode::Commit, true).scan("widgets").await;

        assert_eq!((stats.relocated, stats.deleted, stats.purge_failed, stats.failed), (2, 1, 1, 0));
        let dump = store.dump().unwrap();
        assert!(dump.contains_key("widgets/w2"));
        assert!(dump.contains_key(&format!("apps/auditoria/users/{OWNER}/widgets/w2")));
    }

    #[tokio::test]
    async fn test_listing_failure_counts_once() {
        let store = seeded();
        store.fail(Op::Query, "widgets");
        let stats = scanner(store, RunMode::Commit, false).scan("widgets").await;

        assert_eq!((stats.seen, stats.failed), (0, 1));
    }

    #[tokio::test]
    async fn test_scaffold_failure_blocks_child_write() {
        let store = seeded();
        store.fail(Op::Set, &format!("apps/auditoria/users/{OWNER}"));
        let stats = scanner(store.clone(), RunMode::Commit, false).scan("widgets").await;

        assert_eq!((stats.relocated, stats.failed), (0, 2));
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_raised_interrupt_stops_before_next_document() {
        let store = seeded();
        let ctx = Context::new(store.clone(), widgets_config(RunMode::Commit, false));
        ctx.interrupt.raise();

        let stats = CollectionScanner::from_ref(&ctx).scan("widgets").await;
        assert_eq!(stats.seen, 0);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_separate_source_is_listed_and_purged() {
        let origin = seeded();
        let target = Arc::new(MemoryStore::new());
        let ctx = Context::new(target.clone(), widgets_config(RunMode::Commit, true))
            .with_source(origin.clone());

        let stats = CollectionScanner::from_ref(&ctx).scan("widgets").await;
        assert_eq!((stats.seen, stats.relocated, stats.deleted), (3, 2, 2));

        let moved = target.dump().unwrap();
        assert!(moved.contains_key(&format!("apps/auditoria/users/{OWNER}")));
        assert!(moved.contains_key(&format!("apps/auditoria/users/{OWNER}/widgets/w1")));
        assert!(!moved.contains_key("widgets/w3"));

        // Only the unresolved document is left behind in the source
        let left: Vec<_> = origin.dump().unwrap().into_keys().collect();
        assert_eq!(left, vec!["widgets/w3"]);
    }

    #[tokio::test]
    async fn test_padded_owner_filter_still_selects() {
        let store = seeded();
        let config = widgets_config(RunMode::Preview, false).with_overrides(&RunOverrides {
            owners: vec![format!(" {OWNER} ")],
            ..Default::default()
        });
        config.validate().unwrap();

        let stats = CollectionScanner::from_ref(&Context::new(store, config))
            .scan("widgets")
            .await;
        assert_eq!((stats.relocated, stats.skipped), (2, 1));
    }

    #[tokio::test]
    async fn test_provenance_stamp_and_owner_record() {
        let store = seeded();
        let mut config = widgets_config(RunMode::Commit, false);
        config.provenance.stamp_documents = true;
        config.provenance.owner_record = true;
        config.provenance.source_label = Some("legacy-project".into());

        let stats = CollectionScanner::from_ref(&Context::new(store.clone(), config))
            .scan("widgets")
            .await;
        assert_eq!((stats.relocated, stats.records_created), (2, 1));

        let dump = store.dump().unwrap();
        let copy = &dump[&format!("apps/auditoria/users/{OWNER}/widgets/w2")];
        assert_eq!(copy["creatorId"], json!(OWNER));
        assert_eq!(
            copy["migratedFrom"],
            json!({"path": "widgets/w2", "ownerField": "creatorId", "source": "legacy-project"})
        );
        assert!(copy["migratedAt"].is_string());
        assert!(dump.contains_key(&format!("apps/auditoria/users/{OWNER}/meta/user")));
    }
}
