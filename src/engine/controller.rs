//! Run controller.
//!
//! A run is fixed at startup: mode, purge flag and collection order come
//! from the validated [`Config`] and never change. A COMMIT run must pass a
//! [`Confirmation`] before its first write; a PREVIEW run never asks. Once
//! confirmed, Ctrl+C stays live for the rest of the run through an
//! [`Interrupt`] listener.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{Config, RunMode};
use crate::context::{AppStore, Context, SourceStore};
use crate::di::FromContext;
use crate::engine::interrupt::Interrupt;
use crate::engine::scanner::CollectionScanner;
use crate::engine::stats::RunStats;
use crate::error::AppError;

/// Operator decision before a COMMIT run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Proceed,
    Abort,
}

/// What a COMMIT run is about to do, shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    pub mode: RunMode,
    pub purge_source: bool,
    pub collections: Vec<String>,
    pub grace: Duration,
}

/// Pre-commit confirmation step.
#[async_trait]
pub trait Confirmation: Send + Sync {
    async fn confirm(&self, plan: &RunPlan) -> Decision;
}

/// A fixed answer. Used by tests and non-interactive callers.
#[async_trait]
impl Confirmation for Decision {
    async fn confirm(&self, _plan: &RunPlan) -> Decision {
        *self
    }
}

/// Waits out the grace period; Ctrl+C during the wait aborts.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraceDelay;

#[async_trait]
impl Confirmation for GraceDelay {
    async fn confirm(&self, plan: &RunPlan) -> Decision {
        tracing::warn!(collections = plan.collections.len(), "COMMIT run: documents will be written");
        if plan.purge_source {
            tracing::warn!("Source documents will be DELETED after relocation");
        }
        tracing::warn!(
            "Press Ctrl+C to abort (waiting {} seconds)",
            plan.grace.as_secs()
        );

        let delay = tokio::time::sleep(plan.grace);
        tokio::pin!(delay);

        tokio::select! {
            _ = &mut delay => Decision::Proceed,
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => Decision::Abort,
                Err(e) => {
                    tracing::warn!(error = %e, "Cannot listen for Ctrl+C; waiting out the grace period");
                    delay.await;
                    Decision::Proceed
                }
            },
        }
    }
}

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(RunStats),
    /// The operator declined before anything was written.
    Aborted,
}

#[derive(FromContext, Clone)]
pub struct RunController {
    store: AppStore,
    source: SourceStore,
    config: Arc<Config>,
    interrupt: Interrupt,
    scanner: CollectionScanner,
}

impl RunController {
    pub fn plan(&self) -> RunPlan {
        let run = &self.config.run;
        RunPlan {
            mode: run.mode,
            purge_source: run.purges(),
            collections: run.collections.clone(),
            grace: run.grace_period(),
        }
    }

    /// Pings the stores, confirms COMMIT runs, then scans every collection in
    /// order.
    ///
    /// Only an unreachable store is an error. Per-document and per-collection
    /// failures end up in the returned stats, as does an operator interrupt.
    pub async fn run(&self, confirmation: &dyn Confirmation) -> Result<RunOutcome, AppError> {
        let plan = self.plan();

        self.store.ping().await?;
        self.source.ping().await?;
        tracing::info!(
            mode = %plan.mode,
            purge_source = plan.purge_source,
            collections = plan.collections.len(),
            "Starting run"
        );

        if plan.mode.is_commit() && confirmation.confirm(&plan).await == Decision::Abort {
            tracing::warn!("Run aborted before any write");
            return Ok(RunOutcome::Aborted);
        }

        let _listener = plan.mode.is_commit().then(|| self.interrupt.listen());

        let mut stats = RunStats::new(plan.mode, plan.purge_source);
        for collection in &plan.collections {
            stats.absorb(self.scanner.scan(collection).await);
            if self.interrupt.is_raised() {
                stats.interrupted = true;
                break;
            }
        }

        let totals = stats.totals();
        tracing::info!(
            seen = totals.seen,
            relocated = totals.relocated,
            skipped = totals.skipped,
            failed = totals.failed,
            owners = stats.distinct_owners(),
            interrupted = stats.interrupted,
            "Run finished"
        );
        Ok(RunOutcome::Completed(stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::di::FromRef;
    use crate::store::backends::memory::{MemoryStore, Op};
    use crate::store::fields_from;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const OWNER: &str = "AAAAAAAAAAAAAAAAAAAA";

    struct Counting(AtomicUsize, Decision);

    #[async_trait]
    impl Confirmation for Counting {
        async fn confirm(&self, plan: &RunPlan) -> Decision {
            assert!(plan.mode.is_commit());
            self.0.fetch_add(1, Ordering::SeqCst);
            self.1
        }
    }

    fn controller(store: Arc<MemoryStore>, mode: RunMode) -> RunController {
        let mut config = Config::default();
        config.run.mode = mode;
        config.run.collections = vec!["gadgets".into(), "widgets".into()];
        config.run.candidate_owner_fields = vec!["ownerRef".into()];
        RunController::from_ref(&Context::new(store, config))
    }

    fn seeded() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.insert("widgets/w1", fields_from(json!({"ownerRef": OWNER}))).unwrap();
        store.insert("gadgets/g1", fields_from(json!({"ownerRef": OWNER}))).unwrap();
        store
    }

    #[tokio::test]
    async fn test_preview_never_asks() {
        let confirmation = Counting(AtomicUsize::new(0), Decision::Abort);
        let outcome = controller(seeded(), RunMode::Preview)
            .run(&confirmation)
            .await
            .unwrap();

        assert!(matches!(outcome, RunOutcome::Completed(_)));
        assert_eq!(confirmation.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_abort_writes_nothing() {
        let store = seeded();
        let outcome = controller(store.clone(), RunMode::Commit)
            .run(&Decision::Abort)
            .await
            .unwrap();

        assert!(matches!(outcome, RunOutcome::Aborted));
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_collections_scanned_in_order() {
        let outcome = controller(seeded(), RunMode::Commit)
            .run(&Decision::Proceed)
            .await
            .unwrap();

        let RunOutcome::Completed(stats) = outcome else {
            panic!("run was aborted");
        };
        let names: Vec<_> = stats.collections.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["gadgets", "widgets"]);
        assert_eq!(stats.totals().relocated, 2);
        assert_eq!(stats.totals().scaffolds_created, 1);
    }

    #[tokio::test]
    async fn test_zero_grace_proceeds() {
        let plan = RunPlan {
            mode: RunMode::Commit,
            purge_source: false,
            collections: vec![],
            grace: Duration::ZERO,
        };
        assert_eq!(GraceDelay.confirm(&plan).await, Decision::Proceed);
    }

    #[tokio::test]
    async fn test_interrupt_ends_run_early() {
        let store = seeded();
        let mut config = Config::default();
        config.run.mode = RunMode::Commit;
        config.run.collections = vec!["gadgets".into(), "widgets".into()];
        config.run.candidate_owner_fields = vec!["ownerRef".into()];
        let ctx = Context::new(store.clone(), config);
        ctx.interrupt.raise();

        let RunOutcome::Completed(stats) = RunController::from_ref(&ctx)
            .run(&Decision::Proceed)
            .await
            .unwrap()
        else {
            panic!("run was aborted");
        };
        assert!(stats.interrupted);
        assert_eq!(stats.collections.len(), 1);
        assert_eq!(stats.totals().seen, 0);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_source_fails_before_scan() {
        let store = seeded();
        let source = Arc::new(MemoryStore::new());
        source.fail(Op::Ping, "");
        let mut config = Config::default();
        config.run.collections = vec!["widgets".into()];
        let ctx = Context::new(store, config).with_source(source);

        assert!(RunController::from_ref(&ctx).run(&Decision::Proceed).await.is_err());
    }

    #[test]
    fn test_plan_ignores_purge_outside_commit() {
        let store = Arc::new(MemoryStore::new());
        let mut config = Config::default();
        config.run.purge_source = true;
        let controller = RunController::from_ref(&Context::new(store, config));
        assert!(!controller.plan().purge_source);
    }
}
