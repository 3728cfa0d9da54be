//! Relocate command handler.

use clap::Args;
use color_eyre::Result;

use crate::config::RunOverrides;
use crate::context::Context;
use crate::di::FromRef;
use crate::engine::{render_json, render_report, GraceDelay, RunController, RunOutcome, RunStats};
use crate::error::AppError;
use crate::store;

use super::App;

/// Relocate documents into the owner hierarchy.
///
/// Without `--commit` this is a PREVIEW: everything is read, nothing is
/// written.
#[derive(Args, Debug, Clone)]
pub struct RelocateArgs {
    /// Write to the store (default is PREVIEW)
    #[arg(long)]
    pub commit: bool,

    /// Delete each source document after relocating it (COMMIT only)
    #[arg(long)]
    pub purge_source: bool,

    /// Collection to process, in order; repeatable. Replaces `run.collections`
    #[arg(long = "collection", value_name = "NAME")]
    pub collections: Vec<String>,

    /// Only relocate documents of this owner; repeatable
    #[arg(long = "owner", value_name = "OWNER_ID")]
    pub owners: Vec<String>,

    /// Seconds to wait for Ctrl+C before a COMMIT run starts writing
    #[arg(long, value_name = "SECONDS")]
    pub grace_seconds: Option<u64>,

    /// Print the summary as JSON instead of the text report
    #[arg(long)]
    pub json: bool,
}

impl RelocateArgs {
    pub fn overrides(&self) -> RunOverrides {
        RunOverrides {
            commit: self.commit,
            purge_source: self.purge_source,
            collections: self.collections.clone(),
            owners: self.owners.clone(),
            grace_seconds: self.grace_seconds,
        }
    }
}

impl App {
    /// Run a relocation and print its report.
    pub async fn run_relocate(&self, args: &RelocateArgs) -> Result<()> {
        let config = self.load_config()?.with_overrides(&args.overrides());
        config.validate()?;

        if config.run.purge_source && !config.run.mode.is_commit() {
            tracing::warn!("--purge-source has no effect without --commit");
        }

        let sample_limit = config.run.sample_limit;
        let store_config = config.store.clone();
        let source_config = config.source_store.clone();
        if source_config.is_some() {
            tracing::info!("Reading source documents from [source_store]");
        }

        let outcome = store::with_stores(
            &store_config,
            source_config.as_ref(),
            |store, source| async move {
                let ctx = Context::new(store, config).with_source(source);
                RunController::from_ref(&ctx).run(&GraceDelay).await
            },
        )
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Run failed: {}", e))?;

        let stats = completed(outcome)?;

        if args.json {
            println!("{}", render_json(&stats, sample_limit)?);
        } else {
            print!("{}", render_report(&stats, sample_limit));
        }

        if stats.interrupted {
            return Err(AppError::Interrupted.into());
        }
        Ok(())
    }
}

fn completed(outcome: RunOutcome) -> Result<RunStats, AppError> {
    match outcome {
        RunOutcome::Completed(stats) => Ok(stats),
        RunOutcome::Aborted => Err(AppError::Aborted),
    }
}
