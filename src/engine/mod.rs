//! The relocation engine.
//!
//! Components, leaves first:
//!
//! - [`identity`] - owner resolution from an ordered list of candidate fields
//! - [`address`] - destination paths under the owner hierarchy
//! - [`guard`] - skips documents whose destination already exists
//! - [`scaffold`] - creates the per-owner root document before its children
//! - [`provenance`] - opt-in migration stamps and per-owner records
//! - [`interrupt`] - Ctrl+C handling for the length of a COMMIT run
//! - [`scanner`] - runs the above for each document of one collection
//! - [`controller`] - PREVIEW / COMMIT runs over the configured collections
//! - [`stats`] - counters and the run report
//! - [`audit`] - read-only normalisation checks
//!
//! Every component is resolved from [`Context`](crate::context::Context):
//!
//! ```ignore
//! let ctx = Context::new(store, config);
//! let outcome = RunController::from_ref(&ctx).run(&GraceDelay).await?;
//! ```

pub mod address;
pub mod audit;
pub mod controller;
pub mod guard;
pub mod identity;
pub mod interrupt;
pub mod provenance;
pub mod scaffold;
pub mod scanner;
pub mod stats;

pub use address::{build_path, DestinationAddress, PathBuilder};
pub use audit::{render_audit, NormalizationAudit, Problem, TargetReport};
pub use controller::{Confirmation, Decision, GraceDelay, RunController, RunOutcome, RunPlan};
pub use guard::IdempotencyGuard;
pub use identity::{EmailDirectory, OwnerId, OwnerResolver, Resolution, Rule, StringField, UidShape};
pub use interrupt::{Interrupt, FORCED_EXIT_CODE};
pub use provenance::{owner_record_fields, stamp_document, OwnerRecords};
pub use scaffold::{scaffold_fields, Ensured, ScaffoldEnsurer};
pub use scanner::CollectionScanner;
pub use stats::{render_json, render_report, CollectionStats, RunStats, Totals};
