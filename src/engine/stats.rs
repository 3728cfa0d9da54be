//! Run statistics and the run report.
//!
//! The scanner returns one [`CollectionStats`] per collection; the controller
//! folds them into a [`RunStats`]. Rendering is pure formatting.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use serde::Serialize;

use crate::config::RunMode;
use crate::engine::identity::OwnerId;
use crate::error::AppError;

/// Counters for one scanned collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectionStats {
    pub name: String,
    pub seen: usize,
    pub relocated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub deleted: usize,
    pub purge_failed: usize,
    pub scaffolds_created: usize,
    pub records_created: usize,
    /// Owners relocated (or, in PREVIEW, that would be) from this collection.
    #[serde(skip)]
    pub owners: BTreeSet<OwnerId>,
}

impl CollectionStats {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Sum of all per-collection counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub seen: usize,
    pub relocated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub deleted: usize,
    pub purge_failed: usize,
    pub scaffolds_created: usize,
    pub records_created: usize,
}

/// Statistics for a whole run. Lives only as long as the run.
#[derive(Debug, Clone)]
pub struct RunStats {
    pub mode: RunMode,
    pub purge_source: bool,
    pub collections: Vec<CollectionStats>,
    pub owners: BTreeSet<OwnerId>,
    /// The operator stopped the run; later documents were not processed.
    pub interrupted: bool,
}

impl RunStats {
    pub fn new(mode: RunMode, purge_source: bool) -> Self {
        Self {
            mode,
            purge_source,
            collections: Vec::new(),
            owners: BTreeSet::new(),
            interrupted: false,
        }
    }

    /// Folds one collection's result in, keeping declaration order.
    pub fn absorb(&mut self, mut collection: CollectionStats) {
        self.owners.append(&mut collection.owners);
        self.collections.push(collection);
    }

    pub fn totals(&self) -> Totals {
        self.collections.iter().fold(Totals::default(), |mut t, c| {
            t.seen += c.seen;
            t.relocated += c.relocated;
            t.skipped += c.skipped;
            t.failed += c.failed;
            t.deleted += c.deleted;
            t.purge_failed += c.purge_failed;
            t.scaffolds_created += c.scaffolds_created;
            t.records_created += c.records_created;
            t
        })
    }

    pub fn collection(&self, name: &str) -> Option<&CollectionStats> {
        self.collections.iter().find(|c| c.name == name)
    }

    pub fn distinct_owners(&self) -> usize {
        self.owners.len()
    }
}

/// Machine-readable summary, printed with `--json`.
#[derive(Debug, Serialize)]
pub struct Summary<'a> {
    pub mode: RunMode,
    pub purge_source: bool,
    pub interrupted: bool,
    pub collections: &'a [CollectionStats],
    pub totals: Totals,
    pub distinct_owners: usize,
    pub owner_sample: Vec<&'a OwnerId>,
}

impl<'a> Summary<'a> {
    pub fn new(stats: &'a RunStats, sample_limit: usize) -> Self {
        Self {
            mode: stats.mode,
            purge_source: stats.purge_source,
            interrupted: stats.interrupted,
            collections: &stats.collections,
            totals: stats.totals(),
            distinct_owners: stats.distinct_owners(),
            owner_sample: stats.owners.iter().take(sample_limit).collect(),
        }
    }
}

pub fn render_json(stats: &RunStats, sample_limit: usize) -> Result<String, AppError> {
    Ok(serde_json::to_string_pretty(&Summary::new(stats, sample_limit))?)
}

const RULE_WIDTH: usize = 72;

/// Human-readable report for stdout.
pub fn render_report(stats: &RunStats, sample_limit: usize) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail
    let _ = write_report(&mut out, stats, sample_limit);
    out
}

fn write_report(out: &mut String, stats: &RunStats, sample_limit: usize) -> std::fmt::Result {
    let heavy = "=".repeat(RULE_WIDTH);
    let light = "-".repeat(RULE_WIDTH);
    let purge = stats.purge_source;
    let totals = stats.totals();

    writeln!(out, "{heavy}")?;
    writeln!(
        out,
        "Run report ({}{}{})",
        stats.mode,
        if purge { ", purge source" } else { "" },
        if stats.interrupted { ", INTERRUPTED" } else { "" }
    )?;
    writeln!(out, "{heavy}")?;

    let mut header = format!(
        "{:<24} {:>8} {:>10} {:>8} {:>8}",
        "collection", "seen", "relocated", "skipped", "failed"
    );
    if purge {
        let _ = write!(header, " {:>8} {:>13}", "deleted", "purge failed");
    }
    writeln!(out, "{header}")?;
    writeln!(out, "{light}")?;

    for c in &stats.collections {
        let mut line = format!(
            "{:<24} {:>8} {:>10} {:>8} {:>8}",
            c.name, c.seen, c.relocated, c.skipped, c.failed
        );
        if purge {
            let _ = write!(line, " {:>8} {:>13}", c.deleted, c.purge_failed);
        }
        writeln!(out, "{line}")?;
    }

    writeln!(out, "{light}")?;
    let mut line = format!(
        "{:<24} {:>8} {:>10} {:>8} {:>8}",
        "TOTAL", totals.seen, totals.relocated, totals.skipped, totals.failed
    );
    if purge {
        let _ = write!(line, " {:>8} {:>13}", totals.deleted, totals.purge_failed);
    }
    writeln!(out, "{line}")?;
    writeln!(out)?;

    if stats.mode.is_commit() {
        writeln!(out, "Owner scaffolds created: {}", totals.scaffolds_created)?;
        if totals.records_created > 0 {
            writeln!(out, "Owner records created: {}", totals.records_created)?;
        }
    }
    writeln!(out, "Distinct owners: {}", stats.distinct_owners())?;
    for owner in stats.owners.iter().take(sample_limit) {
        writeln!(out, "  - {owner}")?;
    }
    if stats.distinct_owners() > sample_limit {
        writeln!(out, "  ... and {} more", stats.distinct_owners() - sample_limit)?;
    }
    writeln!(out, "{heavy}")?;

    write_hints(out, stats, &totals)
}

fn write_hints(out: &mut String, stats: &RunStats, totals: &Totals) -> std::fmt::Result {
    if !stats.mode.is_commit() {
        writeln!(out, "This was a PREVIEW; nothing was written. To relocate for real:")?;
        writeln!(out, "  rehome relocate --commit")?;
        if totals.relocated > 0 {
            writeln!(out, "To also delete each source document once it is relocated:")?;
            writeln!(out, "  rehome relocate --commit --purge-source")?;
        }
        return Ok(());
    }

    if stats.interrupted {
        writeln!(
            out,
            "The run was interrupted; remaining documents were not processed. \
             Re-running resumes where this run stopped."
        )?;
    }
    if totals.failed > 0 {
        writeln!(
            out,
            "{} document(s) failed; re-running resumes where this run stopped.",
            totals.failed
        )?;
    }
    if totals.purge_failed > 0 {
        writeln!(
            out,
            "{} source document(s) were relocated but could not be deleted. They now exist \
             twice and need manual reconciliation (see the warnings in the log).",
            totals.purge_failed
        )?;
    }
    if !stats.purge_source && totals.relocated > 0 {
        writeln!(out, "Source documents still exist at their original location.")?;
    }
    Ok(())
}
