//! Read-only normalisation audit.
//!
//! After a restructuring, checks that target collections point at the
//! canonical owner and carry the expected field values, and that no legacy
//! owner id survives anywhere in a document. Never writes.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::config::{AuditTarget, Config};
use crate::context::{AppStore, Context};
use crate::di::FromContext;
use crate::store::{CollectionPath, Document, QueryExt};

/// One thing wrong with one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Problem {
    /// An expected field is missing or holds another value.
    FieldMismatch {
        field: String,
        expected: String,
        found: Option<JsonValue>,
    },
    /// A candidate owner field names someone other than the canonical owner.
    ForeignOwner { field: String, owner: String },
    /// A legacy owner id appears somewhere in the document.
    LegacyOwner { location: String, legacy: String },
}

impl std::fmt::Display for Problem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Problem::FieldMismatch { field, expected, found: Some(found) } => {
                write!(f, "{field} is {found}, expected \"{expected}\"")
            }
            Problem::FieldMismatch { field, expected, found: None } => {
                write!(f, "{field} is missing, expected \"{expected}\"")
            }
            Problem::ForeignOwner { field, owner } => {
                write!(f, "{field} names non-canonical owner {owner}")
            }
            Problem::LegacyOwner { location, legacy } => {
                write!(f, "legacy owner id {legacy} at {location}")
            }
        }
    }
}

/// A document with at least one problem.
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub doc_id: String,
    pub problems: Vec<Problem>,
}

/// Result for one audit target.
#[derive(Debug, Clone, Serialize)]
pub struct TargetReport {
    pub path: String,
    pub documents: usize,
    pub findings: Vec<Finding>,
    /// Set when the target could not be fully listed.
    pub error: Option<String>,
}

impl TargetReport {
    fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            documents: 0,
            findings: Vec::new(),
            error: None,
        }
    }
}

#[derive(FromContext, Clone)]
pub struct NormalizationAudit {
    store: AppStore,
    config: Arc<Config>,
}

impl NormalizationAudit {
    /// Audits every configured target in order. Listing failures are
    /// recorded in that target's report; the audit continues.
    pub async fn run(&self) -> Vec<TargetReport> {
        let mut reports = Vec::with_capacity(self.config.audit.targets.len());
        for target in &self.config.audit.targets {
            reports.push(self.audit_target(target).await);
        }
        reports
    }

    async fn audit_target(&self, target: &AuditTarget) -> TargetReport {
        let mut report = TargetReport::new(&target.path);

        let collection = match CollectionPath::parse(&target.path) {
            Ok(path) => path,
            Err(e) => {
                report.error = Some(e.to_string());
                return report;
            }
        };

        let mut documents = self
            .store
            .collection(collection)
            .page_size(self.config.run.page_size)
            .stream();

        while let Some(next) = documents.next().await {
            match next {
                Ok(document) => {
                    report.documents += 1;
                    let problems = self.inspect(target, &document);
                    if !problems.is_empty() {
                        tracing::debug!(path = %document.path(), problems = problems.len(), "Audit finding");
                        report.findings.push(Finding {
                            doc_id: document.id().to_string(),
                            problems,
                        });
                    }
                }
                Err(e) => {
                    tracing::error!(path = %target.path, error = %e, "Failed to list audit target");
                    report.error = Some(e.to_string());
                    break;
                }
            }
        }

        tracing::info!(
            path = %target.path,
            documents = report.documents,
            with_problems = report.findings.len(),
            "Audited"
        );
        report
    }

    fn inspect(&self, target: &AuditTarget, document: &Document) -> Vec<Problem> {
        let fields = document.fields();
        let mut problems = Vec::new();

        for (field, expected) in &target.expect {
            let found = fields.get(field);
            if found.and_then(JsonValue::as_str) != Some(expected.as_str()) {
                problems.push(Problem::FieldMismatch {
                    field: field.clone(),
                    expected: expected.clone(),
                    found: found.cloned(),
                });
            }
        }

        if let (true, Some(canonical)) = (target.check_owner, &self.config.audit.canonical_owner) {
            for field in &self.config.run.candidate_owner_fields {
                let Some(owner) = fields.get(field).and_then(JsonValue::as_str) else {
                    continue;
                };
                if !owner.is_empty() && owner.trim() != canonical.as_str() {
                    problems.push(Problem::ForeignOwner {
                        field: field.clone(),
                        owner: owner.to_string(),
                    });
                }
            }
        }

        let aliases = &self.config.owners.aliases;
        if !aliases.is_empty() {
            for (name, value) in fields {
                find_legacy(name, value, aliases, &mut problems);
            }
        }

        problems
    }
}

/// Walks `value` looking for strings that contain a legacy id.
fn find_legacy(
    location: &str,
    value: &JsonValue,
    aliases: &BTreeMap<String, String>,
    problems: &mut Vec<Problem>,
) {
    match value {
        JsonValue::String(s) => {
            for legacy in aliases.keys().filter(|legacy| s.contains(legacy.as_str())) {
                problems.push(Problem::LegacyOwner {
                    location: location.to_string(),
                    legacy: legacy.clone(),
                });
            }
        }
        JsonValue::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                find_legacy(&format!("{location}[{i}]"), item, aliases, problems);
            }
        }
        JsonValue::Object(map) => {
            for (key, item) in map {
                find_legacy(&format!("{location}.{key}"), item, aliases, problems);
            }
        }
        _ => {}
    }
}

/// Human-readable audit report.
pub fn render_audit(reports: &[TargetReport]) -> String {
    let mut out = String::new();
    for report in reports {
        for finding in &report.findings {
            let _ = writeln!(out, "x {}/{}", report.path, finding.doc_id);
            for problem in &finding.problems {
                let _ = writeln!(out, "    - {problem}");
            }
        }
        let _ = writeln!(out, "{}", report.path);
        let _ = writeln!(out, "  documents:     {}", report.documents);
        let _ = writeln!(out, "  with problems: {}", report.findings.len());
        if let Some(error) = &report.error {
            let _ = writeln!(out, "  incomplete:    {error}");
        }
        let _ = writeln!(out, "{}", "-".repeat(40));
    }

    let clean = reports
        .iter()
        .all(|r| r.findings.is_empty() && r.error.is_none());
    let _ = writeln!(
        out,
        "Audit finished: {}",
        if clean { "no problems found" } else { "problems found" }
    );
    out
}
