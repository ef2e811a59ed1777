//! Run results and their rendered document.

use crate::batch::Mode;
use crate::config::ReportDef;
use crate::scanner::{Finding, FindingKind};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::PathBuf;

/// Everything one run found or changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub mode: Mode,
    pub files_scanned: usize,
    /// Files rewritten (or, for a dry run, that would be), in walk order.
    pub files_changed: Vec<PathBuf>,
    /// Findings keyed by root-relative path, each list in discovery order.
    pub per_file: BTreeMap<PathBuf, Vec<Finding>>,
}

/// Counts derived from a [`Report`].
#[derive(Debug, Default, Serialize)]
pub struct Summary {
    pub mode: Mode,
    pub files_scanned: usize,
    pub files_with_issues: usize,
    pub total_findings: usize,
    pub files_rewritten: usize,
    pub by_kind: BTreeMap<FindingKind, usize>,
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    summary: Summary,
    files_changed: &'a [PathBuf],
    findings: Vec<&'a Finding>,
}

impl Report {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn push(&mut self, finding: Finding) {
        self.per_file
            .entry(finding.file.clone())
            .or_default()
            .push(finding);
    }

    pub fn extend(&mut self, findings: impl IntoIterator<Item = Finding>) {
        for finding in findings {
            self.push(finding);
        }
    }

    pub fn total_files_with_issues(&self) -> usize {
        self.per_file.values().filter(|f| !f.is_empty()).count()
    }

    pub fn total_findings(&self) -> usize {
        self.per_file.values().map(Vec::len).sum()
    }

    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.per_file.values().flatten()
    }

    pub fn counts_by_kind(&self) -> BTreeMap<FindingKind, usize> {
        let mut counts = BTreeMap::new();
        for finding in self.findings() {
            *counts.entry(finding.kind).or_insert(0) += 1;
        }
        counts
    }

    /// True when some file could not be read, merged or written.
    pub fn has_failures(&self) -> bool {
        self.findings().any(|f| f.kind.is_failure())
    }

    pub fn summary(&self) -> Summary {
        Summary {
            mode: self.mode,
            files_scanned: self.files_scanned,
            files_with_issues: self.total_files_with_issues(),
            total_findings: self.total_findings(),
            files_rewritten: self.files_changed.len(),
            by_kind: self.counts_by_kind(),
        }
    }

    /// One-line outcome printed at the end of a run.
    pub fn summary_line(&self) -> String {
        if self.total_findings() == 0 {
            "no problems found".to_string()
        } else {
            format!(
                "Found {} issue(s) in {} file(s)",
                self.total_findings(),
                self.total_files_with_issues()
            )
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&JsonReport {
            summary: self.summary(),
            files_changed: &self.files_changed,
            findings: self.findings().collect(),
        })
    }
}

/// Renders `report` as a Markdown document.
///
/// Files appear sorted by path and findings in discovery order, so the same
/// report always renders to the same bytes.
pub fn render(report: &Report, def: &ReportDef) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}\n", def.title);
    let _ = writeln!(out, "- Mode: {}", report.mode.as_str());
    let _ = writeln!(out, "- Files scanned: {}", report.files_scanned);
    let _ = writeln!(out, "- Files with issues: {}", report.total_files_with_issues());
    let _ = writeln!(out, "- Total findings: {}", report.total_findings());
    for (kind, count) in report.counts_by_kind() {
        if kind.is_failure() {
            let _ = writeln!(out, "- {}: {}", kind.as_str(), count);
        }
    }

    if !report.files_changed.is_empty() {
        let heading = match report.mode {
            Mode::DryRun => "Files that would change",
            _ => "Rewritten files",
        };
        let _ = writeln!(out, "\n## {}\n", heading);
        for path in &report.files_changed {
            let _ = writeln!(out, "- `{}`", path.display());
        }
    }

    if !def.reference.is_empty() {
        out.push_str("\n## Correct pattern\n\n```tsx\n");
        for line in &def.reference {
            let _ = writeln!(out, "{}", line);
        }
        out.push_str("```\n");
    }

    out.push_str("\n## Findings\n");
    if report.total_findings() == 0 {
        out.push_str("\nNo problems found.\n");
    }
    for (path, findings) in report.per_file.iter().filter(|(_, f)| !f.is_empty()) {
        let _ = writeln!(out, "\n### {} ({})\n", path.display(), findings.len());
        for finding in findings {
            render_finding(&mut out, finding);
        }
    }

    if !def.actions.is_empty() {
        out.push_str("\n## Recommended actions\n\n");
        for (n, action) in def.actions.iter().enumerate() {
            let _ = writeln!(out, "{}. {}", n + 1, action);
        }
    }

    if !def.checklist.is_empty() {
        out.push_str("\n## Checklist\n\n");
        for item in &def.checklist {
            let _ = writeln!(out, "- [ ] {}", item);
        }
    }

    out
}

fn render_finding(out: &mut String, finding: &Finding) {
    let label = if finding.description.is_empty() {
        finding.rule_id.as_deref().unwrap_or(finding.kind.as_str())
    } else {
        finding.description.as_str()
    };
    let location = match finding.line {
        0 => "File".to_string(),
        n => format!("Line {}", n),
    };
    let _ = write!(out, "- {}: {}", location, label);
    if finding.kind.is_failure() {
        let _ = write!(out, " [{}]", finding.kind.as_str());
    }
    if !finding.snippet.is_empty() {
        let _ = write!(out, "\n  `{}`", finding.snippet);
    }
    out.push('\n');
}
