//! Line-oriented pattern scanner.
//!
//! Applies detect rules to each line of a file and records one [`Finding`]
//! per rule that matches the line. A match is dropped when `//` or `/*`
//! appears before it on the same line. Comment state is not carried across
//! lines, so text inside a multi-line block comment is still reported.

use crate::registry::{Rule, RuleKind, RuleSet, normalize_extension};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// What produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingKind {
    /// A rule matched and was not (or could not be) fixed.
    Detection,
    /// The file could not be read or is not UTF-8.
    FileReadError,
    /// A required import could not be merged safely.
    UnsupportedImportShape,
    /// The rewritten file could not be written back.
    WriteFailure,
}

impl FindingKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FindingKind::Detection => "detection",
            FindingKind::FileReadError => "file-read-error",
            FindingKind::UnsupportedImportShape => "unsupported-import-shape",
            FindingKind::WriteFailure => "write-failure",
        }
    }

    /// Kinds that mean the tool failed to do its job on a file.
    pub fn is_failure(self) -> bool {
        !matches!(self, FindingKind::Detection)
    }
}

/// One occurrence of something that needs a human.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    /// File the finding belongs to.
    pub file: PathBuf,
    /// Line number, 1-indexed. Zero for findings about the whole file.
    pub line: usize,
    pub kind: FindingKind,
    /// Rule that matched, for detections.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    pub description: String,
    /// Exact text the rule matched.
    pub matched_text: String,
    /// The whole line, trimmed.
    pub snippet: String,
}

impl Finding {
    /// A finding that is not tied to a line.
    pub fn file_level(file: &Path, kind: FindingKind, description: impl Into<String>) -> Self {
        Self {
            file: file.to_path_buf(),
            line: 0,
            kind,
            rule_id: None,
            description: description.into(),
            matched_text: String::new(),
            snippet: String::new(),
        }
    }
}

/// Scans `text` with the detect rules that apply to `file`'s extension.
///
/// Findings come out line by line; within a line, in rule declaration order.
/// Nothing is deduplicated.
pub fn scan(file: &Path, text: &str, rules: &RuleSet) -> Vec<Finding> {
    let ext = extension_of(file);
    let detectors: Vec<&Rule> = rules
        .for_extension(&ext)
        .into_iter()
        .filter(|r| r.kind == RuleKind::Detect)
        .collect();
    scan_with(file, text, &detectors)
}

/// Scans `text` against an explicit rule list, ignoring rule kinds.
pub fn scan_with(file: &Path, text: &str, rules: &[&Rule]) -> Vec<Finding> {
    let mut findings = Vec::new();
    if rules.is_empty() {
        return findings;
    }

    for (idx, line) in text.lines().enumerate() {
        for rule in rules {
            let Some(m) = rule.pattern.find(line) else {
                continue;
            };
            if comment_guarded(line, m.start()) {
                continue;
            }
            findings.push(Finding {
                file: file.to_path_buf(),
                line: idx + 1,
                kind: FindingKind::Detection,
                rule_id: Some(rule.id.clone()),
                description: rule.description.clone(),
                matched_text: m.as_str().to_string(),
                snippet: line.trim().to_string(),
            });
        }
    }

    findings
}

/// True when a comment opener precedes byte offset `start` on `line`.
pub fn comment_guarded(line: &str, start: usize) -> bool {
    let before = &line[..start.min(line.len())];
    before.contains("//") || before.contains("/*")
}

/// Normalized extension of `path`, empty when it has none.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(normalize_extension)
        .unwrap_or_default()
}

/// 1-indexed line containing byte `offset`.
pub fn line_of_offset(source: &str, offset: usize) -> usize {
    let end = offset.min(source.len());
    source.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() + 1
}
