//! Tree walking and per-file orchestration.
//!
//! Files are processed one at a time in walk order. Anything that goes wrong
//! with a single file (unreadable, not UTF-8, cannot be written back) becomes
//! a finding on that file and the batch moves on. Only a missing root aborts
//! a run.

use crate::config::FilesDef;
use crate::registry::{RuleSet, normalize_extension};
use crate::report::Report;
use crate::rewriter::{RewriteOutcome, Rewriter, write_atomic};
use crate::scanner::{Finding, FindingKind, extension_of, scan};
use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Directory names skipped unless default excludes are turned off.
pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &["node_modules", "bower_components", "Pods"];

/// What a run does with the files it visits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Scan with detect rules; never write.
    #[default]
    Audit,
    /// Rewrite and write changed files back.
    Fix,
    /// Rewrite in memory only; report what would change.
    DryRun,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Audit => "audit",
            Mode::Fix => "fix",
            Mode::DryRun => "dry-run",
        }
    }

    fn rewrites(self) -> bool {
        !matches!(self, Mode::Audit)
    }
}

/// Which files a walk yields.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Extensions to include, normalized (no dot, lowercase).
    pub extensions: BTreeSet<String>,
    /// Entries whose name or root-relative path matches are skipped.
    pub excludes: Vec<glob::Pattern>,
    /// Skip dot-prefixed entries and [`DEFAULT_EXCLUDED_DIRS`].
    pub default_excludes: bool,
}

impl WalkOptions {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| normalize_extension(e.as_ref()))
                .collect(),
            excludes: Vec::new(),
            default_excludes: true,
        }
    }

    /// Options taken from a configuration's `[files]` table.
    pub fn from_config(files: &FilesDef) -> Result<Self> {
        Self::new(&files.extensions).exclude(&files.exclude)
    }

    /// Adds exclusion globs.
    pub fn exclude<S: AsRef<str>>(mut self, patterns: &[S]) -> Result<Self> {
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let compiled = glob::Pattern::new(pattern)
                .with_context(|| format!("invalid exclude pattern '{}'", pattern))?;
            self.excludes.push(compiled);
        }
        Ok(self)
    }

    fn is_excluded(&self, entry: &walkdir::DirEntry, root: &Path) -> bool {
        // The root itself is never excluded, even when it is ".".
        if entry.depth() == 0 {
            return false;
        }
        let name = entry.file_name().to_string_lossy();
        if self.default_excludes
            && (name.starts_with('.') || DEFAULT_EXCLUDED_DIRS.contains(&name.as_ref()))
        {
            return true;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        self.excludes
            .iter()
            .any(|p| p.matches(&name) || p.matches_path(relative))
    }

    fn includes(&self, path: &Path) -> bool {
        self.extensions.contains(&extension_of(path))
    }
}

/// Files found under `root` in walk order, plus one finding per entry the
/// walk could not read.
pub fn collect_files(root: &Path, options: &WalkOptions) -> (Vec<PathBuf>, Vec<Finding>) {
    let mut files = Vec::new();
    let mut failures = Vec::new();

    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !options.is_excluded(e, root))
    {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file() && options.includes(entry.path()) {
                    files.push(entry.into_path());
                }
            }
            Err(err) => {
                let path = err.path().unwrap_or(root);
                warn!(path = %path.display(), "cannot walk entry: {err}");
                failures.push(Finding::file_level(
                    relative_to(root, path),
                    FindingKind::FileReadError,
                    format!("cannot read directory entry: {err}"),
                ));
            }
        }
    }

    (files, failures)
}

/// Runs `mode` over every file under `root`, writing every changed file.
pub fn run(root: &Path, mode: Mode, rules: &RuleSet, options: &WalkOptions) -> Result<Report> {
    run_with(root, mode, rules, options, |_, _| true)
}

/// Like [`run`], but in fix mode asks `confirm` before writing each changed
/// file. Declined files are left alone; their unresolved findings are still
/// reported.
pub fn run_with<F>(
    root: &Path,
    mode: Mode,
    rules: &RuleSet,
    options: &WalkOptions,
    confirm: F,
) -> Result<Report>
where
    F: FnMut(&Path, &RewriteOutcome) -> bool,
{
    run_with_writer(root, mode, rules, options, confirm, write_atomic)
}

/// Like [`run_with`], with `write` putting each confirmed file on disk.
pub fn run_with_writer<F, W>(
    root: &Path,
    mode: Mode,
    rules: &RuleSet,
    options: &WalkOptions,
    mut confirm: F,
    mut write: W,
) -> Result<Report>
where
    F: FnMut(&Path, &RewriteOutcome) -> bool,
    W: FnMut(&Path, &str) -> io::Result<()>,
{
    if !root.is_dir() {
        bail!("root directory {} does not exist", root.display());
    }

    let (files, failures) = collect_files(root, options);
    let rewriter = Rewriter::new(rules);
    let mut report = Report::new(mode);
    report.extend(failures);

    for path in files {
        let rel = relative_to(root, &path);
        report.files_scanned += 1;

        let text = match read_text(&path) {
            Ok(text) => text,
            Err(reason) => {
                warn!(file = %rel.display(), "{reason}");
                report.push(Finding::file_level(rel, FindingKind::FileReadError, reason));
                continue;
            }
        };

        if !mode.rewrites() {
            report.extend(scan(rel, &text, rules));
            continue;
        }

        let outcome = rewriter.rewrite(rel, &text);
        if outcome.changed {
            match mode {
                Mode::DryRun => report.files_changed.push(rel.to_path_buf()),
                _ if confirm(rel, &outcome) => match write(&path, &outcome.new_text) {
                    Ok(()) => {
                        debug!(file = %rel.display(), "rewritten");
                        report.files_changed.push(rel.to_path_buf());
                    }
                    Err(err) => {
                        warn!(file = %rel.display(), "write failed: {err}");
                        report.push(Finding::file_level(
                            rel,
                            FindingKind::WriteFailure,
                            format!("cannot write file: {err}"),
                        ));
                    }
                },
                _ => debug!(file = %rel.display(), "skipped"),
            }
        }
        report.extend(outcome.unresolved);
    }

    Ok(report)
}

fn read_text(path: &Path) -> Result<String, String> {
    let bytes = fs::read(path).map_err(|e| format!("cannot read file: {e}"))?;
    String::from_utf8(bytes).map_err(|e| format!("file is not valid UTF-8: {e}"))
}

fn relative_to<'p>(root: &Path, path: &'p Path) -> &'p Path {
    path.strip_prefix(root).unwrap_or(path)
}
