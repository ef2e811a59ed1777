//! Rule-driven file rewriting.
//!
//! A file's text is threaded through every applicable rewrite rule in
//! declaration order, then through the canonical name table. Each rule sees
//! the output of the rules before it. Once the text is settled, the symbols
//! required by the rules that fired (plus configured symbols the file uses
//! but never imports) are handed to the [`ImportManager`], one call per
//! module.
//!
//! Import failures do not roll anything back: the substitutions stay and
//! the failure is returned as an unresolved finding.
//!
//! Writing back goes through a temporary file in the target's directory that
//! is renamed over the original, so a file is either fully replaced or left
//! as it was.

use crate::error::ImportError;
use crate::imports::{self, ImportManager};
use crate::registry::{Rule, RuleKind, RuleSet, UsageImport};
use crate::scanner::{Finding, FindingKind, comment_guarded, extension_of, scan_with};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Result of rewriting one file in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOutcome {
    pub new_text: String,
    pub changed: bool,
    /// Ids of the rewrite rules whose pattern matched, in order.
    pub fired: Vec<String>,
    /// Import additions, by module.
    pub imports_added: BTreeMap<String, BTreeSet<String>>,
    pub unresolved: Vec<Finding>,
}

/// Applies a [`RuleSet`]'s rewrite rules to file contents.
#[derive(Debug, Clone, Copy)]
pub struct Rewriter<'a> {
    rules: &'a RuleSet,
}

impl<'a> Rewriter<'a> {
    pub fn new(rules: &'a RuleSet) -> Self {
        Self { rules }
    }

    /// Rewrites `text`, the contents of `file`. The extension of `file`
    /// selects the rules; nothing is read from or written to disk.
    pub fn rewrite(&self, file: &Path, text: &str) -> RewriteOutcome {
        let ext = extension_of(file);
        let mut working = text.to_string();
        let mut fired: Vec<&Rule> = Vec::new();
        let mut flag_only: Vec<&Rule> = Vec::new();

        for rule in self.rules.for_extension(&ext) {
            if rule.kind != RuleKind::Rewrite {
                continue;
            }
            let Some(replacement) = rule.replacement.as_deref() else {
                flag_only.push(rule);
                continue;
            };
            let replaced = match rule.pattern.replace_all(&working, replacement) {
                Cow::Owned(next) => Some(next),
                Cow::Borrowed(_) => None,
            };
            if let Some(next) = replaced {
                debug!(file = %file.display(), rule = %rule.id, "rule fired");
                working = next;
                fired.push(rule);
            }
        }

        let canonical = match self.rules.canonical().apply(&working) {
            Cow::Owned(next) => Some(next),
            Cow::Borrowed(_) => None,
        };
        if let Some(next) = canonical {
            debug!(file = %file.display(), "canonical names applied");
            working = next;
        }

        let mut unresolved = Vec::new();
        let needed = self.requirements(&working, &fired);
        let manager = ImportManager::new(self.rules.import_hosts());
        let mut imports_added = BTreeMap::new();

        for (module, symbols) in needed {
            match manager.ensure_imports(&working, &module, &symbols) {
                Ok(next) => {
                    if next != working {
                        debug!(file = %file.display(), module = %module, "imports updated");
                        imports_added.insert(module, symbols);
                    }
                    working = next;
                }
                Err(err) => {
                    let ImportError::UnsupportedImportShape { line, .. } = &err;
                    let line = *line;
                    let snippet = working
                        .lines()
                        .nth(line.saturating_sub(1))
                        .unwrap_or_default()
                        .trim()
                        .to_string();
                    let list: Vec<&str> = symbols.iter().map(String::as_str).collect();
                    unresolved.push(Finding {
                        file: file.to_path_buf(),
                        line,
                        kind: FindingKind::UnsupportedImportShape,
                        rule_id: None,
                        description: format!("missing {{ {} }}: {}", list.join(", "), err),
                        matched_text: module,
                        snippet,
                    });
                }
            }
        }

        unresolved.extend(scan_with(file, &working, &flag_only));
        unresolved.sort_by_key(|f| f.line);

        RewriteOutcome {
            changed: working != text,
            new_text: working,
            fired: fired.iter().map(|r| r.id.clone()).collect(),
            imports_added,
            unresolved,
        }
    }

    /// Symbols that must be imported after rewriting, grouped by module.
    ///
    /// Combines the requirements of fired rules with configured symbols the
    /// text uses outside imports and comments. Symbols already bound by any
    /// import, and symbols the file defines itself, are dropped.
    pub fn requirements(&self, text: &str, fired: &[&Rule]) -> BTreeMap<String, BTreeSet<String>> {
        let mut needed: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for req in fired.iter().filter_map(|r| r.requires.as_ref()) {
            needed
                .entry(req.module.clone())
                .or_default()
                .extend(req.symbols.iter().cloned());
        }

        let spans = imports::statement_spans(text);
        for usage in self.rules.usage_imports() {
            if is_referenced(usage, text, &spans) {
                needed
                    .entry(usage.module.clone())
                    .or_default()
                    .insert(usage.symbol.clone());
            }
        }

        let bound = imports::bound_symbols(text);
        let declared = imports::declared_symbols(text);
        for symbols in needed.values_mut() {
            symbols.retain(|s| !bound.contains(s) && !declared.contains(s));
        }
        needed.retain(|_, symbols| !symbols.is_empty());
        needed
    }
}

/// True when `usage`'s symbol appears on a line that is neither part of an
/// import statement nor behind a comment opener.
fn is_referenced(usage: &UsageImport, text: &str, import_spans: &[std::ops::Range<usize>]) -> bool {
    let mut offset = 0;
    for raw in text.split_inclusive('\n') {
        let start = offset;
        offset += raw.len();
        if import_spans.iter().any(|span| span.contains(&start)) {
            continue;
        }
        let line = raw.trim_end_matches(['\n', '\r']);
        if let Some(pos) = usage.is_used_in(line)
            && !comment_guarded(line, pos)
        {
            return true;
        }
    }
    false
}

/// Writes `contents` next to `path` in a temporary file, synced to disk.
///
/// The temporary file carries the original's permissions when it exists.
/// Dropping the returned handle removes it without touching `path`.
pub fn stage(path: &Path, contents: &str) -> io::Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".token-refactor-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    if let Ok(meta) = fs::metadata(path) {
        fs::set_permissions(tmp.path(), meta.permissions())?;
    }
    Ok(tmp)
}

/// Renames a staged file over `path`.
pub fn commit(staged: NamedTempFile, path: &Path) -> io::Result<()> {
    staged.persist(path).map(|_| ()).map_err(|e| e.error)
}

/// Replaces `path` with `contents` atomically.
pub fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    let staged = stage(path, contents)?;
    commit(staged, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;

    fn rules(toml: &str) -> RuleSet {
        RuleSet::load(&config::load_from_str(toml).unwrap()).unwrap()
    }

    const TOKENS: &str = r#"
        [[rules]]
        id = "weight-600"
        kind = "rewrite"
        pattern = '''fontWeight:\s*['"]600['"]'''
        replacement = "fontWeight: FONT_WEIGHT.semibold"
        requires = { module = "@tokens", symbols = ["FONT_WEIGHT"] }

        [[rules]]
        id = "radius-8"
        kind = "rewrite"
        pattern = '''borderRadius:\s*8\b'''
        replacement = "borderRadius: BORDER_RADIUS.base"
        requires = { module = "@tokens", symbols = ["BORDER_RADIUS"] }

        [canonical_names.names]
        "FONT_WEIGHT.semiBold" = "FONT_WEIGHT.semibold"

        [[imports]]
        symbol = "SPACING"
        module = "@tokens"

        [[imports]]
        symbol = "FONT_WEIGHT"
        module = "@tokens"
    "#;

    #[test]
    fn color_rewrite_without_requirement_adds_no_import() {
        let set = rules(
            r##"
            [[rules]]
            id = "hex-text-color"
            kind = "rewrite"
            pattern = '''color:\s*"#FFFFFF"'''
            replacement = "color: theme.colors.text"
            "##,
        );
        let source = "const styles = {\n  title: { color: \"#FFFFFF\" },\n};\n";
        let out = Rewriter::new(&set).rewrite(Path::new("Title.tsx"), source);
        assert!(out.changed);
        assert_eq!(
            out.new_text,
            "const styles = {\n  title: { color: theme.colors.text },\n};\n"
        );
        assert!(out.imports_added.is_empty());
        assert!(out.unresolved.is_empty());
    }

    #[test]
    fn used_symbol_is_merged_into_existing_import() {
        let set = rules(TOKENS);
        let source = "import { SPACING } from '@tokens';\n\nconst s = { fontWeight: FONT_WEIGHT.semibold, margin: SPACING.md };\n";
        let out = Rewriter::new(&set).rewrite(Path::new("Card.tsx"), source);
        assert!(out.changed);
        assert!(out.fired.is_empty());
        assert!(
            out.new_text
                .starts_with("import { FONT_WEIGHT, SPACING } from '@tokens';\n")
        );
    }

    #[test]
    fn multi_line_import_is_flagged_but_substitutions_stay() {
        let set = rules(TOKENS);
        let source = "import {\n  SPACING,\n} from '@tokens';\n\nconst s = { fontWeight: '600', margin: SPACING.md };\n";
        let out = Rewriter::new(&set).rewrite(Path::new("Card.tsx"), source);

        assert!(out.changed);
        assert!(out.new_text.contains("fontWeight: FONT_WEIGHT.semibold"));
        assert!(out.new_text.starts_with("import {\n  SPACING,\n} from '@tokens';\n"));
        assert_eq!(out.unresolved.len(), 1);
        let finding = &out.unresolved[0];
        assert_eq!(finding.kind, FindingKind::UnsupportedImportShape);
        assert_eq!(finding.line, 1);
        assert_eq!(finding.matched_text, "@tokens");
        assert!(finding.description.contains("FONT_WEIGHT"));
    }

    #[test]
    fn fired_rules_add_their_imports_after_last_import() {
        let set = rules(TOKENS);
        let source = "import React from 'react';\n\nconst s = { fontWeight: \"600\", borderRadius: 8 };\n";
        let out = Rewriter::new(&set).rewrite(Path::new("Card.jsx"), source);
        assert_eq!(out.fired, vec!["weight-600", "radius-8"]);
        assert_eq!(
            out.new_text,
            "import React from 'react';\nimport { BORDER_RADIUS, FONT_WEIGHT } from '@tokens';\n\nconst s = { fontWeight: FONT_WEIGHT.semibold, borderRadius: BORDER_RADIUS.base };\n"
        );
    }

    #[test]
    fn later_rules_see_earlier_output() {
        let set = rules(
            r#"
            [[rules]]
            id = "legacy-to-semi"
            kind = "rewrite"
            pattern = "WEIGHT_SEMI"
            replacement = "FONT_WEIGHT.semiBold"

            [[rules]]
            id = "semi-to-canonical"
            kind = "rewrite"
            pattern = '''FONT_WEIGHT\.semiBold\b'''
            replacement = "FONT_WEIGHT.semibold"
            "#,
        );
        let out = Rewriter::new(&set).rewrite(Path::new("a.ts"), "x = WEIGHT_SEMI;");
        assert_eq!(out.new_text, "x = FONT_WEIGHT.semibold;");
        assert_eq!(out.fired, vec!["legacy-to-semi", "semi-to-canonical"]);
    }

    #[test]
    fn canonical_table_runs_after_rules() {
        let set = rules(TOKENS);
        let source = "import { FONT_WEIGHT } from '@tokens';\nconst w = FONT_WEIGHT.semiBold;\n";
        let out = Rewriter::new(&set).rewrite(Path::new("a.ts"), source);
        assert_eq!(
            out.new_text,
            "import { FONT_WEIGHT } from '@tokens';\nconst w = FONT_WEIGHT.semibold;\n"
        );
    }

    #[test]
    fn flag_only_rule_reports_without_changing_text() {
        let set = rules(
            r#"
            [[rules]]
            id = "paper-title"
            kind = "rewrite"
            pattern = '''<(Title|Paragraph)\b'''
            description = "Title/Paragraph are deprecated"
            "#,
        );
        let source = "<View>\n  <Title>Hi</Title>\n  {/* <Paragraph> */}\n</View>\n";
        let out = Rewriter::new(&set).rewrite(Path::new("a.tsx"), source);
        assert!(!out.changed);
        assert_eq!(out.new_text, source);
        assert_eq!(out.unresolved.len(), 1);
        assert_eq!(out.unresolved[0].line, 2);
        assert_eq!(out.unresolved[0].rule_id.as_deref(), Some("paper-title"));
    }

    #[test]
    fn symbol_bound_elsewhere_is_not_imported_again() {
        let set = rules(TOKENS);
        let source = "import { SPACING } from '@legacy/tokens';\nconst m = SPACING.md;\n";
        let out = Rewriter::new(&set).rewrite(Path::new("a.ts"), source);
        assert!(!out.changed);
    }

    #[test]
    fn inline_definition_or_comment_use_needs_no_import() {
        let set = rules(TOKENS);
        let defined = "export const SPACING = { md: 12 };\nconst m = SPACING.md;\n";
        assert!(!Rewriter::new(&set).rewrite(Path::new("tokens.ts"), defined).changed);

        let commented = "const m = 4; // was SPACING.md\n";
        assert!(!Rewriter::new(&set).rewrite(Path::new("a.ts"), commented).changed);
    }

    #[test]
    fn rules_for_other_extensions_do_not_fire() {
        let set = rules(
            r#"
            [[rules]]
            id = "tsx-only"
            kind = "rewrite"
            pattern = "oldName"
            replacement = "newName"
            applies_to = ["tsx"]
            "#,
        );
        let out = Rewriter::new(&set).rewrite(Path::new("a.js"), "oldName();");
        assert!(!out.changed);
    }

    #[test]
    fn builtin_rules_are_idempotent() {
        let set = RuleSet::load(&config::builtin().unwrap()).unwrap();
        let rewriter = Rewriter::new(&set);
        let sources = [
            "import React from 'react';\nimport { Text } from 'react-native';\n\nconst styles = {\n  title: { fontWeight: '600', color: COLORS.text.secondary },\n  body: { fontWeight: \"400\", margin: SPACING.base },\n};\n",
            "import { COLORS } from '@presentation/theme/designTokens';\nconst a = { fontWeight: '700', padding: SPACING.sm };\nconst label = getString('title');\n",
            "const w = FONT_WEIGHT.extraBold;\n",
            "import {\n  COLORS,\n} from '@presentation/theme/designTokens';\nconst w = { fontWeight: '500' };\n",
        ];
        for source in sources {
            let once = rewriter.rewrite(Path::new("Screen.tsx"), source);
            let twice = rewriter.rewrite(Path::new("Screen.tsx"), &once.new_text);
            assert_eq!(once.new_text, twice.new_text, "second pass changed {source:?}");
            assert!(!twice.changed);
        }
    }

    #[test]
    fn builtin_rules_rewrite_weights_and_add_import() {
        let set = RuleSet::load(&config::builtin().unwrap()).unwrap();
        let source = "import React from 'react';\nconst s = { fontWeight: '700' };\n";
        let out = Rewriter::new(&set).rewrite(Path::new("Screen.tsx"), source);
        assert_eq!(
            out.new_text,
            "import React from 'react';\nimport { FONT_WEIGHT } from '@presentation/theme/designTokens';\nconst s = { fontWeight: FONT_WEIGHT.bold };\n"
        );
    }

    #[test]
    fn fired_rule_symbol_defined_in_file_is_not_imported() {
        let set = RuleSet::load(&config::builtin().unwrap()).unwrap();
        let source = "export const FONT_WEIGHT = { bold: '700' };\nconst s = { fontWeight: '700' };\n";
        let out = Rewriter::new(&set).rewrite(Path::new("designTokens.ts"), source);
        assert!(out.changed);
        assert!(out.imports_added.is_empty());
        assert!(out.unresolved.is_empty());
        assert_eq!(
            out.new_text,
            "export const FONT_WEIGHT = { bold: '700' };\nconst s = { fontWeight: FONT_WEIGHT.bold };\n"
        );
    }

    #[test]
    fn destructured_symbol_needs_no_import() {
        let set = RuleSet::load(&config::builtin().unwrap()).unwrap();
        let source = "import React from 'react';\nconst { SPACING } = useTheme();\nconst s = { padding: SPACING.md };\n";
        let out = Rewriter::new(&set).rewrite(Path::new("Card.tsx"), source);
        assert!(!out.changed);
        assert_eq!(out.new_text, source);
    }

    #[test]
    fn value_symbol_is_not_merged_into_type_import() {
        let set = RuleSet::load(&config::builtin().unwrap()).unwrap();
        let source = "import type { Theme } from '@presentation/theme/designTokens';\nconst s = { fontWeight: '600' };\n";
        let out = Rewriter::new(&set).rewrite(Path::new("Card.tsx"), source);
        assert!(out.unresolved.is_empty());
        assert_eq!(
            out.new_text,
            "import type { Theme } from '@presentation/theme/designTokens';\nimport { FONT_WEIGHT } from '@presentation/theme/designTokens';\nconst s = { fontWeight: FONT_WEIGHT.semibold };\n"
        );
    }

    #[test]
    fn crlf_file_keeps_crlf_line_endings() {
        let set = RuleSet::load(&config::builtin().unwrap()).unwrap();
        let source = "import React from 'react';\r\nconst s = { fontWeight: '700' };\r\n";
        let out = Rewriter::new(&set).rewrite(Path::new("Screen.tsx"), source);
        assert_eq!(
            out.new_text,
            "import React from 'react';\r\nimport { FONT_WEIGHT } from '@presentation/theme/designTokens';\r\nconst s = { fontWeight: FONT_WEIGHT.bold };\r\n"
        );
        assert_eq!(out.new_text.matches('\n').count(), out.new_text.matches("\r\n").count());
    }

    #[test]
    fn staged_write_that_never_commits_leaves_original() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.tsx");
        fs::write(&path, "original").unwrap();

        let staged = stage(&path, "rewritten").unwrap();
        assert_eq!(fs::read_to_string(staged.path()).unwrap(), "rewritten");
        drop(staged);

        assert_eq!(fs::read_to_string(&path).unwrap(), "original");
        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn write_atomic_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.tsx");
        fs::write(&path, "original").unwrap();
        write_atomic(&path, "rewritten").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "rewritten");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn write_atomic_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.js");
        fs::write(&path, "old").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        write_atomic(&path, "new").unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
    }
}
