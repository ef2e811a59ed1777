//! Import list maintenance.
//!
//! Only ES-style import statements are recognized, and only one shape is ever
//! edited: a single-line `import { A, B } from 'module'` (optionally with a
//! default binding in front). Anything else that imports the target module,
//! such as a list spread over several lines, an aliased member or a namespace
//! import, is reported as [`ImportError::UnsupportedImportShape`] and left
//! alone. Type-only imports never receive value symbols; a separate import
//! is added next to them.
//!
//! The manager only ever adds symbols. Existing lists keep their order until
//! a symbol has to be added; then the list is rewritten sorted.

use crate::error::ImportError;
use crate::registry::ImportHost;
use crate::scanner::line_of_offset;
use regex::Regex;
use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::LazyLock;

static STATEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)^[ \t]*import\b(?:(?P<clause>[^'";]*?)\bfrom)?\s*(?P<quote>['"])(?P<module>[^'"\n]+)['"][ \t]*(?P<semi>;?)"#,
    )
    .expect("import statement pattern")
});

static ALIAS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bas\b").expect("alias pattern"));

static DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:(?:const|let|var)\s*(?P<pattern>[{\[])|(?:const|let|var|function\s*\*?|class)\s+(?P<name>[A-Za-z_$][\w$]*))",
    )
    .expect("declaration pattern")
});

/// One import statement as found in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportStatement {
    /// Byte span of the whole statement.
    pub span: Range<usize>,
    pub module: String,
    /// Span of the text between `import` and `from`; `None` for side-effect imports.
    pub clause: Option<Range<usize>>,
    pub quote: char,
    pub semicolon: bool,
    /// `import type ...`; binds types only.
    pub type_only: bool,
}

/// The editable symbol list of a single-line brace import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBlock {
    /// 1-indexed line of the statement.
    pub line: usize,
    /// Byte span between `{` and `}`, exclusive of both.
    pub list: Range<usize>,
    pub symbols: Vec<String>,
}

/// Finds every top-level import statement, in source order.
pub fn statements(content: &str) -> Vec<ImportStatement> {
    STATEMENT
        .captures_iter(content)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(ImportStatement {
                span: whole.range(),
                module: caps.name("module")?.as_str().to_string(),
                clause: caps.name("clause").map(|c| c.range()),
                quote: caps.name("quote")?.as_str().chars().next()?,
                semicolon: caps.name("semi").is_some_and(|s| !s.as_str().is_empty()),
                type_only: caps.name("clause").is_some_and(|c| is_type_only(c.as_str())),
            })
        })
        .collect()
}

/// Locates the editable import block for `module`.
///
/// The first single-line brace import of the module wins. When the module is
/// imported only in shapes the manager does not edit, the first of those is
/// reported as an error. Type-only imports are not candidates.
pub fn find_import_block(content: &str, module: &str) -> Result<Option<ImportBlock>, ImportError> {
    let mut unsupported = None;
    for stmt in statements(content)
        .iter()
        .filter(|s| s.module == module && !s.type_only)
    {
        match classify(content, stmt) {
            Ok(block) => return Ok(Some(block)),
            Err(err) => {
                unsupported.get_or_insert(err);
            }
        }
    }
    match unsupported {
        Some(err) => Err(err),
        None => Ok(None),
    }
}

fn classify(content: &str, stmt: &ImportStatement) -> Result<ImportBlock, ImportError> {
    let line = line_of_offset(content, stmt.span.start);
    let unsupported = |reason: &'static str| ImportError::UnsupportedImportShape {
        module: stmt.module.clone(),
        line,
        reason,
    };

    let Some(clause) = stmt.clause.clone() else {
        return Err(unsupported("a side-effect import"));
    };
    let text = &content[clause.clone()];
    if text.contains('\n') {
        return Err(unsupported("split across several lines"));
    }
    let (Some(open), Some(close)) = (text.find('{'), text.rfind('}')) else {
        return Err(unsupported("not a brace import"));
    };
    if close < open || text[open + 1..].contains('{') {
        return Err(unsupported("not a brace import"));
    }
    let rest = format!("{}{}", &text[..open], &text[close + 1..]);
    if rest.contains('*') {
        return Err(unsupported("a namespace import"));
    }

    let inner = &text[open + 1..close];
    if ALIAS.is_match(inner) {
        return Err(unsupported("aliased"));
    }
    let symbols: Vec<String> = inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if !symbols.iter().all(|s| is_identifier(s)) {
        return Err(unsupported("not a plain symbol list"));
    }

    Ok(ImportBlock {
        line,
        list: clause.start + open + 1..clause.start + close,
        symbols,
    })
}

/// Every local name bound by an import statement, in any shape.
pub fn bound_symbols(content: &str) -> BTreeSet<String> {
    let mut bound = BTreeSet::new();
    for stmt in statements(content) {
        let Some(clause) = stmt.clause else {
            continue;
        };
        let text = &content[clause];
        let (outside, inside) = match (text.find('{'), text.rfind('}')) {
            (Some(open), Some(close)) if open < close => (
                format!("{} {}", &text[..open], &text[close + 1..]),
                Some(&text[open + 1..close]),
            ),
            _ => (text.to_string(), None),
        };

        for item in inside.into_iter().flat_map(|s| s.split(',')) {
            if let Some(name) = item.split_whitespace().last()
                && is_identifier(name)
            {
                bound.insert(name.to_string());
            }
        }
        for item in outside.split(',') {
            let item = item.trim();
            let name = item.split_whitespace().last().unwrap_or("");
            if is_identifier(name) && name != "type" {
                bound.insert(name.to_string());
            }
        }
    }
    bound
}

/// Names the file declares itself: `const`/`let`/`var` bindings (including
/// destructuring patterns), functions and classes.
///
/// Best effort. Declarations inside comments or strings count too.
pub fn declared_symbols(content: &str) -> BTreeSet<String> {
    let mut declared = BTreeSet::new();
    for caps in DECLARATION.captures_iter(content) {
        if let Some(name) = caps.name("name") {
            declared.insert(name.as_str().to_string());
        } else if let Some(open) = caps.name("pattern")
            && let Some(inner) = bracketed(content, open.start())
        {
            collect_bindings(inner, &mut declared);
        }
    }
    declared
}

/// Text between the bracket at byte `open` and its partner.
fn bracketed(content: &str, open: usize) -> Option<&str> {
    let mut depth = 0usize;
    for (i, c) in content[open..].char_indices() {
        match c {
            '{' | '[' | '(' => depth += 1,
            '}' | ']' | ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&content[open + 1..open + i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Binding names of a destructuring pattern body, e.g. `a, b: c, ...d` or
/// `[x, { y }]`.
fn collect_bindings(pattern: &str, out: &mut BTreeSet<String>) {
    for item in split_top_level(pattern, ',') {
        let item = item.trim().trim_start_matches("...");
        let target = match split_top_level(item, ':').as_slice() {
            [_, value, ..] => *value,
            _ => item,
        };
        let target = split_top_level(target, '=')[0].trim();
        if let Some(inner) = target
            .strip_prefix(['{', '['])
            .and_then(|t| t.strip_suffix(['}', ']']))
        {
            collect_bindings(inner, out);
        } else if is_identifier(target) {
            out.insert(target.to_string());
        }
    }
}

fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '{' | '[' | '(' => depth += 1,
            '}' | ']' | ')' => depth = depth.saturating_sub(1),
            c if c == sep && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn is_type_only(clause: &str) -> bool {
    clause
        .trim_start()
        .strip_prefix("type")
        .is_some_and(|rest| rest.starts_with(|c: char| c.is_whitespace() || c == '{' || c == '*'))
}

/// Byte spans of all import statements.
pub fn statement_spans(content: &str) -> Vec<Range<usize>> {
    statements(content).into_iter().map(|s| s.span).collect()
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Adds import declarations without disturbing the rest of a file.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportManager<'a> {
    hosts: &'a [ImportHost],
}

impl<'a> ImportManager<'a> {
    pub fn new(hosts: &'a [ImportHost]) -> Self {
        Self { hosts }
    }

    /// Makes every symbol in `required` imported from `module`.
    ///
    /// In order: merge into an existing single-line import of the module;
    /// merge into an import from a configured host module; insert a new
    /// import after the last import statement; prepend one.
    pub fn ensure_imports(
        &self,
        content: &str,
        module: &str,
        required: &BTreeSet<String>,
    ) -> Result<String, ImportError> {
        if required.is_empty() {
            return Ok(content.to_string());
        }

        if let Some(block) = find_import_block(content, module)? {
            return Ok(merge(content, &block, required));
        }

        for host in self.hosts.iter().filter(|h| h.module == module) {
            let Ok(Some(block)) = find_import_block(content, &host.host) else {
                continue;
            };
            let anchored = host
                .anchor
                .as_ref()
                .is_none_or(|anchor| block.symbols.contains(anchor));
            if anchored {
                return Ok(merge(content, &block, required));
            }
        }

        Ok(insert(content, module, required))
    }
}

/// [`ImportManager::ensure_imports`] without host exceptions.
pub fn ensure_imports(
    content: &str,
    module: &str,
    required: &BTreeSet<String>,
) -> Result<String, ImportError> {
    ImportManager::default().ensure_imports(content, module, required)
}

fn merge(content: &str, block: &ImportBlock, required: &BTreeSet<String>) -> String {
    if required.iter().all(|s| block.symbols.contains(s)) {
        return content.to_string();
    }
    let mut union: Vec<&str> = block.symbols.iter().map(String::as_str).collect();
    for symbol in required {
        if !union.contains(&symbol.as_str()) {
            union.push(symbol);
        }
    }
    sort_symbols(&mut union);

    let mut out = String::with_capacity(content.len() + 32);
    out.push_str(&content[..block.list.start]);
    out.push(' ');
    out.push_str(&union.join(", "));
    out.push(' ');
    out.push_str(&content[block.list.end..]);
    out
}

fn sort_symbols(symbols: &mut [&str]) {
    symbols.sort_by(|a, b| {
        a.to_lowercase()
            .cmp(&b.to_lowercase())
            .then_with(|| a.cmp(b))
    });
}

fn insert(content: &str, module: &str, required: &BTreeSet<String>) -> String {
    let existing = statements(content);
    let quote = existing.first().map(|s| s.quote).unwrap_or('\'');
    let semicolon = match existing.last() {
        Some(last) => last.semicolon,
        None => true,
    };

    let mut symbols: Vec<&str> = required.iter().map(String::as_str).collect();
    sort_symbols(&mut symbols);
    let line = format!(
        "import {{ {} }} from {}{}{}{}",
        symbols.join(", "),
        quote,
        module,
        quote,
        if semicolon { ";" } else { "" }
    );

    let newline = if content.contains("\r\n") { "\r\n" } else { "\n" };
    match existing.last() {
        Some(last) => {
            let eol = line_end(content, last.span.end).unwrap_or(content.len());
            format!("{}{}{}{}", &content[..eol], newline, line, &content[eol..])
        }
        None if content.starts_with("#!") => match line_end(content, 0) {
            Some(eol) => format!("{}{}{}{}", &content[..eol], newline, line, &content[eol..]),
            None => format!("{}{}{}{}", content, newline, line, newline),
        },
        None => format!("{}{}{}", line, newline, content),
    }
}

/// Offset of the line terminator (`\n` or `\r\n`) at or after `from`.
fn line_end(content: &str, from: usize) -> Option<usize> {
    let eol = from + content[from..].find('\n')?;
    if content[..eol].ends_with('\r') {
        Some(eol - 1)
    } else {
        Some(eol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_requirement_leaves_content_unchanged() {
        let content = "const a = 1;\n";
        assert_eq!(ensure_imports(content, "@tokens", &set(&[])).unwrap(), content);
    }

    #[test]
    fn merges_into_existing_import_sorted() {
        let content = "import { SPACING } from '@tokens';\n\nconst w = FONT_WEIGHT.semibold;\n";
        let out = ensure_imports(content, "@tokens", &set(&["FONT_WEIGHT"])).unwrap();
        assert_eq!(
            out,
            "import { FONT_WEIGHT, SPACING } from '@tokens';\n\nconst w = FONT_WEIGHT.semibold;\n"
        );
    }

    #[test]
    fn present_symbols_leave_list_untouched() {
        let content = "import {SPACING,FONT_WEIGHT} from '@tokens'\nx";
        let out = ensure_imports(content, "@tokens", &set(&["SPACING"])).unwrap();
        assert_eq!(out, content);
    }

    #[test]
    fn merge_never_duplicates_and_keeps_default_binding() {
        let content = "import React, { useState, } from \"react\";\nfoo();\n";
        let out = ensure_imports(content, "react", &set(&["useEffect", "useState"])).unwrap();
        assert_eq!(
            out,
            "import React, { useEffect, useState } from \"react\";\nfoo();\n"
        );
    }

    #[test]
    fn sorting_ignores_case() {
        let content = "import { SPACING } from '@utils/theme';\n";
        let out = ensure_imports(content, "@utils/theme", &set(&["getString", "COLORS"])).unwrap();
        assert_eq!(out, "import { COLORS, getString, SPACING } from '@utils/theme';\n");
    }

    #[test]
    fn multi_line_import_is_unsupported() {
        let content = "import React from 'react';\nimport {\n  SPACING,\n  COLORS,\n} from '@tokens';\n";
        let err = ensure_imports(content, "@tokens", &set(&["FONT_WEIGHT"])).unwrap_err();
        assert_eq!(
            err,
            ImportError::UnsupportedImportShape {
                module: "@tokens".into(),
                line: 2,
                reason: "split across several lines",
            }
        );
    }

    #[test]
    fn aliased_import_is_unsupported() {
        let content = "import { SPACING as S } from '@tokens';\n";
        let err = ensure_imports(content, "@tokens", &set(&["FONT_WEIGHT"])).unwrap_err();
        assert!(matches!(
            err,
            ImportError::UnsupportedImportShape { reason: "aliased", .. }
        ));
    }

    #[test]
    fn namespace_and_default_imports_are_unsupported() {
        for content in ["import * as T from '@tokens';\n", "import tokens from '@tokens';\n"] {
            assert!(ensure_imports(content, "@tokens", &set(&["SPACING"])).is_err());
        }
    }

    #[test]
    fn supported_import_wins_over_unsupported_one() {
        let content = "import tokens from '@tokens';\nimport { SPACING } from '@tokens';\n";
        let out = ensure_imports(content, "@tokens", &set(&["COLORS"])).unwrap();
        assert_eq!(
            out,
            "import tokens from '@tokens';\nimport { COLORS, SPACING } from '@tokens';\n"
        );
    }

    #[test]
    fn inserts_after_last_import_with_file_style() {
        let content = "import React from \"react\"\nimport { View } from \"react-native\"\n\nexport default 1\n";
        let out = ensure_imports(content, "@tokens", &set(&["SPACING", "FONT_WEIGHT"])).unwrap();
        assert_eq!(
            out,
            "import React from \"react\"\nimport { View } from \"react-native\"\nimport { FONT_WEIGHT, SPACING } from \"@tokens\"\n\nexport default 1\n"
        );
    }

    #[test]
    fn inserts_after_closing_line_of_multi_line_import() {
        let content = "import {\n  View,\n  Text,\n} from 'react-native';\nconst x = 1;\n";
        let out = ensure_imports(content, "@tokens", &set(&["SPACING"])).unwrap();
        assert_eq!(
            out,
            "import {\n  View,\n  Text,\n} from 'react-native';\nimport { SPACING } from '@tokens';\nconst x = 1;\n"
        );
    }

    #[test]
    fn prepends_when_file_has_no_imports() {
        let out = ensure_imports("const a = SPACING.md;\n", "@tokens", &set(&["SPACING"])).unwrap();
        assert_eq!(out, "import { SPACING } from '@tokens';\nconst a = SPACING.md;\n");
    }

    #[test]
    fn prepend_keeps_shebang_first() {
        let out = ensure_imports("#!/usr/bin/env node\nrun();\n", "@tokens", &set(&["SPACING"])).unwrap();
        assert_eq!(
            out,
            "#!/usr/bin/env node\nimport { SPACING } from '@tokens';\nrun();\n"
        );
    }

    #[test]
    fn merges_into_configured_host_import() {
        let hosts = vec![ImportHost {
            module: "@utils/theme".into(),
            host: "@shared/utils/theme".into(),
            anchor: None,
        }];
        let manager = ImportManager::new(&hosts);
        let content = "import { COLORS } from '@shared/utils/theme';\nlabel(getString('x'));\n";
        let out = manager
            .ensure_imports(content, "@utils/theme", &set(&["getString"]))
            .unwrap();
        assert_eq!(
            out,
            "import { COLORS, getString } from '@shared/utils/theme';\nlabel(getString('x'));\n"
        );
    }

    #[test]
    fn host_without_anchor_symbol_is_skipped() {
        let hosts = vec![ImportHost {
            module: "@tokens".into(),
            host: "@theme".into(),
            anchor: Some("COLORS".into()),
        }];
        let manager = ImportManager::new(&hosts);
        let content = "import { palette } from '@theme';\n";
        let out = manager
            .ensure_imports(content, "@tokens", &set(&["SPACING"]))
            .unwrap();
        assert_eq!(
            out,
            "import { palette } from '@theme';\nimport { SPACING } from '@tokens';\n"
        );
    }

    #[test]
    fn ensure_is_idempotent() {
        let content = "import React from 'react';\nconst a = 1;\n";
        let once = ensure_imports(content, "@tokens", &set(&["SPACING"])).unwrap();
        let twice = ensure_imports(&once, "@tokens", &set(&["SPACING"])).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn no_symbol_is_ever_lost() {
        let inputs = [
            "import { B, A } from '@tokens';\nimport X, { y as z } from 'other';\n",
            "import * as NS from 'ns';\nimport { C } from \"@tokens\"\n",
            "// nothing imported\n",
        ];
        for content in inputs {
            let before = bound_symbols(content);
            let after = ensure_imports(content, "@tokens", &set(&["D", "A"])).unwrap();
            let after = bound_symbols(&after);
            assert!(before.is_subset(&after), "lost symbols in {content:?}");
            assert!(after.contains("D"));
        }
    }

    #[test]
    fn merged_list_has_no_duplicates() {
        let content = "import { A, B } from '@tokens';\n";
        let out = ensure_imports(content, "@tokens", &set(&["A", "B", "C"])).unwrap();
        let block = find_import_block(&out, "@tokens").unwrap().unwrap();
        let unique: BTreeSet<_> = block.symbols.iter().collect();
        assert_eq!(unique.len(), block.symbols.len());
        assert_eq!(block.symbols, vec!["A", "B", "C"]);
    }

    #[test]
    fn bound_symbols_covers_all_shapes() {
        let content = "import React, { useState } from 'react';\nimport * as T from '@tokens';\nimport {\n  a as b,\n  type C,\n} from 'x';\nimport './side.css';\n";
        assert_eq!(
            bound_symbols(content),
            set(&["C", "React", "T", "b", "useState"])
        );
    }

    #[test]
    fn side_effect_import_is_a_statement() {
        let found = statements("import './x.css';\nimport\t\"polyfill\"\n");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].module, "./x.css");
        assert!(found[0].clause.is_none());
        assert!(found[0].semicolon);
        assert!(!found[1].semicolon);
    }

    #[test]
    fn inserts_after_trailing_side_effect_import() {
        let content = "import React from 'react';\nimport './styles.css';\n\nconst a = 1;\n";
        let out = ensure_imports(content, "@tokens", &set(&["SPACING"])).unwrap();
        assert_eq!(
            out,
            "import React from 'react';\nimport './styles.css';\nimport { SPACING } from '@tokens';\n\nconst a = 1;\n"
        );
    }

    #[test]
    fn only_side_effect_import_still_comes_first() {
        let content = "import 'react-native-gesture-handler';\nregister();\n";
        let out = ensure_imports(content, "@tokens", &set(&["SPACING"])).unwrap();
        assert_eq!(
            out,
            "import 'react-native-gesture-handler';\nimport { SPACING } from '@tokens';\nregister();\n"
        );
    }

    #[test]
    fn side_effect_import_of_target_is_unsupported() {
        let err = ensure_imports("import '@tokens';\n", "@tokens", &set(&["SPACING"])).unwrap_err();
        assert_eq!(
            err,
            ImportError::UnsupportedImportShape {
                module: "@tokens".to_string(),
                line: 1,
                reason: "a side-effect import",
            }
        );
    }

    #[test]
    fn type_only_import_is_left_alone() {
        let content = "import type { Theme } from '@tokens';\nconst w = FONT_WEIGHT.bold;\n";
        assert!(statements(content)[0].type_only);
        let out = ensure_imports(content, "@tokens", &set(&["FONT_WEIGHT"])).unwrap();
        assert_eq!(
            out,
            "import type { Theme } from '@tokens';\nimport { FONT_WEIGHT } from '@tokens';\nconst w = FONT_WEIGHT.bold;\n"
        );
    }

    #[test]
    fn default_named_type_is_not_type_only() {
        let content = "import typeface, { A } from '@tokens';\n";
        assert!(!statements(content)[0].type_only);
        let out = ensure_imports(content, "@tokens", &set(&["B"])).unwrap();
        assert_eq!(out, "import typeface, { A, B } from '@tokens';\n");
    }

    #[test]
    fn inserted_line_uses_crlf_when_file_does() {
        let content = "import React from 'react';\r\nconst a = 1;\r\n";
        let out = ensure_imports(content, "@tokens", &set(&["SPACING"])).unwrap();
        assert_eq!(
            out,
            "import React from 'react';\r\nimport { SPACING } from '@tokens';\r\nconst a = 1;\r\n"
        );

        let out = ensure_imports("#!/usr/bin/env node\r\nrun();\r\n", "@tokens", &set(&["SPACING"])).unwrap();
        assert_eq!(
            out,
            "#!/usr/bin/env node\r\nimport { SPACING } from '@tokens';\r\nrun();\r\n"
        );

        let out = ensure_imports("run();\r\n", "@tokens", &set(&["SPACING"])).unwrap();
        assert_eq!(out, "import { SPACING } from '@tokens';\r\nrun();\r\n");
    }

    #[test]
    fn declared_symbols_include_destructured_names() {
        let content = "\
export const FONT_WEIGHT = { bold: '700' };
const { SPACING, colors: palette, nested: { md }, ...rest } = useTheme();
let [first, , third = 1] = list;
function* ids() {}
export class Store {}
";
        assert_eq!(
            declared_symbols(content),
            set(&["FONT_WEIGHT", "SPACING", "Store", "first", "ids", "md", "palette", "rest", "third"])
        );
    }

    #[test]
    fn dynamic_import_is_not_a_statement() {
        let content = "const m = import('./lazy');\n  import('./other');\n";
        assert!(statements(content).is_empty());
    }
}
