//! Rule registry.
//!
//! Compiles a [`RuleConfig`] into an immutable [`RuleSet`]: ordered detect
//! and rewrite rules, the canonical name table, usage-triggered import
//! requirements and import host exceptions. Every pattern is compiled here,
//! so a bad regex fails the run before any file is read.
//!
//! Loading also rejects configurations that could not converge: a literal
//! replacement that an earlier (or the same) rewrite rule would match again,
//! or a canonical name that the table itself would rewrite.

use crate::config::{RuleConfig, RuleDef, RuleKindDef};
use crate::error::ConfigError;
use colored::Colorize;
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Detect,
    Rewrite,
}

impl RuleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleKind::Detect => "detect",
            RuleKind::Rewrite => "rewrite",
        }
    }
}

/// Symbols from one module that must be in scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub module: String,
    pub symbols: BTreeSet<String>,
}

/// A compiled rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: String,
    pub kind: RuleKind,
    pub pattern: Regex,
    /// `None` on a rewrite rule means flag only.
    pub replacement: Option<String>,
    pub description: String,
    /// Normalized extensions. Empty applies everywhere.
    pub applies_to: BTreeSet<String>,
    pub requires: Option<Requirement>,
}

impl Rule {
    pub fn applies_to_extension(&self, ext: &str) -> bool {
        self.applies_to.is_empty() || self.applies_to.contains(&normalize_extension(ext))
    }

    pub fn is_flag_only(&self) -> bool {
        self.kind == RuleKind::Rewrite && self.replacement.is_none()
    }

    /// Replacement without capture references, if any.
    fn literal_replacement(&self) -> Option<&str> {
        self.replacement.as_deref().filter(|r| !r.contains('$'))
    }
}

/// A symbol that must be imported wherever it is used.
#[derive(Debug, Clone)]
pub struct UsageImport {
    pub symbol: String,
    pub module: String,
    usage: Regex,
}

impl UsageImport {
    fn new(symbol: &str, module: &str) -> Result<Self, ConfigError> {
        validate_symbol(module, symbol)?;
        let usage = Regex::new(&format!(r"\b{}\b", regex::escape(symbol))).map_err(|source| {
            ConfigError::InvalidPattern {
                id: format!("import:{}", symbol),
                source,
            }
        })?;
        Ok(Self {
            symbol: symbol.to_string(),
            module: module.to_string(),
            usage,
        })
    }

    /// Byte offset of the first reference to the symbol in `line`.
    pub fn is_used_in(&self, line: &str) -> Option<usize> {
        self.usage.find(line).map(|m| m.start())
    }
}

/// Allows requirements for `module` to be merged into an import from `host`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportHost {
    pub module: String,
    pub host: String,
    pub anchor: Option<String>,
}

/// The single alias -> canonical spelling table.
#[derive(Debug, Clone)]
pub struct CanonicalNameTable {
    version: u32,
    names: BTreeMap<String, String>,
    matcher: Option<Regex>,
}

impl CanonicalNameTable {
    pub fn new(version: u32, names: BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let matcher = if names.is_empty() {
            None
        } else {
            let mut aliases: Vec<&String> = names.keys().collect();
            aliases.sort_by_key(|a| std::cmp::Reverse(a.len()));
            let alternation: Vec<String> = aliases.iter().map(|a| token_pattern(a)).collect();
            let re = Regex::new(&alternation.join("|")).map_err(|source| {
                ConfigError::InvalidPattern {
                    id: "canonical_names".to_string(),
                    source,
                }
            })?;
            Some(re)
        };

        if let Some(re) = &matcher {
            for (alias, canonical) in &names {
                if re.is_match(canonical) {
                    return Err(ConfigError::CanonicalChain {
                        alias: alias.clone(),
                        canonical: canonical.clone(),
                    });
                }
            }
        }

        Ok(Self {
            version,
            names,
            matcher,
        })
    }

    pub fn empty() -> Self {
        Self {
            version: 1,
            names: BTreeMap::new(),
            matcher: None,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn canonical(&self, alias: &str) -> Option<&str> {
        self.names.get(alias).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.names.iter().map(|(a, c)| (a.as_str(), c.as_str()))
    }

    /// Replaces every whole-token alias occurrence with its canonical name.
    pub fn apply<'t>(&self, text: &'t str) -> Cow<'t, str> {
        match &self.matcher {
            Some(re) => re.replace_all(text, |caps: &Captures| {
                self.names
                    .get(&caps[0])
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            }),
            None => Cow::Borrowed(text),
        }
    }
}

/// Whole-token pattern for a literal name: word boundaries only where the
/// name itself starts or ends with a word character.
fn token_pattern(name: &str) -> String {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let lead = if name.chars().next().is_some_and(is_word) {
        r"\b"
    } else {
        ""
    };
    let trail = if name.chars().last().is_some_and(is_word) {
        r"\b"
    } else {
        ""
    };
    format!("{}{}{}", lead, regex::escape(name), trail)
}

/// The compiled, read-only rule configuration for a run.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
    canonical: CanonicalNameTable,
    usage_imports: Vec<UsageImport>,
    import_hosts: Vec<ImportHost>,
}

impl RuleSet {
    /// Compiles a full configuration.
    pub fn load(config: &RuleConfig) -> Result<Self, ConfigError> {
        let mut set = Self::from_definitions(&config.rules)?;
        set.canonical = CanonicalNameTable::new(
            config.canonical_names.version,
            config.canonical_names.names.clone(),
        )?;
        set.check_canonical_convergence()?;
        set.usage_imports = config
            .imports
            .iter()
            .map(|def| UsageImport::new(&def.symbol, &def.module))
            .collect::<Result<_, _>>()?;
        set.import_hosts = config
            .import_hosts
            .iter()
            .map(|def| ImportHost {
                module: def.module.clone(),
                host: def.host.clone(),
                anchor: def.anchor.clone(),
            })
            .collect();
        Ok(set)
    }

    /// Compiles rule definitions alone, preserving declared order.
    pub fn from_definitions(defs: &[RuleDef]) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(defs.len());

        for (index, def) in defs.iter().enumerate() {
            let id = def.id.trim();
            if id.is_empty() {
                return Err(ConfigError::EmptyId { index });
            }
            if !seen.insert(id.to_string()) {
                return Err(ConfigError::DuplicateId(id.to_string()));
            }

            let pattern = Regex::new(&def.pattern).map_err(|source| ConfigError::InvalidPattern {
                id: id.to_string(),
                source,
            })?;

            let kind = match def.kind {
                RuleKindDef::Detect => RuleKind::Detect,
                RuleKindDef::Rewrite => RuleKind::Rewrite,
            };
            if kind == RuleKind::Detect && (def.replacement.is_some() || def.requires.is_some()) {
                return Err(ConfigError::UnexpectedReplacement { id: id.to_string() });
            }

            let requires = match &def.requires {
                Some(req) => {
                    for symbol in &req.symbols {
                        validate_symbol(&req.module, symbol)?;
                    }
                    Some(Requirement {
                        module: req.module.clone(),
                        symbols: req.symbols.iter().cloned().collect(),
                    })
                }
                None => None,
            };

            rules.push(Rule {
                id: id.to_string(),
                kind,
                pattern,
                replacement: def.replacement.clone(),
                description: def.description.clone(),
                applies_to: def.applies_to.iter().map(|e| normalize_extension(e)).collect(),
                requires,
            });
        }

        let set = Self {
            rules,
            canonical: CanonicalNameTable::empty(),
            usage_imports: Vec::new(),
            import_hosts: Vec::new(),
        };
        set.check_rule_convergence()?;
        Ok(set)
    }

    /// A later rule's literal output must not be matched by itself or any
    /// rewrite rule that runs before it.
    fn check_rule_convergence(&self) -> Result<(), ConfigError> {
        let rewrites: Vec<&Rule> = self
            .rules
            .iter()
            .filter(|r| r.kind == RuleKind::Rewrite && r.replacement.is_some())
            .collect();
        for (j, later) in rewrites.iter().enumerate() {
            let Some(replacement) = later.literal_replacement() else {
                continue;
            };
            for earlier in &rewrites[..=j] {
                if earlier.pattern.is_match(replacement) {
                    return Err(ConfigError::NonConvergent {
                        id: later.id.clone(),
                        replacement: replacement.to_string(),
                        matched_by: earlier.id.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// No rewrite rule may match a canonical name.
    fn check_canonical_convergence(&self) -> Result<(), ConfigError> {
        for (_, canonical) in self.canonical.iter() {
            if let Some(rule) = self
                .rules
                .iter()
                .find(|r| r.kind == RuleKind::Rewrite && r.replacement.is_some() && r.pattern.is_match(canonical))
            {
                return Err(ConfigError::NonConvergent {
                    id: "canonical_names".to_string(),
                    replacement: canonical.to_string(),
                    matched_by: rule.id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Rules applicable to `ext`, in declared order.
    pub fn for_extension(&self, ext: &str) -> Vec<&Rule> {
        self.rules
            .iter()
            .filter(|r| r.applies_to_extension(ext))
            .collect()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn canonical(&self) -> &CanonicalNameTable {
        &self.canonical
    }

    pub fn usage_imports(&self) -> &[UsageImport] {
        &self.usage_imports
    }

    pub fn import_hosts(&self) -> &[ImportHost] {
        &self.import_hosts
    }
}

fn validate_symbol(module: &str, symbol: &str) -> Result<(), ConfigError> {
    let mut chars = symbol.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidSymbol {
            module: module.to_string(),
            symbol: symbol.to_string(),
        })
    }
}

/// `".TSX"` and `"tsx"` both become `"tsx"`.
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// Prints rules and the canonical table to stdout.
pub fn print_table(set: &RuleSet) {
    for rule in set.rules() {
        let kind = match rule.kind {
            RuleKind::Detect => rule.kind.as_str().cyan(),
            RuleKind::Rewrite if rule.is_flag_only() => "flag".yellow(),
            RuleKind::Rewrite => rule.kind.as_str().green(),
        };
        let exts = if rule.applies_to.is_empty() {
            "*".to_string()
        } else {
            rule.applies_to.iter().cloned().collect::<Vec<_>>().join(",")
        };
        println!(
            "{:<8} {} {} {}",
            kind,
            rule.id.bold(),
            format!("[{}]", exts).dimmed(),
            rule.description
        );
        if let Some(req) = &rule.requires {
            let symbols: Vec<&str> = req.symbols.iter().map(String::as_str).collect();
            println!(
                "         {} {{ {} }} from '{}'",
                "requires".dimmed(),
                symbols.join(", "),
                req.module
            );
        }
    }

    let table = set.canonical();
    if !table.is_empty() {
        println!(
            "\n{} v{} ({} names)",
            "Canonical names".bold(),
            table.version(),
            table.len()
        );
        for (alias, canonical) in table.iter() {
            println!("  {} {} {}", alias.red(), "->".dimmed(), canonical.green());
        }
    }
}
