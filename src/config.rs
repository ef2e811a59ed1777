//! Rule configuration as it appears on disk.
//!
//! A configuration is a TOML document holding ordered `[[rules]]`, the
//! canonical name table, usage-triggered import requirements, import host
//! exceptions and report boilerplate. Nothing here is validated beyond
//! deserialization; [`crate::registry::RuleSet::load`] does the rest.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File name looked up in the scanned root when `--config` is not given.
pub const CONFIG_FILE_NAME: &str = "token-refactor.toml";

const BUILTIN: &str = include_str!("../rules/default.toml");

/// Root of a rule configuration document.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    #[serde(default)]
    pub rules: Vec<RuleDef>,
    #[serde(default)]
    pub canonical_names: CanonicalDef,
    #[serde(default)]
    pub imports: Vec<UsageImportDef>,
    #[serde(default)]
    pub import_hosts: Vec<ImportHostDef>,
    #[serde(default)]
    pub report: ReportDef,
    #[serde(default)]
    pub files: FilesDef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKindDef {
    Detect,
    Rewrite,
}

/// One `[[rules]]` entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDef {
    pub id: String,
    pub kind: RuleKindDef,
    pub pattern: String,
    pub replacement: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub applies_to: Vec<String>,
    pub requires: Option<RequirementDef>,
}

/// Symbols a rewrite rule needs in scope once it has fired.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RequirementDef {
    pub module: String,
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CanonicalDef {
    #[serde(default = "default_table_version")]
    pub version: u32,
    #[serde(default)]
    pub names: BTreeMap<String, String>,
}

impl Default for CanonicalDef {
    fn default() -> Self {
        Self {
            version: default_table_version(),
            names: BTreeMap::new(),
        }
    }
}

fn default_table_version() -> u32 {
    1
}

/// A symbol that must be imported from `module` wherever it is used.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UsageImportDef {
    pub symbol: String,
    pub module: String,
}

/// Lets requirements for `module` merge into an existing import from `host`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ImportHostDef {
    pub module: String,
    pub host: String,
    pub anchor: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReportDef {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub reference: Vec<String>,
    /// Prioritised follow-ups, rendered as a numbered list.
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub checklist: Vec<String>,
}

impl Default for ReportDef {
    fn default() -> Self {
        Self {
            title: default_title(),
            reference: Vec::new(),
            actions: Vec::new(),
            checklist: Vec::new(),
        }
    }
}

fn default_title() -> String {
    "Token Audit Report".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FilesDef {
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Default for FilesDef {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            exclude: Vec::new(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    ["js", "jsx", "ts", "tsx"].iter().map(|s| s.to_string()).collect()
}

/// Parses a configuration document.
pub fn load_from_str(source: &str) -> Result<RuleConfig, ConfigError> {
    Ok(toml::from_str(source)?)
}

/// Reads and parses a configuration file.
pub fn load_from_path(path: &Path) -> Result<RuleConfig, ConfigError> {
    let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&source)
}

/// The configuration shipped with the binary.
pub fn builtin() -> Result<RuleConfig, ConfigError> {
    load_from_str(BUILTIN)
}

/// Picks the configuration for a run: explicit path, then the root's
/// `token-refactor.toml`, then the builtin set. Returns where it came from.
pub fn resolve(
    explicit: Option<&Path>,
    root: &Path,
) -> Result<(RuleConfig, Option<PathBuf>), ConfigError> {
    if let Some(path) = explicit {
        return Ok((load_from_path(path)?, Some(path.to_path_buf())));
    }
    let local = root.join(CONFIG_FILE_NAME);
    if local.is_file() {
        return Ok((load_from_path(&local)?, Some(local)));
    }
    Ok((builtin()?, None))
}
