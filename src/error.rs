//! Typed errors for rule loading and import maintenance.
//!
//! Configuration problems are fatal and stop a run before any file is
//! touched. Import problems are per-file and end up as findings.

use std::path::PathBuf;
use thiserror::Error;

/// A malformed rule configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read rule configuration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("rule configuration is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("rule #{index} has an empty id")]
    EmptyId { index: usize },

    #[error("duplicate rule id '{0}'")]
    DuplicateId(String),

    #[error("rule '{id}': invalid pattern: {source}")]
    InvalidPattern {
        id: String,
        #[source]
        source: regex::Error,
    },

    #[error("rule '{id}': detect rules cannot carry a replacement or import requirement")]
    UnexpectedReplacement { id: String },

    #[error("rule '{id}': replacement '{replacement}' is matched again by rule '{matched_by}'")]
    NonConvergent {
        id: String,
        replacement: String,
        matched_by: String,
    },

    #[error("canonical name '{canonical}' for alias '{alias}' is itself rewritten by the table")]
    CanonicalChain { alias: String, canonical: String },

    #[error("import requirement for '{module}' has an invalid symbol '{symbol}'")]
    InvalidSymbol { module: String, symbol: String },
}

/// An import declaration the manager refuses to edit.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ImportError {
    #[error("import from '{module}' at line {line} is {reason}; add the symbols by hand")]
    UnsupportedImportShape {
        module: String,
        line: usize,
        reason: &'static str,
    },
}
