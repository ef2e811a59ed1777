//! token-refactor library for auditing and rewriting design-token usage.
//!
//! This library provides programmatic access to the audit and rewrite
//! machinery behind the `token-refactor` binary. The core workflow:
//!
//! 1. **Loading**: Parse a TOML rule configuration and compile it into a [`RuleSet`]
//! 2. **Scanning**: Walk a source tree and report detect-rule matches per line
//! 3. **Rewriting**: Apply rewrite rules and canonical names, then add the imports they need
//! 4. **Reporting**: Collect findings into a [`Report`] and render it as Markdown or JSON
//!
//! # Example
//!
//! ```no_run
//! use token_refactor::{batch, config, report, Mode, RuleSet, WalkOptions};
//! use std::path::Path;
//!
//! let cfg = config::builtin().unwrap();
//! let rules = RuleSet::load(&cfg).unwrap();
//! let options = WalkOptions::from_config(&cfg.files).unwrap();
//!
//! let result = batch::run(Path::new("./src"), Mode::Audit, &rules, &options).unwrap();
//! println!("{}", result.summary_line());
//! println!("{}", report::render(&result, &cfg.report));
//! ```

pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod imports;
pub mod registry;
pub mod report;
pub mod rewriter;
pub mod scanner;

// Re-export commonly used types at crate root
pub use batch::{Mode, WalkOptions};
pub use error::{ConfigError, ImportError};
pub use registry::{Rule, RuleKind, RuleSet};
pub use report::Report;
pub use rewriter::{RewriteOutcome, Rewriter};
pub use scanner::{Finding, FindingKind};
