//! Command-line interface definitions.
//!
//! Defines the argument parser and subcommands using clap's derive API.
//! Each subcommand corresponds to a distinct operation: auditing a tree,
//! rewriting it, listing the loaded rules, or listing scan targets.

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

/// Detect and rewrite hardcoded design values in JavaScript and TypeScript sources.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Report every rule violation without modifying files.
    Audit {
        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Rewrite files in place and report what could not be fixed.
    Fix {
        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        output: OutputArgs,

        /// Show which files would change without writing them.
        #[arg(long, conflicts_with = "interactive")]
        dry_run: bool,

        /// Confirm each file's changes before writing it.
        #[arg(short, long)]
        interactive: bool,
    },

    /// Print the loaded rules and canonical name table.
    Rules {
        /// Rule configuration file. Defaults to `token-refactor.toml` in the
        /// current directory, then the builtin rules.
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// List files that would be processed without reading them.
    Scan {
        #[command(flatten)]
        target: TargetArgs,
    },
}

/// Which tree to walk and which rules to use.
#[derive(Debug, ClapArgs)]
pub struct TargetArgs {
    /// Root directory to process.
    #[arg(default_value = ".")]
    pub root: PathBuf,

    /// Rule configuration file. Defaults to `token-refactor.toml` in the
    /// root, then the builtin rules.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// File extensions to include (repeatable). Overrides the configuration.
    #[arg(long = "ext", value_name = "EXT")]
    pub extensions: Vec<String>,

    /// Glob patterns for directories/files to exclude (e.g., "dist", "*.test.tsx").
    /// By default, dot-prefixed entries and dependency directories are excluded.
    #[arg(short, long)]
    pub exclude: Vec<String>,

    /// Disable default exclusion of dot-prefixed entries and dependency directories.
    #[arg(long)]
    pub no_default_excludes: bool,

    /// Print additional diagnostics to stderr.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, ClapArgs)]
pub struct OutputArgs {
    /// Write the rendered Markdown report to this file.
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Emit JSON instead of human-readable output.
    #[arg(long)]
    pub json: bool,
}
