//! token-refactor: detect and rewrite hardcoded design values.
//!
//! Walks a JavaScript/TypeScript tree, reports values that should come from
//! design tokens, and rewrites the ones a rule knows how to fix, adding the
//! imports the rewritten code needs.

use anyhow::{Context, Result, bail};
use clap::Parser;
use colored::Colorize;
use dialoguer::Confirm;
use std::path::Path;
use std::process::ExitCode;
use token_refactor::batch::{self, Mode, WalkOptions};
use token_refactor::cli::{Args, Commands, OutputArgs, TargetArgs};
use token_refactor::config::{self, RuleConfig};
use token_refactor::registry::{self, RuleSet};
use token_refactor::report::{self, Report};
use token_refactor::rewriter::{self, RewriteOutcome};
use tracing_subscriber::EnvFilter;

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_tracing(verbose(&args.command));

    match args.command {
        Commands::Audit { target, output } => cmd_audit(&target, &output),
        Commands::Fix {
            target,
            output,
            dry_run,
            interactive,
        } => cmd_fix(&target, &output, dry_run, interactive),
        Commands::Rules { config } => cmd_rules(config.as_deref()),
        Commands::Scan { target } => cmd_scan(&target),
    }
}

fn verbose(command: &Commands) -> bool {
    match command {
        Commands::Audit { target, .. } | Commands::Fix { target, .. } | Commands::Scan { target } => {
            target.verbose
        }
        Commands::Rules { .. } => false,
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn cmd_audit(target: &TargetArgs, output: &OutputArgs) -> Result<ExitCode> {
    let (config, rules) = load_rules(target.config.as_deref(), &target.root, target.verbose)?;
    let options = walk_options(target, &config)?;
    let report = batch::run(&target.root, Mode::Audit, &rules, &options)?;
    finish(&report, &config, output, target.verbose)?;
    Ok(ExitCode::SUCCESS)
}

fn cmd_fix(
    target: &TargetArgs,
    output: &OutputArgs,
    dry_run: bool,
    interactive: bool,
) -> Result<ExitCode> {
    let (config, rules) = load_rules(target.config.as_deref(), &target.root, target.verbose)?;
    let options = walk_options(target, &config)?;
    let mode = if dry_run { Mode::DryRun } else { Mode::Fix };

    let report = if interactive {
        batch::run_with(&target.root, mode, &rules, &options, confirm_file)?
    } else {
        batch::run(&target.root, mode, &rules, &options)?
    };
    finish(&report, &config, output, target.verbose)?;

    if report.has_failures() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn cmd_rules(explicit: Option<&Path>) -> Result<ExitCode> {
    let (_, rules) = load_rules(explicit, Path::new("."), false)?;
    registry::print_table(&rules);
    Ok(ExitCode::SUCCESS)
}

fn cmd_scan(target: &TargetArgs) -> Result<ExitCode> {
    if !target.root.is_dir() {
        bail!("root directory {} does not exist", target.root.display());
    }
    let (config, _) = config::resolve(target.config.as_deref(), &target.root)
        .context("failed to load rule configuration")?;
    let options = walk_options(target, &config)?;
    let (files, failures) = batch::collect_files(&target.root, &options);

    println!("Would scan {} files:", files.len());
    for file in files {
        println!("  {}", file.display());
    }
    for failure in failures {
        eprintln!(
            "{} {}: {}",
            "warn:".yellow().bold(),
            failure.file.display(),
            failure.description
        );
    }

    Ok(ExitCode::SUCCESS)
}

fn load_rules(explicit: Option<&Path>, root: &Path, verbose: bool) -> Result<(RuleConfig, RuleSet)> {
    let (config, origin) =
        config::resolve(explicit, root).context("failed to load rule configuration")?;
    let rules = RuleSet::load(&config).context("invalid rule configuration")?;

    if verbose {
        let origin = origin
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "builtin rules".to_string());
        eprintln!(
            "{} Using {} ({} rules, canonical names v{})",
            "info:".blue().bold(),
            origin,
            rules.rules().len(),
            rules.canonical().version()
        );
    }

    Ok((config, rules))
}

fn walk_options(target: &TargetArgs, config: &RuleConfig) -> Result<WalkOptions> {
    let extensions = if target.extensions.is_empty() {
        &config.files.extensions
    } else {
        &target.extensions
    };
    let mut options = WalkOptions::new(extensions)
        .exclude(&config.files.exclude)?
        .exclude(&target.exclude)?;
    options.default_excludes = !target.no_default_excludes;
    Ok(options)
}

fn confirm_file(path: &Path, outcome: &RewriteOutcome) -> bool {
    println!("\n{} {}", "Would update:".yellow().bold(), path.display());
    for rule in &outcome.fired {
        println!("  {} {}", "rule".dimmed(), rule);
    }
    for (module, symbols) in &outcome.imports_added {
        let symbols: Vec<&str> = symbols.iter().map(String::as_str).collect();
        println!(
            "  {}",
            format!("+ import {{ {} }} from '{}'", symbols.join(", "), module).green()
        );
    }

    Confirm::new()
        .with_prompt("Write this file?")
        .default(false)
        .interact()
        .unwrap_or(false)
}

fn finish(report: &Report, config: &RuleConfig, output: &OutputArgs, verbose: bool) -> Result<()> {
    if let Some(path) = &output.report {
        let document = report::render(report, &config.report);
        rewriter::write_atomic(path, &document)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        if verbose {
            eprintln!("{} Report written to {}", "info:".blue().bold(), path.display());
        }
    }

    if output.json {
        println!("{}", report.to_json()?);
    } else {
        print_report(report, verbose);
    }
    Ok(())
}

fn print_report(report: &Report, verbose: bool) {
    if verbose {
        let s = report.summary();
        println!(
            "\n{} Files: {}, with issues: {}, findings: {}",
            "Diagnostics:".bold(),
            s.files_scanned,
            s.files_with_issues,
            s.total_findings
        );
    }

    for (path, findings) in &report.per_file {
        for finding in findings {
            let loc = format!("{}:{}", path.display(), finding.line);
            if finding.kind.is_failure() {
                println!(
                    "  {} {} {}",
                    loc.dimmed(),
                    finding.kind.as_str().red(),
                    finding.description
                );
            } else {
                println!(
                    "  {} {} {}",
                    loc.dimmed(),
                    finding.description.yellow(),
                    finding.snippet.dimmed()
                );
            }
        }
    }

    let label = match report.mode {
        Mode::Audit => None,
        Mode::Fix => Some("Updated:".green().bold()),
        Mode::DryRun => Some("Would update:".yellow().bold()),
    };
    if let Some(label) = label {
        for path in &report.files_changed {
            println!("{} {}", label, path.display());
        }
    }

    if report.total_findings() == 0 {
        println!("{} {}", "ok:".green().bold(), report.summary_line());
    } else {
        println!("\n{} {}", "warn:".yellow().bold(), report.summary_line());
    }

    match report.mode {
        Mode::Audit => {}
        Mode::Fix => println!("Rewrote {} file(s)", report.files_changed.len()),
        Mode::DryRun => {
            println!("Would rewrite {} file(s)", report.files_changed.len());
            println!("\n{} Run without --dry-run to apply changes", "hint:".cyan().bold());
        }
    }
}
