//! CLI definition and command dispatch for rmerge.
//!
//! This module defines the command-line interface using `clap` and provides
//! the `run()` function that dispatches commands to the engine.
//!
//! ## Configuration Precedence
//!
//! Configuration is resolved with the following precedence (highest to lowest):
//! 1. CLI flags (e.g., `--config`, `--scan-fragment-pattern`)
//! 2. Environment variables (`RMERGE_CONFIG`, `RMERGE_WORKSPACE`, `RMERGE_FRAGMENT_PATTERN`, ...)
//! 3. Config file (`~/.rmerge/config.yaml` or path from `--config`/`RMERGE_CONFIG`)
//! 4. Built-in defaults

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crate::ui::format::plural;
use crate::ui::progress::format_duration;
use crate::ui::{table, ColorMode, MessageType, Progress, ProgressMode, Style};

use rmerge_core::{
    summarize, Classification, MergerEngine, MergerError, RunMode, RunOptions, RunSummary,
    ScanOptions, ScenarioKind, WorkspaceOutcome,
};

// ============================================================================
// CLI Definition
// ============================================================================

/// Version string including git commit hash
const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")");

/// Reconcile fragmentary copies of a repository against its golden copy
#[derive(Parser, Debug)]
#[command(name = "rmerge")]
#[command(author, version = VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, env = "RMERGE_VERBOSE")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, env = "RMERGE_QUIET", conflicts_with = "verbose")]
    pub quiet: bool,

    /// Path to configuration file (default: ~/.rmerge/config.yaml)
    #[arg(long, global = true, env = "RMERGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Color output mode
    #[arg(long, global = true, env = "RMERGE_COLOR", value_enum, default_value_t = ColorMode::Auto)]
    pub color: ColorMode,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stage golden and fragments in a workspace, inspect and optionally merge
    #[command(after_help = r#"EXAMPLES:
    # Analyze two fragments against a golden copy
    rmerge run --workspace merged --golden src/proj-golden \
        --fragment src/fragment-alpha --fragment backup.tar

    # Discover goldens and fragments under a directory and merge them
    rmerge run --workspace merged --scan --scan-source src --mode merge

    # Synthesize history for unversioned fragments, preview only
    rmerge run --workspace merged --golden src/proj-golden \
        --fragment src/fragment-alpha --recover-missing --dry-run

    # Resume merging at a given fragment
    rmerge run --workspace merged --golden src/proj-golden \
        --mode merge --resume-from 002-fragment-beta-5e6f7a8b
"#)]
    Run {
        /// Parent directory of the per-golden workspaces (default: workspace.root from config)
        #[arg(long, env = "RMERGE_WORKSPACE")]
        workspace: Option<PathBuf>,

        /// Authoritative repository (required unless --scan)
        #[arg(long)]
        golden: Option<PathBuf>,

        /// Fragment source; repeat for several
        #[arg(long = "fragment", value_name = "PATH")]
        fragments: Vec<PathBuf>,

        /// Workspace identifier (default: derived from golden's origin remote or name)
        #[arg(long)]
        identifier: Option<String>,

        /// analyze or merge
        #[arg(long, default_value = "analyze")]
        mode: RunMode,

        /// Compute results without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Replace existing workspace directories and golden mirror
        #[arg(long)]
        force: bool,

        /// Synthesize a git history for fragments that have none
        #[arg(long)]
        recover_missing: bool,

        /// Fragment id to resume merging from
        #[arg(long, value_name = "FRAGMENT_ID")]
        resume_from: Option<String>,

        /// Discover goldens and fragments under --scan-source
        #[arg(long, requires = "scan_source")]
        scan: bool,

        /// Directory to scan
        #[arg(long, value_name = "DIR")]
        scan_source: Option<PathBuf>,

        /// Create the scan source if it does not exist
        #[arg(long)]
        scan_create_structure: bool,

        /// Glob for golden directory names (default: scan.golden_pattern)
        #[arg(long, env = "RMERGE_GOLDEN_PATTERN", value_name = "GLOB")]
        scan_golden_pattern: Option<String>,

        /// Glob for fragment directory names (default: scan.fragment_pattern)
        #[arg(long, env = "RMERGE_FRAGMENT_PATTERN", value_name = "GLOB")]
        scan_fragment_pattern: Option<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Classify candidate repositories under a directory (read-only)
    #[command(after_help = r#"EXAMPLES:
    # List candidates under src/
    rmerge scan --source src

    # Custom patterns, skipping an archive directory
    rmerge scan --source src --fragment-pattern 'frag-*' --exclude src/archive
"#)]
    Scan {
        /// Directory to scan
        #[arg(long, value_name = "DIR")]
        source: PathBuf,

        /// Glob for golden directory names
        #[arg(long, env = "RMERGE_GOLDEN_PATTERN", value_name = "GLOB")]
        golden_pattern: Option<String>,

        /// Glob for fragment directory names
        #[arg(long, env = "RMERGE_FRAGMENT_PATTERN", value_name = "GLOB")]
        fragment_pattern: Option<String>,

        /// Path never descended into; repeat for several
        #[arg(long, value_name = "DIR")]
        exclude: Vec<PathBuf>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Re-render the summary of a workspace from its persisted reports
    Report {
        /// Workspace directory (`<root>/<identifier>`)
        #[arg(long, value_name = "DIR")]
        workspace: PathBuf,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List the scenarios a run can flag
    Scenarios {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

// ============================================================================
// Entry point
// ============================================================================

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    let filter = format!("rmerge_core={},rmerge_cli={}", log_level, log_level);

    tracing_subscriber::fmt()
        .with_env_filter(&filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let style = Style::new(cli.color);

    // Priority: --config flag > RMERGE_CONFIG env > ~/.rmerge/config.yaml
    let engine = match &cli.config {
        Some(config_path) => MergerEngine::with_config(config_path),
        None => MergerEngine::with_defaults(),
    };
    let engine = match engine {
        Ok(engine) => engine,
        Err(e) => {
            let hint = match &cli.config {
                Some(path) => format!("Check your config at {}", path.display()),
                None => "Check your global config at ~/.rmerge/config.yaml".to_string(),
            };
            eprintln!(
                "{}",
                style.error_with_context(
                    "Failed to initialize rmerge engine",
                    Some(&e.to_string()),
                    Some(&hint),
                )
            );
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Command::Run {
            workspace,
            golden,
            fragments,
            identifier,
            mode,
            dry_run,
            force,
            recover_missing,
            resume_from,
            scan,
            scan_source,
            scan_create_structure,
            scan_golden_pattern,
            scan_fragment_pattern,
            json,
        } => {
            let scan = match (scan, scan_source) {
                (true, Some(source)) => Some(ScanOptions {
                    source,
                    create_structure: scan_create_structure,
                    golden_pattern: scan_golden_pattern,
                    fragment_pattern: scan_fragment_pattern,
                }),
                _ => None,
            };
            let options = RunOptions {
                workspace_root: workspace
                    .or_else(|| engine.config().workspace.root.clone())
                    .unwrap_or_default(),
                golden,
                fragments,
                identifier,
                mode,
                dry_run,
                force,
                recover_missing,
                resume_from,
                scan,
            };
            handle_run(&style, &engine, options, cli.quiet, json)
        }
        Command::Scan {
            source,
            golden_pattern,
            fragment_pattern,
            exclude,
            json,
        } => handle_scan(
            &style,
            &engine,
            source,
            golden_pattern,
            fragment_pattern,
            exclude,
            json,
        ),
        Command::Report { workspace, json } => handle_report(&style, &engine, workspace, json),
        Command::Scenarios { json } => handle_scenarios(json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", render_error(&style, &e));
            ExitCode::FAILURE
        }
    }
}

fn render_error(style: &Style, error: &MergerError) -> String {
    match error {
        MergerError::InvalidConfiguration { message, hint } => {
            style.error_with_context(message, None, Some(hint))
        }
        MergerError::GitCommand { command, stderr } => style.error_with_context(
            &format!("git command failed: {}", command),
            Some(stderr.trim()),
            None,
        ),
        MergerError::GitUnavailable(_) => style.error_with_context(
            &error.to_string(),
            None,
            Some("Install git and make sure it is on PATH"),
        ),
        _ => style.message(MessageType::Err, &error.to_string()),
    }
}

// ============================================================================
// Command handlers
// ============================================================================

fn handle_run(
    style: &Style,
    engine: &MergerEngine,
    options: RunOptions,
    quiet: bool,
    json: bool,
) -> Result<(), MergerError> {
    if options.workspace_root.as_os_str().is_empty() {
        return Err(MergerError::InvalidArgument(
            "--workspace is required (or set workspace.root in the config file).".to_string(),
        ));
    }

    tracing::debug!("Run options: {:?}", options);
    let progress = Progress::spinner(
        &format!("Reconciling ({} mode)...", options.mode),
        ProgressMode::detect(quiet, json),
    );
    let result = engine.run(&options);
    let elapsed = progress.elapsed();
    progress.finish_clear();
    let summary = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    for outcome in &summary.workspaces {
        print_workspace(style, outcome);
        println!();
    }
    print_run_footer(style, &summary, elapsed);
    Ok(())
}

fn print_workspace(style: &Style, outcome: &WorkspaceOutcome) {
    println!(
        "{}",
        style.section(&format!("WORKSPACE {}", outcome.identifier))
    );
    println!();
    println!(
        "  {}",
        style.key_value("Root", &style.file_path(&outcome.root.display().to_string()))
    );
    println!(
        "  {}",
        style.key_value(
            "Golden",
            &format!(
                "{} ({})",
                outcome.golden.display(),
                style.status(&outcome.golden_status.to_string())
            )
        )
    );
    println!(
        "  {}",
        style.key_value("Fragments", &outcome.fragments.len().to_string())
    );

    let scan_table = table::render_scan_report_table(style, &outcome.scan_entries);
    if !scan_table.is_empty() {
        println!();
        println!("{}", scan_table);
    }

    for recovery in &outcome.recoveries {
        println!(
            "{}",
            style.message(
                MessageType::Ok,
                &format!(
                    "{}: {} ({})",
                    recovery.fragment_id,
                    style.status(&recovery.status.to_string()),
                    recovery.message
                )
            )
        );
    }

    let analysis_table = table::render_analysis_table(style, &outcome.analyses);
    if analysis_table.is_empty() {
        println!(
            "{}",
            style.message(MessageType::Skip, "No fragments to inspect.")
        );
    } else {
        println!();
        println!("{}", analysis_table);
    }

    if let Some(merges) = &outcome.merges {
        let merge_table = table::render_merge_table(style, merges);
        if merge_table.is_empty() {
            println!("{}", style.message(MessageType::Skip, "No fragments merged."));
        } else {
            println!();
            println!("{}", merge_table);
        }
    }

    for scenario in outcome
        .scenarios
        .iter()
        .filter(|s| s.kind.strategy() == rmerge_core::HandlingStrategy::Surface)
    {
        println!(
            "{}",
            style.message(
                MessageType::Warn,
                &format!("{} ({})", scenario.description, scenario.handler)
            )
        );
    }
}

fn print_run_footer(style: &Style, summary: &RunSummary, elapsed: std::time::Duration) {
    if let Some(stats) = &summary.scan {
        println!(
            "{}",
            style.message(
                MessageType::Info,
                &format!(
                    "Scan: {}, {} pending, {} ingested",
                    plural(stats.goldens, "golden"),
                    stats.pending_fragments,
                    stats.fragments_ingested
                )
            )
        );
        println!(
            "{}",
            style.message_detail(
                "Goldens",
                &format!(
                    "{} installed, {} existing, {} replaced",
                    stats.goldens_installed, stats.goldens_existing, stats.goldens_replaced
                )
            )
        );
    }

    if summary.dry_run {
        println!(
            "{}",
            style.message(MessageType::Info, "Dry run: no changes were written.")
        );
    }
    println!(
        "{}",
        style.message(
            MessageType::Ok,
            &format!(
                "{} complete for {} ({})",
                match summary.mode {
                    RunMode::Analyze => "Analysis",
                    RunMode::Merge => "Merge",
                },
                plural(summary.workspaces.len(), "workspace"),
                format_duration(elapsed)
            )
        )
    );
}

#[allow(clippy::too_many_arguments)]
fn handle_scan(
    style: &Style,
    engine: &MergerEngine,
    source: PathBuf,
    golden_pattern: Option<String>,
    fragment_pattern: Option<String>,
    exclude: Vec<PathBuf>,
    json: bool,
) -> Result<(), MergerError> {
    let candidates = engine.scan(
        &source,
        golden_pattern.as_deref(),
        fragment_pattern.as_deref(),
        &exclude,
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&candidates)?);
        return Ok(());
    }

    if candidates.is_empty() {
        println!(
            "{}",
            style.message(
                MessageType::Info,
                &format!("No candidates found under {}", source.display())
            )
        );
        return Ok(());
    }

    let base = source.canonicalize().unwrap_or(source);
    println!("{}", table::render_candidates_table(style, &candidates, &base));
    println!();
    let goldens = candidates
        .iter()
        .filter(|c| c.classification == Classification::Golden)
        .count();
    println!(
        "{}",
        style.message(
            MessageType::Ok,
            &format!(
                "Found {} and {}",
                plural(goldens, "golden"),
                plural(candidates.len() - goldens, "fragment")
            )
        )
    );
    Ok(())
}

fn handle_report(
    style: &Style,
    engine: &MergerEngine,
    workspace: PathBuf,
    json: bool,
) -> Result<(), MergerError> {
    let (analyses, merges) = engine.load_report(&workspace)?;

    if json {
        let value = serde_json::json!({
            "fragments": analyses,
            "merges": merges,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    if analyses.is_empty() && merges.is_empty() {
        println!(
            "{}",
            style.message(
                MessageType::Warn,
                &format!("No persisted results in {}", workspace.display())
            )
        );
        return Ok(());
    }

    println!("{}", summarize(&analyses, Some(&merges)));
    Ok(())
}

fn handle_scenarios(json: bool) -> Result<(), MergerError> {
    if json {
        let catalogue: Vec<serde_json::Value> = ScenarioKind::ALL
            .iter()
            .map(|kind| {
                serde_json::json!({
                    "kind": kind.as_str(),
                    "handler": kind.handler_id(),
                    "strategy": kind.strategy().as_str(),
                    "description": kind.description(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&catalogue)?);
        return Ok(());
    }

    println!("{}", table::render_scenario_table());
    Ok(())
}
