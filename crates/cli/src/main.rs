//! wsync command-line tool.
//!
//! Brings a workspace of version-controlled checkouts in line with one or
//! more rosinstall manifests, resolving URI and VCS-type changes according to
//! the policy flags.

mod prompt;
mod style;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use wsync_core::manifest::WORKSPACE_MANIFEST;
use wsync_core::{
    ConflictMode, EntryStatus, Manifest, Policy, ReconcileReport, Reconciler, ToolConfig,
};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Synchronize a workspace of git, hg, svn and bzr checkouts with rosinstall
/// manifests.
#[derive(Parser, Debug)]
#[command(name = "wsync", version, about)]
#[command(group(
    ArgGroup::new("policy")
        .args(["delete_changed_uri", "abort_changed_uri", "backup_changed_uri"])
))]
struct Cli {
    /// Workspace directory.
    workspace: PathBuf,

    /// Manifest files or directories containing a `.rosinstall`, layered in
    /// order. Defaults to the workspace's own manifest.
    sources: Vec<PathBuf>,

    /// Never prompt; unresolved conflicts fail.
    #[arg(short = 'n', long)]
    non_interactive: bool,

    /// Delete checkouts whose URI or VCS type changed and check out afresh.
    #[arg(long)]
    delete_changed_uri: bool,

    /// Fail instead of touching checkouts whose URI or VCS type changed.
    #[arg(long)]
    abort_changed_uri: bool,

    /// Move checkouts whose URI or VCS type changed into this directory,
    /// then check out afresh.
    #[arg(long, value_name = "DIR")]
    backup_changed_uri: Option<PathBuf>,

    /// Keep going after an entry fails.
    #[arg(long)]
    continue_on_error: bool,

    /// Path to the TOML tool configuration.
    #[arg(short, long, env = wsync_core::config::CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn conflict_mode(&self) -> ConflictMode {
        if self.delete_changed_uri {
            ConflictMode::DeleteChanged
        } else if self.abort_changed_uri {
            ConflictMode::AbortChanged
        } else if let Some(dir) = &self.backup_changed_uri {
            ConflictMode::BackupChanged(dir.clone())
        } else {
            ConflictMode::Fail
        }
    }

    /// Prompting needs a terminal, no `-n` and no policy flag.
    fn interactive(&self) -> bool {
        !self.non_interactive
            && self.conflict_mode() == ConflictMode::Fail
            && std::io::stdin().is_terminal()
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(report) if report.success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{}", style::error(&format!("{:#}", e)));
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<ReconcileReport> {
    let config = ToolConfig::discover(cli.config.as_deref())
        .context("failed to load configuration")?;

    let manifest = load_manifest(&cli.workspace, &cli.sources)?;
    manifest
        .save_to_workspace(&cli.workspace)
        .context("failed to write workspace manifest")?;

    let policy = Policy::new(cli.conflict_mode())
        .continue_on_error(cli.continue_on_error)
        .interactive(cli.interactive());
    debug!(?policy, "policy");

    let mut reconciler = Reconciler::from_config(&cli.workspace, &config);
    if policy.interactive {
        let backups = reconciler.workspace().join(".wsync-backups");
        reconciler = reconciler.with_prompt(Box::new(prompt::TerminalPrompt::new(backups)));
    }

    let report = reconciler.reconcile(&manifest, &policy).await;
    print_report(&report);
    Ok(report)
}

// ---------------------------------------------------------------------------
// Manifest helpers
// ---------------------------------------------------------------------------

/// The workspace's existing manifest (if any) with every source layered on
/// top.
fn load_manifest(workspace: &Path, sources: &[PathBuf]) -> Result<Manifest> {
    let existing = workspace.join(WORKSPACE_MANIFEST);
    let mut manifest = if existing.is_file() {
        Manifest::load_file(&existing)
            .with_context(|| format!("failed to read {}", existing.display()))?
    } else if sources.is_empty() {
        anyhow::bail!(
            "no sources given and {} does not exist",
            existing.display()
        );
    } else {
        Manifest::default()
    };

    for source in sources {
        let layer = Manifest::load_source(source)
            .with_context(|| format!("failed to load source {}", source.display()))?;
        manifest.merge(layer);
    }
    Ok(manifest)
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_report(report: &ReconcileReport) {
    for outcome in &report.outcomes {
        let name = format!("{} ({})", outcome.local_name, outcome.vcs_kind);
        let line = match &outcome.status {
            EntryStatus::Succeeded { action, backup } => {
                let mut msg = format!("{name}: {action}");
                if let Some(backup) = backup {
                    msg.push_str(&format!(", previous contents in {}", backup.display()));
                }
                style::success(&msg)
            }
            EntryStatus::Failed(detail) => style::error(&format!("{name}: {detail}")),
            EntryStatus::Aborted(detail) => style::error(&format!("{name}: aborted, {detail}")),
            EntryStatus::Skipped(detail) => style::warn(&format!("{name}: skipped, {detail}")),
        };
        if outcome.status.is_failure() {
            eprintln!("{line}");
        } else {
            println!("{line}");
        }
    }
    if report.outcomes.is_empty() {
        println!("{}", style::dim("manifest has no entries"));
        return;
    }

    let count = |label: &str| {
        report
            .outcomes
            .iter()
            .filter(|o| o.status.label() == label)
            .count()
    };

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["ok", "skipped", "failed", "aborted"]);
    table.add_row(vec![
        Cell::new(count("ok")),
        Cell::new(count("skipped")),
        Cell::new(count("failed")),
        Cell::new(count("aborted")),
    ]);

    println!();
    println!("{}", style::header("Summary"));
    println!("{table}");
    if report.halted {
        println!(
            "{}",
            style::warn("stopped at the first failure; use --continue-on-error to keep going")
        );
    }
}
