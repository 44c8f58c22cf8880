//! Command-line interface for vaultbench.
//!
//! Provides commands for suite validation, benchmark runs, report
//! inspection, and run retention.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::artifacts::ArtifactStore;
use crate::config::{HarnessConfig, DEFAULT_BENCH_ROOT};
use crate::driver::{AgentDriver, NoopDriver, OracleDriver};
use crate::report;
use crate::runner::RunOrchestrator;
use crate::sandbox::{SandboxManager, DEFAULT_KEEP_RUNS};
use crate::storage::{join, FsVault, VaultStorage};
use crate::suite::{BenchmarkSuite, Difficulty};

/// Benchmark harness for multi-step file-editing agent evaluation.
#[derive(Parser)]
#[command(name = "vaultbench")]
#[command(about = "Run file-editing benchmark suites against agent drivers")]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Parse a suite file and report validation problems.
    Validate(ValidateArgs),

    /// Run a suite against a driver and persist run artifacts.
    Run(RunArgs),

    /// Print the markdown report of a stored run.
    Report(ReportArgs),

    /// Delete stored runs beyond the retention limit.
    Prune(PruneArgs),
}

/// Arguments for `vaultbench validate`.
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Suite definition file (.yaml, .yml or .json).
    pub suite: PathBuf,
}

/// Built-in drivers selectable from the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DriverKind {
    /// Replies to every prompt without editing anything.
    Noop,
    /// Applies the expected updates directly. Calibration only.
    Oracle,
}

/// Arguments for `vaultbench run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Suite definition file (.yaml, .yml or .json).
    pub suite: PathBuf,

    /// Model identifier recorded in run artifacts.
    #[arg(short, long, default_value = "unknown")]
    pub model: String,

    /// Driver to execute the cases with.
    #[arg(short, long, value_enum, default_value_t = DriverKind::Noop)]
    pub driver: DriverKind,

    /// Only run cases matching this difficulty level (easy, medium, hard).
    #[arg(long)]
    pub difficulty: Option<Difficulty>,

    /// Filesystem directory backing the vault.
    #[arg(long, default_value = ".")]
    pub vault: PathBuf,

    /// Vault folder holding the sandbox and run artifacts.
    #[arg(long, default_value = DEFAULT_BENCH_ROOT)]
    pub root: String,

    /// Historical runs to keep after this one.
    #[arg(long, default_value_t = DEFAULT_KEEP_RUNS)]
    pub keep: usize,

    /// Skip copying the sandbox tree into run artifacts.
    #[arg(long)]
    pub no_snapshots: bool,
}

/// Arguments for `vaultbench report`.
#[derive(Parser, Debug)]
pub struct ReportArgs {
    /// Filesystem directory backing the vault.
    #[arg(long, default_value = ".")]
    pub vault: PathBuf,

    /// Vault folder holding the sandbox and run artifacts.
    #[arg(long, default_value = DEFAULT_BENCH_ROOT)]
    pub root: String,

    /// Run id to report on. Defaults to the most recent run.
    pub run_id: Option<String>,
}

/// Arguments for `vaultbench prune`.
#[derive(Parser, Debug)]
pub struct PruneArgs {
    /// Filesystem directory backing the vault.
    #[arg(long, default_value = ".")]
    pub vault: PathBuf,

    /// Vault folder holding the sandbox and run artifacts.
    #[arg(long, default_value = DEFAULT_BENCH_ROOT)]
    pub root: String,

    /// Historical runs to keep.
    #[arg(long, default_value_t = DEFAULT_KEEP_RUNS)]
    pub keep: usize,
}

/// Parse CLI arguments without executing.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Execute a parsed CLI invocation.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Validate(args) => run_validate_command(args),
        Commands::Run(args) => run_run_command(args).await,
        Commands::Report(args) => run_report_command(args),
        Commands::Prune(args) => run_prune_command(args),
    }
}

fn run_validate_command(args: ValidateArgs) -> anyhow::Result<()> {
    let suite = BenchmarkSuite::load(&args.suite)?;
    println!(
        "Suite `{}` v{} is valid: {} cases, {} fixture files",
        suite.id,
        suite.version,
        suite.cases.len(),
        suite.fixture.len()
    );
    Ok(())
}

async fn run_run_command(args: RunArgs) -> anyhow::Result<()> {
    let mut suite = BenchmarkSuite::load(&args.suite)?;
    if let Some(level) = args.difficulty {
        suite.cases.retain(|c| c.difficulty == level);
        if suite.cases.is_empty() {
            anyhow::bail!("no cases in the suite match difficulty {}", level);
        }
    }
    let storage: Arc<dyn VaultStorage> = Arc::new(FsVault::new(&args.vault));

    let mut config = HarnessConfig::default()
        .with_bench_root(args.root)
        .with_keep_runs(args.keep);
    if args.no_snapshots {
        config = config.without_vault_snapshots();
    }

    let driver: Box<dyn AgentDriver> = match args.driver {
        DriverKind::Noop => Box::new(NoopDriver),
        DriverKind::Oracle => Box::new(OracleDriver::from_suite(&suite)),
    };

    let orchestrator = RunOrchestrator::new(storage, config);
    let cancel = CancellationToken::new();
    let run = orchestrator
        .run(&suite, &args.model, driver.as_ref(), cancel)
        .await?;

    println!(
        "Run {} complete: {:.1}/{:.1} points ({:.1}%), {} passed / {} cases",
        run.run_id,
        run.total_points_earned,
        run.total_max_points,
        run.score_percent,
        run.passed_count(),
        run.cases.len()
    );
    Ok(())
}

fn run_report_command(args: ReportArgs) -> anyhow::Result<()> {
    let storage = FsVault::new(&args.vault);
    let runs_root = join(&args.root, "runs");

    let run_id = match args.run_id {
        Some(id) => id,
        None => {
            let listing = storage.list(&runs_root)?;
            let latest = listing
                .folders
                .iter()
                .filter_map(|f| f.rsplit('/').next())
                .max()
                .map(str::to_string);
            latest.ok_or_else(|| anyhow::anyhow!("no runs found under {}", runs_root))?
        }
    };

    let store = ArtifactStore::new(Arc::new(storage));
    let run = store.load_run(&join(&runs_root, &run_id))?;
    print!("{}", report::render_markdown(&run));
    Ok(())
}

fn run_prune_command(args: PruneArgs) -> anyhow::Result<()> {
    let storage: Arc<dyn VaultStorage> = Arc::new(FsVault::new(&args.vault));
    let sandbox = SandboxManager::new(storage, args.root.clone());
    let removed = sandbox.prune_old_runs(&join(&args.root, "runs"), args.keep)?;
    info!(removed, keep = args.keep, "Retention pruning done");
    println!("Removed {} old run(s)", removed);
    Ok(())
}
