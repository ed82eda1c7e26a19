//! lotto645 - Lotto 6/45 purchase automation
//!
//! Runs one task immediately, or stays up as a weekly scheduler.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lotto645_core::config::DEFAULT_CONFIG_PATH;
use lotto645_core::{Config, TaskEnv, TaskKind, tasks};
use tracing::{info, warn};

mod logging;
mod scheduler;

/// lotto645 - Lotto 6/45 purchase automation
#[derive(Parser, Debug)]
#[command(name = "lotto645")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the JSON or TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level or filter directive (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Directory for daily log files
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Run the weekly schedule until interrupted
    Service,

    /// Buy the configured number of lines for every account (default)
    Buy,

    /// Report every account's deposit balance
    CheckBalance,

    /// Buy only for accounts whose balance covers the purchase
    CheckAndBuy,

    /// Compare the last recorded purchase with the latest draw
    CheckWinning,

    /// Log in and inspect without buying
    DryRun,
}

impl Command {
    const fn task(self) -> Option<TaskKind> {
        match self {
            Self::Service => None,
            Self::Buy => Some(TaskKind::Buy),
            Self::CheckBalance => Some(TaskKind::CheckBalance),
            Self::CheckAndBuy => Some(TaskKind::CheckBalanceAndBuy),
            Self::CheckWinning => Some(TaskKind::CheckWinning),
            Self::DryRun => Some(TaskKind::DryRun),
        }
    }
}

fn run_service(config: Config, env: TaskEnv) -> Result<()> {
    let config = Arc::new(config);
    // Held here so the blocking HTTP clients inside are dropped outside the
    // runtime.
    let env = Arc::new(env);
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?
        .block_on(scheduler::run(Arc::clone(&config), Arc::clone(&env)))
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Buy);

    let guard = logging::init(&cli.log_level, &cli.log_dir)?;
    info!(log_file = %guard.path().display(), command = ?command, "lotto645 starting");

    let config = Config::load(&cli.config)
        .with_context(|| format!("failed to load configuration ({})", cli.config.display()))?;
    config.describe();
    let env = TaskEnv::from_config(&config);

    let Some(kind) = command.task() else {
        run_service(config, env)?;
        return Ok(ExitCode::SUCCESS);
    };

    let summary = tasks::run(kind, &config.accounts, &env);
    if summary.failed > 0 {
        warn!(
            task = %kind,
            failed = summary.failed,
            "one or more accounts did not complete"
        );
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
