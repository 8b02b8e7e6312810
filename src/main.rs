use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use agile_board::{
    board::{AlwaysConfirm, Board, Confirmation},
    cli::{self, RootCommand, StdinConfirm},
    logging::init_logging,
    settings::Settings,
    storage::JsonDirStore,
};

#[derive(Parser, Debug)]
#[command(
    name = "agile-board",
    about = "Local kanban board for projects, columns and tasks",
    long_about = "Manage projects with ordered columns and tasks. Boards are stored as JSON files in the data directory.",
    version,
    author
)]
struct Cli {
    /// Directory holding projects.json, columns.json and tasks.json.
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    quiet: bool,

    /// Skip delete confirmations.
    #[arg(short, long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: RootCommand,
}

fn main() {
    let log_guard = match init_logging() {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("warning: failed to initialize logging: {err:#}");
            None
        }
    };

    let code = match run_app() {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "agile-board failed");
            eprintln!("error[RUNTIME_ERROR]: {err:#}");
            5
        }
    };

    // Flush queued log events; process::exit skips destructors.
    drop(log_guard);
    std::process::exit(code);
}

fn run_app() -> Result<i32> {
    let cli = Cli::parse();
    let command = match cli.command {
        RootCommand::Settings { command } => {
            return Ok(cli::run_settings(command, cli.json, cli.quiet));
        }
        command => command,
    };
    let settings = Settings::load();

    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| settings.resolved_data_dir());
    let store = JsonDirStore::open(&data_dir)
        .with_context(|| format!("failed to open data directory '{}'", data_dir.display()))?;
    info!("using data directory {}", store.dir().display());

    let mut board =
        Board::load(Box::new(store)).with_default_columns(settings.default_columns.clone());

    let confirm: Box<dyn Confirmation> = if cli.yes || !settings.confirm_deletes {
        Box::new(AlwaysConfirm)
    } else {
        Box::new(StdinConfirm)
    };

    Ok(cli::run(
        &mut board,
        command,
        confirm.as_ref(),
        cli.json,
        cli.quiet,
    ))
}
