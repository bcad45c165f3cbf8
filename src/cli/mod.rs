use std::env;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{ConfigLoader, CONFIG_ENV};

pub mod commands;

use self::commands::{EditArgs, PushArgs, ShowArgs};

#[derive(Parser, Debug)]
#[command(
    name = "notepad",
    version,
    about = "Keyboard-first checklist notepad that saves to a note endpoint"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over NOTEPAD_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open the interactive checklist editor (default)
    Edit(EditArgs),
    /// Send a note to the endpoint once and report the outcome
    Push(PushArgs),
    /// Print a note file as a plain-text checklist
    Show(ShowArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var(CONFIG_ENV, path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    let command = cli
        .command
        .unwrap_or_else(|| Commands::Edit(EditArgs::default()));
    let log_target = match command {
        Commands::Edit(_) => LogTarget::File(loader.paths().log_file()),
        _ => LogTarget::Stderr,
    };
    init_tracing(&cli.log_level, &log_target)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let config = Arc::new(loader.load_or_init()?);

    match command {
        Commands::Edit(args) => commands::run_edit(config, args),
        Commands::Push(args) => commands::push_note(config, args),
        Commands::Show(args) => commands::show_note(args),
    }
}

enum LogTarget {
    Stderr,
    /// The editor owns the terminal, so its logs go to a file instead.
    File(PathBuf),
}

fn init_tracing(level: &str, target: &LogTarget) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| -> Result<()> {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        match target {
            LogTarget::Stderr => fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init(),
            LogTarget::File(path) => fmt()
                .with_env_filter(env_filter)
                .with_ansi(false)
                .with_writer(Mutex::new(open_log(path)?))
                .init(),
        }
        Ok(())
    })
    .map(|_| ())
}

fn open_log(path: &Path) -> Result<std::fs::File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))
}
