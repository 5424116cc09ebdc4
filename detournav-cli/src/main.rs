//! navmeshtool - navigation mesh pre-generation
//!
//! Builds every navmesh tile of a scene ahead of time and stores it in the
//! navmesh database, so a running navigator loads tiles instead of building
//! them.

mod commands;
mod error;
mod progress;
mod scene;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use detournav::logging::{init_logging, LoggingConfig};
use tracing::error;

use commands::db::DbAction;
use commands::generate::GenerateArgs;

#[derive(Parser)]
#[command(name = "navmeshtool", version, about = "Navigation mesh pre-generation tool")]
struct Cli {
    /// Navigator configuration file (INI)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Navmesh database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Log filter, e.g. `info` or `detournav=debug`
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Directory to write a log file to
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate all navmesh tiles of a scene into the database
    Generate(GenerateArgs),

    /// Inspect and maintain the navmesh database
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::default().with_level(cli.log_level);
    if let Some(directory) = cli.log_dir {
        logging = logging.with_directory(directory);
    }
    let _guard = match init_logging(&logging) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            None
        }
    };

    let result = match cli.command {
        Commands::Generate(args) => commands::generate::run(args, cli.config, cli.db),
        Commands::Db { action } => commands::db::run(action, cli.config, cli.db),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
