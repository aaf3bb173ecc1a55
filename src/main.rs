use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use divrole::core::log::init_logging;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for divrole::AppCommand {
    fn from(cmd: Commands) -> divrole::AppCommand {
        match cmd {
            Commands::Evaluate { symbols } => divrole::AppCommand::Evaluate { symbols },
            Commands::Rules => divrole::AppCommand::Rules,
            Commands::Portfolio { path } => divrole::AppCommand::Portfolio { path },
            Commands::Serve { bind } => divrole::AppCommand::Serve { bind },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Fetch metrics and evaluate one or more symbols or ISINs
    Evaluate {
        #[arg(required = true)]
        symbols: Vec<String>,
    },
    /// Display the active KPI thresholds and roles
    Rules,
    /// Summarize a portfolio or holdings CSV export
    Portfolio { path: PathBuf },
    /// Run the HTTP API
    Serve {
        /// Address to listen on, overrides the config
        #[arg(short, long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => divrole::cli::setup::setup_at_path(path),
            None => divrole::cli::setup::setup(),
        },
        Some(cmd) => divrole::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
