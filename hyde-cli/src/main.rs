mod actions;
mod commands;
mod extensions;
mod runner;
mod sysinfo_panel;
mod telemetry;
mod tui;
mod ui;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};

use hyde_core::config::HydeConfig;

use telemetry::LogTarget;

#[derive(Parser)]
#[command(name = "hyde-tui", version)]
#[command(about = "Terminal console for installing and maintaining HyDE", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (defaults to hyde.yaml discovery)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More diagnostic output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive console (default)
    Tui {
        /// Use mock extensions that never touch the system
        #[arg(long)]
        demo: bool,
    },
    /// Run a named script from the scripts directory
    Run { script: String },
    /// Run the fresh-install flow without the console
    Install {
        #[arg(long)]
        demo: bool,
    },
    /// Check the environment
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = std::env::current_dir().context("failed to read current directory")?;
    let (config_path, config) =
        HydeConfig::resolve(cli.config.as_deref(), &cwd).context("invalid configuration")?;

    let command = cli.command.unwrap_or(Commands::Tui { demo: false });
    let target = match command {
        Commands::Tui { .. } => LogTarget::File(config.log_file()),
        _ => LogTarget::Stderr,
    };
    telemetry::init_tracing(cli.verbose, cli.quiet, target)?;
    match &config_path {
        Some(path) => tracing::debug!(path = %path.display(), "loaded config"),
        None => tracing::debug!("no config file found, using defaults"),
    }

    match command {
        Commands::Tui { demo } => {
            let provider = extensions::select_provider(&config, demo);
            tui::run_tui(config, provider).await
        }
        Commands::Run { script } => {
            let code = commands::run_script(&config, &script).await?;
            std::process::exit(code);
        }
        Commands::Install { demo } => {
            let provider = extensions::select_provider(&config, demo);
            if !commands::run_install(&config, provider.as_ref()).await {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Doctor => {
            let provider = extensions::select_provider(&config, false);
            if !commands::run_doctor(config_path.as_deref(), &config, provider.as_ref()) {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
