//! CLI entry point for the archiver tool.

use anyhow::Result;
use clap::Parser;
use tracing::{debug, info};

mod cli;
mod commands;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");
    let config_path = args.config.as_deref();

    match &args.command {
        Command::Sync(sync_args) => {
            info!("Archiver starting");
            commands::run_sync_command(config_path, sync_args).await?;
        }
        Command::Status(status_args) => {
            commands::run_status_command(config_path, status_args)?;
        }
        Command::Forget(forget_args) => {
            commands::run_forget_command(config_path, forget_args)?;
        }
    }

    Ok(())
}
