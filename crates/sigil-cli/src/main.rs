//! Operator CLI for the Sigil protocol
//!
//! Runs authenticated key-establishment sessions against a configured
//! backend, sweeps a standing channel for tampering, and prints audit
//! records as JSON lines for downstream tooling.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;

use commands::{devices, monitor, run};

#[derive(Parser)]
#[command(name = "sigil")]
#[command(about = "Sigil - quantum channel authentication and key establishment", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, global = true, default_value = "sigil.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one full session for a device
    Run(run::RunArgs),

    /// Repeated tamper sweeps over the standing channel
    Monitor(monitor::MonitorArgs),

    /// List the device registry
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    let config = config::load(&cli.config)?;

    match cli.command {
        Commands::Run(args) => run::handle(args, config).await,
        Commands::Monitor(args) => monitor::handle(args, config).await,
        Commands::Devices => devices::handle(&config),
    }
}
