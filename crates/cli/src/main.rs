//! datalift — upload directory snapshots to the data hub.

mod cli;
mod commands;
mod config;
mod error;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    let config = config::Config::from_env();

    let result = match cli.command {
        Command::Init { name, namespace } => commands::init::run(&name, namespace),
        Command::Upload { resume } => commands::upload::run(&config, resume).await,
        Command::Status => commands::status::run(&config).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        if e.is_retryable() {
            eprintln!("Your session was preserved. Retry with `datalift upload --resume`.");
        }
        std::process::exit(e.exit_code());
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("DATALIFT_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
