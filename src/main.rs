// ABOUTME: CLI entry point for glance-manage
// ABOUTME: Parses the command line and runs one migration command against PostgreSQL

use std::process::ExitCode;

use clap::Parser;
use glance_manage::cli::Cli;
use glance_manage::migration::PostgresEngine;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let outcome = glance_manage::run(
        &cli,
        |config| Ok(PostgresEngine::new(config.database()?)),
        &mut std::io::stdout(),
        &mut std::io::stderr(),
    )
    .await?;

    Ok(outcome.into())
}
