// ABOUTME: Startup sequence and error reporting for glance-manage
// ABOUTME: Loads config, sets up logging, runs one command and maps expected failures to exits

use std::fmt::Display;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;

use crate::cli::Cli;
use crate::commands;
use crate::config::{self, Config, ConfigError, PROJECT};
use crate::error::ManageError;
use crate::logging;
use crate::migration::MigrationEngine;

/// How a run ended when it did not hit an unexpected error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success => ExitCode::SUCCESS,
            Outcome::Failure => ExitCode::FAILURE,
        }
    }
}

/// Run the parsed command line.
///
/// Configuration and logging failures, and `ManageError`s raised by the command,
/// are written to `err` as `ERROR: <message>` and yield `Outcome::Failure`.
/// Every other error is returned to the caller untouched.
pub async fn run<E, F, O, W>(
    cli: &Cli,
    open_engine: F,
    out: &mut O,
    err: &mut W,
) -> Result<Outcome>
where
    E: MigrationEngine,
    F: FnOnce(&Config) -> Result<E, ConfigError>,
    O: Write,
    W: Write,
{
    let (config, engine) = match setup(cli, open_engine) {
        Ok(ready) => ready,
        Err(e) => return report(err, e),
    };

    match commands::execute(&cli.command, &engine, out).await {
        Ok(()) => Ok(Outcome::Success),
        Err(e) => match e.downcast_ref::<ManageError>() {
            Some(domain) => {
                tracing::debug!(
                    command = cli.command.name(),
                    sources = ?config.sources,
                    "Command failed: {:#}",
                    e
                );
                report(err, domain)
            }
            None => Err(e),
        },
    }
}

fn setup<E, F>(cli: &Cli, open_engine: F) -> Result<(Config, E)>
where
    F: FnOnce(&Config) -> Result<E, ConfigError>,
{
    let files = config_files(cli)?;
    let config = Config::load(&files, cli.overrides())?;
    logging::setup(PROJECT, &config)?;
    let engine = open_engine(&config)?;
    Ok((config, engine))
}

/// Explicit `--config-file` paths replace discovery; `--config-dir` adds to either.
fn config_files(cli: &Cli) -> Result<Vec<PathBuf>, ConfigError> {
    let mut files = if cli.config_files.is_empty() {
        config::default_config_files(PROJECT)
    } else {
        cli.config_files.clone()
    };
    if let Some(dir) = &cli.config_dir {
        files.extend(config::files_in_dir(dir)?);
    }
    Ok(files)
}

fn report<W: Write>(err: &mut W, message: impl Display) -> Result<Outcome> {
    writeln!(err, "ERROR: {}", message)?;
    Ok(Outcome::Failure)
}
