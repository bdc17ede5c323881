// ABOUTME: Logging initialization for glance-manage
// ABOUTME: Configures the tracing subscriber from RUST_LOG or the loaded config

use anyhow::{anyhow, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Install the global tracing subscriber for `service`.
///
/// Precedence for the filter:
/// 1. RUST_LOG environment variable
/// 2. `debug` (debug level) or `verbose` (info level) from the config
/// 3. warn
///
/// Calling this again after a subscriber is installed leaves the first one in place.
pub fn setup(service: &str, config: &Config) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(config)));

    let builder = tracing_subscriber::fmt().with_env_filter(env_filter);

    let installed = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| anyhow!("failed to open log file {}: {}", path.display(), e))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .is_ok()
        }
        None => builder.with_writer(std::io::stderr).try_init().is_ok(),
    };

    if installed {
        tracing::debug!(service, sources = ?config.sources, "Logging initialized");
    }
    Ok(())
}

fn default_level(config: &Config) -> &'static str {
    if config.debug {
        "debug"
    } else if config.verbose {
        "info"
    } else {
        "warn"
    }
}
