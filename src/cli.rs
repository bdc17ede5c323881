// ABOUTME: Command-line surface for glance-manage
// ABOUTME: Global options, engine options, and the management subcommand set

use clap::Parser;
use std::path::PathBuf;

use crate::commands::Command;
use crate::config::ConfigOverrides;
use crate::migration::DatabaseArgs;

#[derive(Parser, Debug)]
#[command(name = "glance-manage")]
#[command(about = "Glance database migration management utility", long_about = None)]
#[command(override_usage = "glance-manage [options] <cmd>")]
#[command(version)]
pub struct Cli {
    /// Config file to use instead of the discovered defaults (repeatable; earlier files win)
    #[arg(long = "config-file", value_name = "PATH", global = true)]
    pub config_files: Vec<PathBuf>,

    /// Directory of additional *.toml config files, read after --config-file
    #[arg(long = "config-dir", value_name = "DIR", global = true)]
    pub config_dir: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Log informational output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Append log output to this file instead of stderr
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    #[command(flatten)]
    pub database: DatabaseArgs,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Options given on the command line, ready to layer over config files.
    ///
    /// Flags that were not passed are left out so config files can still set them.
    pub fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::default();
        if self.debug {
            overrides.set("debug", true);
        }
        if self.verbose {
            overrides.set("verbose", true);
        }
        if let Some(path) = &self.log_file {
            overrides.set("log_file", path.display().to_string());
        }
        self.database.apply_to(&mut overrides);
        overrides
    }
}
