// ABOUTME: Management subcommands and their handlers
// ABOUTME: Maps each command to exactly one migration engine operation

use std::io::Write;

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::migration::MigrationEngine;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the database's current migration level
    #[command(name = "db_version")]
    DbVersion,
    /// Upgrade the database's migration level
    #[command(name = "upgrade")]
    Upgrade {
        /// Target version (defaults to the latest available)
        version: Option<String>,
    },
    /// Downgrade the database's migration level
    #[command(name = "downgrade")]
    Downgrade {
        /// Target version
        version: String,
    },
    /// Place a database under migration control
    #[command(name = "version_control")]
    VersionControl {
        /// Initial version (defaults to 0)
        version: Option<String>,
    },
    /// Place a database under migration control and upgrade it, creating it first if necessary
    #[command(name = "db_sync")]
    DbSync {
        /// Target version (defaults to the latest available)
        version: Option<String>,
        /// Version to assume the database is currently at
        current_version: Option<String>,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::DbVersion => "db_version",
            Command::Upgrade { .. } => "upgrade",
            Command::Downgrade { .. } => "downgrade",
            Command::VersionControl { .. } => "version_control",
            Command::DbSync { .. } => "db_sync",
        }
    }
}

/// Run `command` against `engine`. Only `db_version` writes to `out`.
pub async fn execute<E, W>(command: &Command, engine: &E, out: &mut W) -> Result<()>
where
    E: MigrationEngine,
    W: Write,
{
    tracing::debug!("Running {}", command.name());

    match command {
        Command::DbVersion => {
            let version = engine.db_version().await?;
            writeln!(out, "{}", version).context("Failed to write version")?;
        }
        Command::Upgrade { version } => {
            let reached = engine.upgrade(version.as_deref()).await?;
            tracing::info!("Database is at version {}", reached);
        }
        Command::Downgrade { version } => {
            let reached = engine.downgrade(version).await?;
            tracing::info!("Database is at version {}", reached);
        }
        Command::VersionControl { version } => {
            engine.version_control(version.as_deref()).await?;
        }
        Command::DbSync {
            version,
            current_version,
        } => {
            let reached = engine
                .db_sync(version.as_deref(), current_version.as_deref())
                .await?;
            tracing::info!("Database is at version {}", reached);
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;
    use std::rc::Rc;

    use anyhow::Result;

    use crate::error::ManageError;
    use crate::migration::{MigrationEngine, Version};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        DbVersion,
        Upgrade(Option<String>),
        Downgrade(String),
        VersionControl(Option<String>),
        DbSync(Option<String>, Option<String>),
    }

    /// Engine double that records every call and answers with a fixed version
    /// or a domain error.
    #[derive(Default)]
    pub struct RecordingEngine {
        pub calls: Rc<RefCell<Vec<Call>>>,
        pub version: Version,
        pub fail_with: Option<String>,
    }

    impl RecordingEngine {
        pub fn at(version: u32) -> Self {
            Self {
                version: Version::new(version),
                ..Default::default()
            }
        }

        pub fn failing(message: &str) -> Self {
            Self {
                fail_with: Some(message.to_string()),
                ..Default::default()
            }
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.borrow().clone()
        }

        fn answer(&self, call: Call) -> Result<Version> {
            self.calls.borrow_mut().push(call);
            match &self.fail_with {
                Some(message) => Err(ManageError::Message(message.clone()).into()),
                None => Ok(self.version),
            }
        }
    }

    impl MigrationEngine for RecordingEngine {
        async fn db_version(&self) -> Result<Version> {
            self.answer(Call::DbVersion)
        }

        async fn upgrade(&self, version: Option<&str>) -> Result<Version> {
            self.answer(Call::Upgrade(version.map(str::to_string)))
        }

        async fn downgrade(&self, version: &str) -> Result<Version> {
            self.answer(Call::Downgrade(version.to_string()))
        }

        async fn version_control(&self, version: Option<&str>) -> Result<Version> {
            self.answer(Call::VersionControl(version.map(str::to_string)))
        }

        async fn db_sync(
            &self,
            version: Option<&str>,
            current_version: Option<&str>,
        ) -> Result<Version> {
            self.answer(Call::DbSync(
                version.map(str::to_string),
                current_version.map(str::to_string),
            ))
        }
    }
}
