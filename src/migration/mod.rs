// ABOUTME: Migration engine interface consumed by the management commands
// ABOUTME: Defines schema versions, the engine trait, and engine-specific CLI options

pub mod postgres;
pub mod repository;

use std::fmt;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::config::ConfigOverrides;
use crate::error::ManageError;

pub use postgres::PostgresEngine;
pub use repository::{Direction, Repository, Step};

/// A schema level tracked by the migration engine.
///
/// Version 0 is an empty schema placed under version control; version N is
/// the state after the Nth migration script has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version(u32);

impl Version {
    pub const INITIAL: Version = Version(0);

    pub fn new(level: u32) -> Self {
        Self(level)
    }

    pub fn level(self) -> u32 {
        self.0
    }

    /// Parse a version supplied on the command line.
    ///
    /// The CLI passes versions through untouched, so this is the only place
    /// free-form input gets validated.
    pub fn parse(input: &str) -> Result<Self, ManageError> {
        input
            .trim()
            .parse::<u32>()
            .map(Version)
            .map_err(|_| ManageError::InvalidVersion(input.to_string()))
    }

    pub(crate) fn parse_optional(input: Option<&str>) -> Result<Option<Self>, ManageError> {
        input.map(Version::parse).transpose()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Operations the management commands dispatch to.
///
/// Version arguments are the raw strings from the command line; implementations
/// decide what a valid version looks like.
#[allow(async_fn_in_trait)]
pub trait MigrationEngine {
    /// Current schema version of the database.
    async fn db_version(&self) -> Result<Version>;

    /// Upgrade to `version`, or to the latest available version when `None`.
    async fn upgrade(&self, version: Option<&str>) -> Result<Version>;

    /// Downgrade to `version`.
    async fn downgrade(&self, version: &str) -> Result<Version>;

    /// Place the database under version control at `version` (default 0).
    async fn version_control(&self, version: Option<&str>) -> Result<Version>;

    /// Place the database under version control if needed, then move it to
    /// `version` (default latest). `current_version` overrides the stored
    /// version when deciding the direction.
    async fn db_sync(
        &self,
        version: Option<&str>,
        current_version: Option<&str>,
    ) -> Result<Version>;
}

/// Command-line options owned by the migration engine.
#[derive(Args, Debug, Clone, Default)]
pub struct DatabaseArgs {
    /// PostgreSQL connection URL for the registry database
    #[arg(long = "sql-connection", env = "GLANCE_SQL_CONNECTION", global = true)]
    pub sql_connection: Option<String>,

    /// Directory holding the numbered migration scripts
    #[arg(long = "migrate-repo", value_name = "DIR", global = true)]
    pub migrate_repo: Option<PathBuf>,

    /// Allow self-signed TLS certificates (insecure - use only for testing)
    #[arg(long = "allow-self-signed-certs", global = true, default_value_t = false)]
    pub allow_self_signed_certs: bool,
}

impl DatabaseArgs {
    /// Copy the options that were actually given into the override set.
    pub fn apply_to(&self, overrides: &mut ConfigOverrides) {
        if let Some(connection) = &self.sql_connection {
            overrides.set("database.connection", connection.as_str());
        }
        if let Some(repo) = &self.migrate_repo {
            overrides.set("database.migrate_repo", repo.display().to_string());
        }
        if self.allow_self_signed_certs {
            overrides.set("database.allow_self_signed_certs", true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_integers() {
        assert_eq!(Version::parse("5").unwrap(), Version::new(5));
        assert_eq!(Version::parse(" 12 ").unwrap(), Version::new(12));
        assert_eq!(Version::parse("0").unwrap(), Version::INITIAL);
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        for input in ["abc", "-1", "1.5", ""] {
            let err = Version::parse(input).unwrap_err();
            assert!(
                matches!(&err, ManageError::InvalidVersion(v) if v == input),
                "unexpected error for {input:?}: {err}"
            );
        }
    }

    #[test]
    fn test_display_is_bare_number() {
        assert_eq!(Version::new(42).to_string(), "42");
    }

    #[test]
    fn test_database_args_only_set_given_options() {
        let args = DatabaseArgs {
            sql_connection: Some("postgresql://localhost/glance".to_string()),
            migrate_repo: None,
            allow_self_signed_certs: false,
        };
        let mut overrides = ConfigOverrides::default();
        args.apply_to(&mut overrides);

        let table = overrides.into_table();
        let database = table["database"].as_table().unwrap();
        assert_eq!(
            database["connection"].as_str(),
            Some("postgresql://localhost/glance")
        );
        assert!(!database.contains_key("migrate_repo"));
        assert!(!database.contains_key("allow_self_signed_certs"));
    }
}
