// ABOUTME: Domain error kind raised by migration commands
// ABOUTME: Errors of this type are reported to the operator as "ERROR: <message>"

use thiserror::Error;

use crate::migration::Version;

/// Anticipated failures of a management command.
///
/// Anything that surfaces as a `ManageError` (directly or wrapped in an
/// `anyhow::Error` chain) is reported with a short message and a failure exit
/// status. Every other error is left to the default `main` error reporting.
#[derive(Debug, Error)]
pub enum ManageError {
    #[error("database is not under migration control")]
    NotVersionControlled,

    #[error("database is already under migration control")]
    AlreadyVersionControlled,

    #[error("invalid version '{0}': expected a non-negative integer")]
    InvalidVersion(String),

    #[error("version {requested} does not exist (latest available version is {latest})")]
    VersionOutOfRange { requested: Version, latest: Version },

    #[error("cannot {operation} from version {current} to version {target}")]
    WrongDirection {
        operation: &'static str,
        current: Version,
        target: Version,
    },

    #[error("unable to connect to database: {0}")]
    ConnectionFailed(String),

    #[error("migration repository error: {0}")]
    Repository(String),

    #[error("{0}")]
    Message(String),
}
