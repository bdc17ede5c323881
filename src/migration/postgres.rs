// ABOUTME: PostgreSQL-backed migration engine
// ABOUTME: Tracks the schema version in migrate_version and applies repository scripts

use anyhow::{anyhow, Context, Result};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use tokio_postgres::Client;

use crate::config::DatabaseConfig;
use crate::error::ManageError;
use crate::migration::repository::{Direction, Repository, Step};
use crate::migration::{MigrationEngine, Version};
use crate::utils::redact_password;

const CREATE_VERSION_TABLE: &str = "CREATE TABLE IF NOT EXISTS migrate_version (
    repository_id VARCHAR(250) PRIMARY KEY,
    repository_path TEXT,
    version INTEGER
)";

/// Migration engine for a PostgreSQL registry database.
///
/// A connection is opened per operation; nothing is held between calls.
pub struct PostgresEngine {
    settings: DatabaseConfig,
}

impl PostgresEngine {
    pub fn new(settings: DatabaseConfig) -> Self {
        Self { settings }
    }

    async fn connect(&self) -> Result<Client> {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(self.settings.allow_self_signed_certs)
            .build()
            .context("Failed to build TLS connector")?;
        let tls = MakeTlsConnector::new(connector);

        tracing::debug!(
            "Connecting to {}",
            redact_password(&self.settings.connection)
        );

        let (client, connection) = tokio_postgres::connect(&self.settings.connection, tls)
            .await
            .map_err(|e| ManageError::ConnectionFailed(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("Database connection error: {}", e);
            }
        });

        Ok(client)
    }

    fn repository(&self) -> Result<Repository> {
        Ok(Repository::load(&self.settings.migrate_repo)?)
    }

    async fn stored_version(&self, client: &Client) -> Result<Option<Version>> {
        let exists: bool = client
            .query_one("SELECT to_regclass('migrate_version') IS NOT NULL", &[])
            .await
            .context("Failed to look up migrate_version table")?
            .get(0);
        if !exists {
            return Ok(None);
        }

        let row = client
            .query_opt(
                "SELECT version FROM migrate_version WHERE repository_id = $1",
                &[&self.settings.repository_id],
            )
            .await
            .context("Failed to read schema version")?;

        row.map(|row| {
            let level: i32 = row.get(0);
            u32::try_from(level).map(Version::new).map_err(|_| {
                anyhow!(ManageError::Message(format!(
                    "stored schema version {} is invalid",
                    level
                )))
            })
        })
        .transpose()
    }

    async fn require_version(&self, client: &Client) -> Result<Version> {
        self.stored_version(client)
            .await?
            .ok_or_else(|| ManageError::NotVersionControlled.into())
    }

    async fn place_under_control(
        &self,
        client: &Client,
        repo: &Repository,
        version: Version,
    ) -> Result<Version> {
        let version = repo.check(version)?;

        client
            .batch_execute(CREATE_VERSION_TABLE)
            .await
            .context("Failed to create migrate_version table")?;

        let repository_path = repo.path().display().to_string();
        let inserted = client
            .execute(
                "INSERT INTO migrate_version (repository_id, repository_path, version)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (repository_id) DO NOTHING",
                &[
                    &self.settings.repository_id,
                    &repository_path,
                    &sql_level(version)?,
                ],
            )
            .await
            .context("Failed to record schema version")?;

        if inserted == 0 {
            return Err(ManageError::AlreadyVersionControlled.into());
        }

        tracing::info!(
            "Placed database under migration control at version {}",
            version
        );
        Ok(version)
    }

    async fn upgrade_to(
        &self,
        client: &mut Client,
        repo: &Repository,
        target: Option<Version>,
    ) -> Result<Version> {
        let current = self.require_version(client).await?;
        let goal = repo.check(target.unwrap_or_else(|| repo.latest()))?;

        if goal < current {
            return Err(ManageError::WrongDirection {
                operation: "upgrade",
                current,
                target: goal,
            }
            .into());
        }

        match target {
            Some(v) => tracing::info!("Upgrading database to version {}", v),
            None => tracing::info!("Upgrading database to version latest ({})", goal),
        }

        let steps = repo.plan(current, goal)?;
        self.apply(client, &steps).await?;
        Ok(goal)
    }

    async fn downgrade_to(
        &self,
        client: &mut Client,
        repo: &Repository,
        target: Version,
    ) -> Result<Version> {
        let current = self.require_version(client).await?;
        let goal = repo.check(target)?;

        if goal > current {
            return Err(ManageError::WrongDirection {
                operation: "downgrade",
                current,
                target: goal,
            }
            .into());
        }

        tracing::info!("Downgrading database to version {}", goal);

        let steps = repo.plan(current, goal)?;
        self.apply(client, &steps).await?;
        Ok(goal)
    }

    /// Run each step in its own transaction together with the version update,
    /// so a failing script leaves the marker at the last completed step.
    async fn apply(&self, client: &mut Client, steps: &[Step]) -> Result<()> {
        if steps.is_empty() {
            tracing::info!("Database is already at the requested version");
            return Ok(());
        }

        for step in steps {
            let sql = tokio::fs::read_to_string(&step.script)
                .await
                .with_context(|| {
                    format!("Failed to read migration script {}", step.script.display())
                })?;

            let verb = match step.direction {
                Direction::Upgrade => "Applying",
                Direction::Downgrade => "Reverting",
            };
            tracing::info!(
                "{} {} ({}) -> version {}",
                verb,
                step.name,
                step.script.display(),
                step.resulting_version
            );

            let tx = client
                .transaction()
                .await
                .context("Failed to start migration transaction")?;
            tx.batch_execute(&sql)
                .await
                .with_context(|| format!("Migration script {} failed", step.script.display()))?;
            tx.execute(
                "UPDATE migrate_version SET version = $1 WHERE repository_id = $2",
                &[&sql_level(step.resulting_version)?, &self.settings.repository_id],
            )
            .await
            .context("Failed to update schema version")?;
            tx.commit()
                .await
                .with_context(|| format!("Failed to commit {}", step.script.display()))?;
        }

        Ok(())
    }
}

/// What `db_sync` does once the database is under migration control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncAction {
    Upgrade(Option<Version>),
    Downgrade(Version),
    Nothing(Version),
}

/// Decide the sync direction. A caller-supplied current version takes
/// precedence over the stored one.
fn sync_action(target: Option<Version>, hint: Option<Version>, stored: Version) -> SyncAction {
    let current = hint.unwrap_or(stored);
    match target {
        Some(t) if t < current => SyncAction::Downgrade(t),
        Some(t) if t == current => SyncAction::Nothing(current),
        _ => SyncAction::Upgrade(target),
    }
}

fn sql_level(version: Version) -> Result<i32> {
    i32::try_from(version.level())
        .map_err(|_| ManageError::InvalidVersion(version.to_string()).into())
}

impl MigrationEngine for PostgresEngine {
    async fn db_version(&self) -> Result<Version> {
        let client = self.connect().await?;
        self.require_version(&client).await
    }

    async fn upgrade(&self, version: Option<&str>) -> Result<Version> {
        let target = Version::parse_optional(version)?;
        let mut client = self.connect().await?;
        let repo = self.repository()?;
        self.upgrade_to(&mut client, &repo, target).await
    }

    async fn downgrade(&self, version: &str) -> Result<Version> {
        let target = Version::parse(version)?;
        let mut client = self.connect().await?;
        let repo = self.repository()?;
        self.downgrade_to(&mut client, &repo, target).await
    }

    async fn version_control(&self, version: Option<&str>) -> Result<Version> {
        let version = Version::parse_optional(version)?.unwrap_or(Version::INITIAL);
        let client = self.connect().await?;
        let repo = self.repository()?;
        self.place_under_control(&client, &repo, version).await
    }

    async fn db_sync(
        &self,
        version: Option<&str>,
        current_version: Option<&str>,
    ) -> Result<Version> {
        let target = Version::parse_optional(version)?;
        let hint = Version::parse_optional(current_version)?;
        let mut client = self.connect().await?;
        let repo = self.repository()?;

        match self
            .place_under_control(&client, &repo, hint.unwrap_or(Version::INITIAL))
            .await
        {
            Ok(_) => {}
            Err(e) if matches!(
                e.downcast_ref::<ManageError>(),
                Some(ManageError::AlreadyVersionControlled)
            ) =>
            {
                tracing::debug!("Database already under migration control");
            }
            Err(e) => return Err(e),
        }

        let stored = self.require_version(&client).await?;
        match sync_action(target, hint, stored) {
            SyncAction::Downgrade(t) => self.downgrade_to(&mut client, &repo, t).await,
            SyncAction::Upgrade(t) => self.upgrade_to(&mut client, &repo, t).await,
            SyncAction::Nothing(current) => Ok(current),
        }
    }
}
