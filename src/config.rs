// ABOUTME: Configuration file discovery and loading for glance-manage
// ABOUTME: Merges TOML files and command-line overrides into one immutable Config

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use toml::{Table, Value};

use crate::utils::validate_connection_string;

/// Project name used for config file discovery and the default repository id.
pub const PROJECT: &str = "glance";

const CONFIG_EXTENSION: &str = "toml";
const DEFAULT_MIGRATE_REPO: &str = "/usr/share/glance/migrate_repo";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{0}")]
    Invalid(String),

    #[error("missing required option '{0}' (set it in a config file or on the command line)")]
    MissingOption(&'static str),
}

/// Settings for the whole run. Built once at startup and never mutated.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    database: RawDatabaseConfig,
    #[serde(skip)]
    pub sources: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawDatabaseConfig {
    connection: Option<String>,
    migrate_repo: Option<PathBuf>,
    repository_id: Option<String>,
    #[serde(default)]
    allow_self_signed_certs: bool,
}

/// Database section after defaults have been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub connection: String,
    pub migrate_repo: PathBuf,
    pub repository_id: String,
    pub allow_self_signed_certs: bool,
}

impl Config {
    /// Load `files` in order, with `overrides` taking precedence over all of them.
    ///
    /// When two sources set the same key the one loaded first wins, so earlier
    /// files override later ones.
    pub fn load(files: &[PathBuf], overrides: ConfigOverrides) -> Result<Config, ConfigError> {
        let mut merged = overrides.into_table();
        let mut sources = Vec::with_capacity(files.len());

        for path in files {
            let table = read_table(path)?;
            merge_missing(&mut merged, table);
            sources.push(path.clone());
        }

        let mut config: Config = Value::Table(merged).try_into().map_err(|e: toml::de::Error| {
            ConfigError::Invalid(format!("invalid configuration: {}", e.to_string().trim()))
        })?;
        config.sources = sources;

        // Fail here rather than at the first command that needs a connection.
        config.database()?;
        Ok(config)
    }

    pub fn database(&self) -> Result<DatabaseConfig, ConfigError> {
        let connection = self
            .database
            .connection
            .clone()
            .filter(|c| !c.trim().is_empty())
            .ok_or(ConfigError::MissingOption("database.connection"))?;
        validate_connection_string(&connection)
            .map_err(|e| ConfigError::Invalid(format!("database.connection: {}", e)))?;

        Ok(DatabaseConfig {
            connection,
            migrate_repo: self
                .database
                .migrate_repo
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MIGRATE_REPO)),
            repository_id: self
                .database
                .repository_id
                .clone()
                .unwrap_or_else(|| PROJECT.to_string()),
            allow_self_signed_certs: self.database.allow_self_signed_certs,
        })
    }
}

fn read_table(path: &Path) -> Result<Table, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    contents.parse::<Table>().map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Copy keys from `src` into `dst` that `dst` does not already define.
/// Nested tables are merged key by key.
fn merge_missing(dst: &mut Table, src: Table) {
    for (key, value) in src {
        match (dst.get_mut(&key), value) {
            (None, value) => {
                dst.insert(key, value);
            }
            (Some(Value::Table(existing)), Value::Table(incoming)) => {
                merge_missing(existing, incoming);
            }
            (Some(_), _) => {}
        }
    }
}

/// Later values win; a scalar in the way of a nested key is replaced.
fn merge_overwriting(dst: &mut Table, src: Table) {
    for (key, value) in src {
        match value {
            Value::Table(incoming) => match dst.get_mut(&key) {
                Some(Value::Table(existing)) => merge_overwriting(existing, incoming),
                _ => {
                    dst.insert(key, Value::Table(incoming));
                }
            },
            value => {
                dst.insert(key, value);
            }
        }
    }
}

/// Command-line values that take precedence over every config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    table: Table,
}

impl ConfigOverrides {
    /// Set a dotted key such as `database.connection`.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        let mut parts = key.rsplit('.');
        let leaf = parts.next().unwrap_or(key);

        let mut nested = Table::new();
        nested.insert(leaf.to_string(), value.into());
        for part in parts {
            let mut outer = Table::new();
            outer.insert(part.to_string(), Value::Table(nested));
            nested = outer;
        }
        merge_overwriting(&mut self.table, nested);
    }

    pub fn into_table(self) -> Table {
        self.table
    }
}

/// Directories searched for config files, most specific first.
pub fn config_dirs(project: &str) -> Vec<PathBuf> {
    let mut dirs = Vec::with_capacity(4);
    if let Some(home) = dirs::home_dir() {
        dirs.push(home.join(format!(".{}", project)));
        dirs.push(home);
    }
    dirs.push(Path::new("/etc").join(project));
    dirs.push(PathBuf::from("/etc"));
    dirs
}

/// Find `<project>.toml` and `<prog>.toml`, taking the first existing copy of
/// each from `dirs`.
pub fn find_config_files(project: &str, prog: &str, dirs: &[PathBuf]) -> Vec<PathBuf> {
    [project, prog]
        .iter()
        .filter_map(|name| search_dirs(dirs, name))
        .collect()
}

fn search_dirs(dirs: &[PathBuf], basename: &str) -> Option<PathBuf> {
    let file_name = format!("{}.{}", basename, CONFIG_EXTENSION);
    dirs.iter()
        .map(|dir| dir.join(&file_name))
        .find(|candidate| candidate.is_file())
}

/// Config files for the registry profile followed by those for the api profile.
///
/// The database connection lives in the registry configuration, so its files
/// are listed first.
pub fn default_config_files(project: &str) -> Vec<PathBuf> {
    discover_in(project, &config_dirs(project))
}

fn discover_in(project: &str, dirs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = find_config_files(project, &format!("{}-registry", project), dirs);
    files.extend(find_config_files(project, &format!("{}-api", project), dirs));
    files
}

/// Every `*.toml` file directly inside `dir`, sorted by name.
pub fn files_in_dir(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let entries = fs::read_dir(dir).map_err(|source| ConfigError::Read {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|source| ConfigError::Read {
                path: dir.to_path_buf(),
                source,
            })?
            .path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == CONFIG_EXTENSION) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
