// ABOUTME: Migration repository - numbered SQL scripts on disk
// ABOUTME: Discovers upgrade/downgrade scripts and plans the steps between two versions

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ManageError;
use crate::migration::Version;

const UPGRADE_SUFFIX: &str = ".up.sql";
const DOWNGRADE_SUFFIX: &str = ".down.sql";

/// One numbered migration, e.g. `003_add_image_tags.up.sql` and its
/// optional `003_add_image_tags.down.sql`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MigrationScript {
    version: Version,
    name: String,
    upgrade: PathBuf,
    downgrade: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upgrade,
    Downgrade,
}

/// A single script to run and the version the database is at afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub direction: Direction,
    pub script: PathBuf,
    pub name: String,
    pub resulting_version: Version,
}

#[derive(Debug, Clone)]
pub struct Repository {
    path: PathBuf,
    scripts: Vec<MigrationScript>,
}

#[derive(Default)]
struct ScriptFiles {
    name: Option<String>,
    upgrade: Option<PathBuf>,
    downgrade: Option<PathBuf>,
}

impl Repository {
    /// Scan `path` for migration scripts.
    ///
    /// Versions must run from 1 without gaps. Files that do not look like
    /// `NNN_name.up.sql` or `NNN_name.down.sql` are ignored.
    pub fn load(path: &Path) -> Result<Self, ManageError> {
        let entries = fs::read_dir(path).map_err(|e| {
            ManageError::Repository(format!("cannot read {}: {}", path.display(), e))
        })?;

        let mut found: BTreeMap<u32, ScriptFiles> = BTreeMap::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                ManageError::Repository(format!("cannot read {}: {}", path.display(), e))
            })?;
            let file_path = entry.path();
            if !file_path.is_file() {
                continue;
            }
            let Some(file_name) = file_path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some((level, name, direction)) = parse_script_name(file_name) else {
                tracing::debug!("Ignoring {} in migration repository", file_name);
                continue;
            };

            let files = found.entry(level).or_default();
            if let Some(existing) = &files.name {
                if existing != &name {
                    return Err(ManageError::Repository(format!(
                        "version {} has scripts with different names ({} and {})",
                        level, existing, name
                    )));
                }
            }
            let slot = match direction {
                Direction::Upgrade => &mut files.upgrade,
                Direction::Downgrade => &mut files.downgrade,
            };
            if slot.is_some() {
                return Err(ManageError::Repository(format!(
                    "duplicate script for version {}: {}",
                    level, file_name
                )));
            }
            *slot = Some(file_path);
            files.name = Some(name);
        }

        let mut scripts = Vec::with_capacity(found.len());
        for (expected, (level, files)) in (1u32..).zip(found) {
            if level != expected {
                return Err(ManageError::Repository(format!(
                    "missing migration script for version {}",
                    expected
                )));
            }
            let upgrade = files.upgrade.ok_or_else(|| {
                ManageError::Repository(format!("version {} has no upgrade script", level))
            })?;
            scripts.push(MigrationScript {
                version: Version::new(level),
                name: files.name.unwrap_or_default(),
                upgrade,
                downgrade: files.downgrade,
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            scripts,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Highest version a database can be upgraded to.
    pub fn latest(&self) -> Version {
        self.scripts
            .last()
            .map(|s| s.version)
            .unwrap_or(Version::INITIAL)
    }

    /// Reject versions the repository does not know about.
    pub fn check(&self, version: Version) -> Result<Version, ManageError> {
        if version > self.latest() {
            return Err(ManageError::VersionOutOfRange {
                requested: version,
                latest: self.latest(),
            });
        }
        Ok(version)
    }

    /// Steps that move a database from `from` to `to`, in execution order.
    pub fn plan(&self, from: Version, to: Version) -> Result<Vec<Step>, ManageError> {
        self.check(from)?;
        self.check(to)?;

        if to >= from {
            return Ok(self
                .scripts
                .iter()
                .filter(|s| s.version > from && s.version <= to)
                .map(|s| Step {
                    direction: Direction::Upgrade,
                    script: s.upgrade.clone(),
                    name: s.name.clone(),
                    resulting_version: s.version,
                })
                .collect());
        }

        self.scripts
            .iter()
            .rev()
            .filter(|s| s.version <= from && s.version > to)
            .map(|s| {
                let script = s.downgrade.clone().ok_or_else(|| {
                    ManageError::Repository(format!(
                        "version {} ({}) has no downgrade script",
                        s.version, s.name
                    ))
                })?;
                Ok(Step {
                    direction: Direction::Downgrade,
                    script,
                    name: s.name.clone(),
                    resulting_version: Version::new(s.version.level() - 1),
                })
            })
            .collect()
    }
}

/// Split `003_add_tags.up.sql` into (3, "add_tags", Upgrade).
fn parse_script_name(file_name: &str) -> Option<(u32, String, Direction)> {
    let (stem, direction) = if let Some(stem) = file_name.strip_suffix(UPGRADE_SUFFIX) {
        (stem, Direction::Upgrade)
    } else if let Some(stem) = file_name.strip_suffix(DOWNGRADE_SUFFIX) {
        (stem, Direction::Downgrade)
    } else {
        return None;
    };

    let (number, name) = match stem.split_once('_') {
        Some((number, name)) => (number, name),
        None => (stem, ""),
    };
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let level = number.parse::<u32>().ok()?;
    if level == 0 {
        return None;
    }
    Some((level, name.to_string(), direction))
}
