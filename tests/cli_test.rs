// ABOUTME: End-to-end tests for the glance-manage binary
// ABOUTME: Covers argument parsing, configuration errors, and domain error reporting

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::tempdir;

/// Run the binary with an isolated HOME so no real config files are discovered.
fn glance_manage(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_glance-manage"))
        .args(args)
        .env("HOME", home)
        .env_remove("GLANCE_SQL_CONNECTION")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute command")
}

fn write_config(dir: &Path, name: &str, contents: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path.display().to_string()
}

#[test]
fn test_downgrade_requires_version() {
    let home = tempdir().unwrap();
    let output = glance_manage(home.path(), &["downgrade"]);

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("<VERSION>"), "stderr: {}", stderr);
    assert!(!stderr.contains("ERROR:"));
}

#[test]
fn test_help_lists_commands() {
    let home = tempdir().unwrap();
    let output = glance_manage(home.path(), &["--help"]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    for command in ["db_version", "upgrade", "downgrade", "version_control", "db_sync"] {
        assert!(stdout.contains(command), "missing {} in help: {}", command, stdout);
    }
}

#[test]
fn test_unparseable_config_file() {
    let home = tempdir().unwrap();
    let config = write_config(home.path(), "glance-registry.toml", "[database\nconnection =");

    let output = glance_manage(home.path(), &["--config-file", &config, "db_version"]);

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(
        stderr.starts_with("ERROR: failed to parse config file"),
        "stderr: {}",
        stderr
    );
    assert!(output.stdout.is_empty());
}

#[test]
fn test_missing_config_file() {
    let home = tempdir().unwrap();
    let missing = home.path().join("nope.toml").display().to_string();

    let output = glance_manage(home.path(), &["--config-file", &missing, "db_version"]);

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.starts_with("ERROR: failed to read config file"));
}

#[test]
fn test_no_connection_configured() {
    let home = tempdir().unwrap();
    let output = glance_manage(home.path(), &["db_version"]);

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.starts_with("ERROR: missing required option 'database.connection'"));
}

#[test]
fn test_discovers_config_in_home() {
    let home = tempdir().unwrap();
    let glance_dir = home.path().join(".glance");
    fs::create_dir_all(&glance_dir).unwrap();
    write_config(
        &glance_dir,
        "glance-registry.toml",
        "[database]\nconnection = \"postgresql://glance@127.0.0.1:1/glance\"\n",
    );

    // A malformed version is rejected by the engine before it connects, which
    // shows the discovered connection was accepted.
    let output = glance_manage(home.path(), &["upgrade", "latest"]);

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert_eq!(
        stderr.trim_end(),
        "ERROR: invalid version 'latest': expected a non-negative integer"
    );
}

#[test]
fn test_unreachable_database_is_reported() {
    let home = tempdir().unwrap();
    let output = glance_manage(
        home.path(),
        &[
            "--sql-connection",
            "postgresql://glance@127.0.0.1:1/glance?connect_timeout=5",
            "db_version",
        ],
    );

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(
        stderr.starts_with("ERROR: unable to connect to database:"),
        "stderr: {}",
        stderr
    );
    assert!(output.stdout.is_empty());
}
