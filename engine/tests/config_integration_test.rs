//! Integration tests for configuration management
//!
//! These tests load real files from disk through [`Config::load`].

use jellyship_engine::config::{load_env_file, Config};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_load_full_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("jellyship.toml");
    fs::write(
        &path,
        r#"
[core]
log_level = "debug"
project_root = "/srv/tunnelfin"

[project]
plugin_name = "TunnelFin"
product = "tunnelfin"
plugin_guid = "c8a3e1f2-0000-4000-8000-000000000001"
target_abi = "10.11.0.0"

[build]
command = ["dotnet", "publish", "-p:Version={version}"]
artifact_dir = "dist"
version_files = ["src/TunnelFin/TunnelFin.csproj"]

[release]
owner = "example"
repo = "tunnelfin"
publish_branch = "release"
repository_name = "TunnelFin Repo"

[host]
client = "TunnelFin Build"
request_timeout_secs = 30

[timeouts]
poll_interval_secs = 1
cdn_secs = 300
"#,
    )
    .unwrap();

    let config = Config::load(Some(&path)).unwrap();

    assert_eq!(config.core.log_level, "debug");
    assert_eq!(config.core.project_root, PathBuf::from("/srv/tunnelfin"));
    assert_eq!(
        config.manifest_path(),
        PathBuf::from("/srv/tunnelfin/manifest.json")
    );
    assert_eq!(config.build.command[0], "dotnet");
    assert_eq!(config.repository_name(), "TunnelFin Repo");
    assert_eq!(
        config.release.manifest_url().unwrap(),
        "https://raw.githubusercontent.com/example/tunnelfin/release/manifest.json"
    );
    assert_eq!(config.poll_interval(), Duration::from_secs(1));

    let timeouts = config.deploy_timeouts();
    assert_eq!(timeouts.cdn, Duration::from_secs(300));
    assert_eq!(timeouts.healthy, Duration::from_secs(90));
}

#[test]
fn test_password_in_file_is_ignored() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("jellyship.toml");
    fs::write(
        &path,
        "[host]\nurl = \"http://media:8096\"\nusername = \"admin\"\npassword = \"leaked\"\n",
    )
    .unwrap();

    let config = Config::read_file(&path).unwrap();
    assert_eq!(config.host.url.as_deref(), Some("http://media:8096"));
    assert!(config.host.password.is_none());
}

#[test]
fn test_missing_explicit_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let result = Config::load(Some(&dir.path().join("absent.toml")));
    assert!(result.is_err());
}

#[test]
fn test_invalid_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("jellyship.toml");
    fs::write(&path, "[timeouts]\npoll_interval_secs = 0\n").unwrap();

    let err = Config::load(Some(&path)).unwrap_err();
    assert!(err.to_string().contains("poll_interval_secs"));
}

#[test]
fn test_env_file_is_read_from_project_root() {
    let dir = TempDir::new().unwrap();
    assert!(!load_env_file(dir.path()).unwrap());

    fs::write(
        dir.path().join(".env"),
        "JELLYSHIP_TEST_ENV_FILE_MARKER=from-project-root\n",
    )
    .unwrap();
    assert!(load_env_file(dir.path()).unwrap());
    assert_eq!(
        std::env::var("JELLYSHIP_TEST_ENV_FILE_MARKER").unwrap(),
        "from-project-root"
    );
}

#[test]
fn test_oversized_timeout_in_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("jellyship.toml");
    fs::write(&path, "[timeouts]\ncdn_secs = 9223372036854775807\n").unwrap();

    let err = Config::load(Some(&path)).unwrap_err();
    assert!(err.to_string().contains("timeouts.cdn_secs"));
}
