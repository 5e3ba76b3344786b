//! Unit tests for configuration resolution and graceful degradation
//!
//! Uses serial_test to prevent ENV variable race conditions: tests that
//! manipulate VIZIER_ROOT_FOLDER or VIZIER_CONFIG are marked #[serial].

use serde::Deserialize;
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use vizier_common::config::{
    database_path, default_root_folder, load_toml_config, locate_config_file,
    resolve_root_folder, CONFIG_FILE_ENV, ROOT_FOLDER_ENV,
};

#[derive(Debug, Default, Deserialize, PartialEq)]
struct SampleConfig {
    root_folder: Option<PathBuf>,
    #[serde(default)]
    name: String,
}

#[test]
#[serial]
fn test_root_folder_cli_argument_wins() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/vizier-env-root");

    let resolved = resolve_root_folder(
        Some(Path::new("/tmp/vizier-cli-root")),
        ROOT_FOLDER_ENV,
        Some(Path::new("/tmp/vizier-toml-root")),
    );
    assert_eq!(resolved, PathBuf::from("/tmp/vizier-cli-root"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_root_folder_env_beats_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/vizier-env-root");

    let resolved = resolve_root_folder(None, ROOT_FOLDER_ENV, Some(Path::new("/tmp/vizier-toml-root")));
    assert_eq!(resolved, PathBuf::from("/tmp/vizier-env-root"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_root_folder_falls_back_to_toml_then_default() {
    env::remove_var(ROOT_FOLDER_ENV);

    let resolved = resolve_root_folder(None, ROOT_FOLDER_ENV, Some(Path::new("/tmp/vizier-toml-root")));
    assert_eq!(resolved, PathBuf::from("/tmp/vizier-toml-root"));

    let resolved = resolve_root_folder(None, ROOT_FOLDER_ENV, None);
    assert_eq!(resolved, default_root_folder());
    assert!(!resolved.as_os_str().is_empty());
}

#[test]
#[serial]
fn test_locate_config_prefers_explicit_path() {
    env::set_var(CONFIG_FILE_ENV, "/tmp/from-env.toml");

    let located = locate_config_file(Some(Path::new("/tmp/from-cli.toml")), CONFIG_FILE_ENV);
    assert_eq!(located, Some(PathBuf::from("/tmp/from-cli.toml")));

    let located = locate_config_file(None, CONFIG_FILE_ENV);
    assert_eq!(located, Some(PathBuf::from("/tmp/from-env.toml")));

    env::remove_var(CONFIG_FILE_ENV);
}

#[test]
fn test_missing_config_file_yields_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope.toml");

    let config: SampleConfig = load_toml_config(Some(&missing)).unwrap();
    assert_eq!(config, SampleConfig::default());

    let config: SampleConfig = load_toml_config(None).unwrap();
    assert_eq!(config, SampleConfig::default());
}

#[test]
fn test_config_file_is_parsed() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("vizier.toml");
    std::fs::write(&path, "root_folder = \"/srv/vizier\"\nname = \"gallery\"\n").unwrap();

    let config: SampleConfig = load_toml_config(Some(&path)).unwrap();
    assert_eq!(config.root_folder, Some(PathBuf::from("/srv/vizier")));
    assert_eq!(config.name, "gallery");
}

#[test]
fn test_malformed_config_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("vizier.toml");
    std::fs::write(&path, "root_folder = [unterminated").unwrap();

    let result: vizier_common::Result<SampleConfig> = load_toml_config(Some(&path));
    let err = result.unwrap_err();
    assert!(matches!(err, vizier_common::Error::Config(_)));
}

#[test]
fn test_database_path_lives_in_root_folder() {
    let root = PathBuf::from("/srv/vizier");
    assert_eq!(database_path(&root), PathBuf::from("/srv/vizier/vizier.db"));
}
