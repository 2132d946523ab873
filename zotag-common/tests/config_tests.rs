//! Unit tests for configuration loading and root folder resolution
//!
//! Tests that manipulate ZOTAG_ROOT_FOLDER or ZOTAG_ROOT are marked with
//! #[serial] so they run sequentially.

use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;
use zotag_common::config::{
    load_toml_config, load_toml_config_or_default, write_toml_config, CompiledDefaults,
    LoggingConfig, RootFolderInitializer, RootFolderResolver, TomlConfig, ZoteroConfig,
};

fn clear_root_env() {
    env::remove_var("ZOTAG_ROOT_FOLDER");
    env::remove_var("ZOTAG_ROOT");
}

#[test]
fn test_compiled_defaults_for_current_platform() {
    let defaults = CompiledDefaults::for_current_platform();

    assert!(!defaults.root_folder.as_os_str().is_empty());
    assert_eq!(defaults.log_level, "info");
    assert!(defaults.root_folder.to_string_lossy().contains("zotag"));
}

#[test]
#[serial]
fn test_resolver_cli_arg_wins_over_env() {
    env::set_var("ZOTAG_ROOT_FOLDER", "/tmp/zotag-env-folder");

    let resolver = RootFolderResolver::new("test-module")
        .with_cli_arg(Some(PathBuf::from("/tmp/zotag-cli-folder")));
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/zotag-cli-folder"));

    clear_root_env();
}

#[test]
#[serial]
fn test_resolver_env_var_root_folder() {
    clear_root_env();
    env::set_var("ZOTAG_ROOT_FOLDER", "/tmp/zotag-test-env-folder");

    let resolver = RootFolderResolver::new("test-module").with_toml_config(TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/zotag-toml-folder")),
        ..Default::default()
    });
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/zotag-test-env-folder"));

    clear_root_env();
}

#[test]
#[serial]
fn test_resolver_legacy_env_var() {
    clear_root_env();
    env::set_var("ZOTAG_ROOT", "/tmp/zotag-test-root");

    let resolver = RootFolderResolver::new("test-module").with_toml_config(TomlConfig::default());
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/zotag-test-root"));

    clear_root_env();
}

#[test]
#[serial]
fn test_resolver_toml_root_folder() {
    clear_root_env();

    let resolver = RootFolderResolver::new("test-module").with_toml_config(TomlConfig {
        root_folder: Some(PathBuf::from("/srv/zotag")),
        ..Default::default()
    });
    assert_eq!(resolver.resolve(), PathBuf::from("/srv/zotag"));
}

#[test]
#[serial]
fn test_resolver_with_no_overrides_uses_default() {
    clear_root_env();

    let resolver = RootFolderResolver::new("test-module").with_toml_config(TomlConfig::default());
    let defaults = CompiledDefaults::for_current_platform();
    assert_eq!(resolver.resolve(), defaults.root_folder);
}

#[test]
fn test_initializer_creates_directory_and_paths() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("nested").join("root");

    let initializer = RootFolderInitializer::new(root.clone());
    initializer.ensure_directory_exists().unwrap();

    assert!(root.is_dir());
    assert_eq!(initializer.database_path(), root.join("zotag.db"));
    assert_eq!(initializer.image_dir(), root.join("images"));

    // Second call is a no-op
    initializer.ensure_directory_exists().unwrap();
}

#[test]
fn test_toml_write_then_load() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("conf").join("zotag-tab.toml");

    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/data/zotag")),
        logging: LoggingConfig {
            level: "debug".to_string(),
        },
        zotero: ZoteroConfig {
            library_id: Some("12345".to_string()),
            library_type: Some("group".to_string()),
            ..Default::default()
        },
        fetch_concurrency: Some(8),
        ..Default::default()
    };

    write_toml_config(&config, &path).unwrap();
    let loaded = load_toml_config(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_toml_sections_are_optional() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("minimal.toml");
    std::fs::write(&path, "[zotero]\nlibrary_id = \"42\"\n").unwrap();

    let loaded = load_toml_config(&path).unwrap();
    assert_eq!(loaded.zotero.library_id.as_deref(), Some("42"));
    assert_eq!(loaded.logging.level, "info");
    assert!(loaded.root_folder.is_none());
    assert!(loaded.server.bind.is_none());
}

#[test]
fn test_missing_or_invalid_toml_falls_back_to_defaults() {
    let temp_dir = TempDir::new().unwrap();

    let missing = temp_dir.path().join("missing.toml");
    assert_eq!(load_toml_config_or_default(Some(&missing)), TomlConfig::default());

    let invalid = temp_dir.path().join("invalid.toml");
    std::fs::write(&invalid, "this is = = not toml").unwrap();
    assert!(load_toml_config(&invalid).is_err());
    assert_eq!(load_toml_config_or_default(Some(&invalid)), TomlConfig::default());

    assert_eq!(load_toml_config_or_default(None), TomlConfig::default());
}
