//! Integration tests for cdbl-config
//!
//! These tests verify the config loading pipeline with real file system operations.

use std::path::PathBuf;
use tempfile::tempdir;

/// Test config loading from a real config file
#[test]
fn test_load_config_from_file() {
    let temp = tempdir().unwrap();
    let cdbl_dir = temp.path().join(".cdbl");
    std::fs::create_dir_all(&cdbl_dir).unwrap();

    let config_content = r#"
[paths]
cache_root = "/custom/cache/http"
assets_root = "/custom/assets"

[swap]
hash_algorithm = "blake3"
error_preview = 5

[flags]
set_readonly = false

[fixes.no_arms]
flag_name = "FFlagHttpUseRbxStorage10"
flag_value = "false"

[fixes.no_arms.assets]
aaaa = "bbbb"
cccc = "dddd"
"#;
    let path = cdbl_dir.join("config.toml");
    std::fs::write(&path, config_content).unwrap();

    let config = cdbl_config::Config::from_file(&path).unwrap();

    assert_eq!(
        config.paths.cache_root,
        Some(PathBuf::from("/custom/cache/http"))
    );
    assert_eq!(config.paths.assets_root, PathBuf::from("/custom/assets"));
    assert_eq!(config.swap.hash_algorithm, "blake3");
    assert_eq!(config.swap.error_preview, 5);
    // Unspecified fields keep their defaults
    assert_eq!(config.swap.backup_suffix, ".cdbl_backup");
    assert!(!config.flags.set_readonly);
    assert_eq!(config.fixes.no_arms.assets.len(), 2);
    assert_eq!(config.fixes.no_arms.assets["aaaa"], "bbbb");
    // Untouched fix keeps its default asset-map behaviour
    assert!(config.fixes.skybox.use_assets_map);
}

/// Test config hierarchy: later layer overrides earlier
#[test]
fn test_config_hierarchy_project_overrides_global() {
    let temp = tempdir().unwrap();

    let global = temp.path().join("global.toml");
    std::fs::write(
        &global,
        r#"
[paths]
assets_root = "/global/assets"
settings_file = "/global/IxpSettings.json"

[swap]
error_preview = 4
"#,
    )
    .unwrap();

    let project = temp.path().join("project.toml");
    std::fs::write(
        &project,
        r#"
[paths]
settings_file = "/project/IxpSettings.json"
"#,
    )
    .unwrap();

    let mut config = cdbl_config::Config::from_file(&global).unwrap();
    config.merge(cdbl_config::Config::from_file(&project).unwrap());

    assert_eq!(config.paths.assets_root, PathBuf::from("/global/assets"));
    assert_eq!(
        config.paths.settings_file,
        PathBuf::from("/project/IxpSettings.json")
    );
    assert_eq!(config.swap.error_preview, 4);
}

/// Malformed TOML surfaces as a parse error rather than silently defaulting
#[test]
fn test_invalid_toml_is_an_error() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("broken.toml");
    std::fs::write(&path, "[paths\ncache_root = ").unwrap();

    let err = cdbl_config::Config::from_file(&path).unwrap_err();
    assert!(matches!(err, cdbl_config::ConfigError::Toml(_)));
}

#[test]
fn test_missing_file_is_io_error() {
    let temp = tempdir().unwrap();
    let err = cdbl_config::Config::from_file(&temp.path().join("nope.toml")).unwrap_err();
    assert!(matches!(err, cdbl_config::ConfigError::Io(_)));
}
