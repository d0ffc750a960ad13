//! Integration tests for viewer-config
//!
//! These tests verify the config loading pipeline with real file system operations.

use std::path::PathBuf;
use tempfile::tempdir;

/// Test loading an explicit config file
#[test]
fn test_load_from_file() {
    let temp = tempdir().unwrap();
    let config_path = temp.path().join("config.toml");

    let config_content = r#"
[instance]
service_name = "com.example.viewer"
object_path = "/app"
call_timeout_ms = 1500

[crash]
reporter_name = "viewer-crash-reporter"
grid_id = "aditi"
dump_dir = "/tmp/dumps"

[logging]
level = "debug"
"#;
    std::fs::write(&config_path, config_content).unwrap();

    let config = viewer_config::Config::load_from(&config_path).unwrap();
    let from_env = |key: &str| std::env::var_os(key).is_some();

    assert_eq!(config.instance.service_name, "com.example.viewer");
    assert_eq!(config.instance.object_path, "/app");
    assert_eq!(config.crash.reporter_name, "viewer-crash-reporter");
    assert_eq!(config.logging.level, "debug");
    if !from_env("VIEWER_CALL_TIMEOUT_MS") {
        assert_eq!(config.instance.call_timeout_ms, 1500);
    }
    if !from_env("VIEWER_GRID") {
        assert_eq!(config.crash.grid_id, "aditi");
    }
    if !from_env("VIEWER_DUMP_DIR") {
        assert_eq!(config.crash.dump_dir, Some(PathBuf::from("/tmp/dumps")));
    }

    // Defaults fill the rest
    assert_eq!(config.instance.dispatch_timeout_ms, 2_000);
    assert!(config.plugin.enabled);
}

/// Test config hierarchy: local config overrides global section by section
#[test]
fn test_config_hierarchy_local_overrides_global() {
    let temp = tempdir().unwrap();

    let global = r#"
[instance]
service_name = "com.example.global"

[crash]
grid_id = "agni"
app_title = "Global Viewer"
"#;
    let local = r#"
[crash]
grid_id = "aditi"
"#;
    let global_path = temp.path().join("global.toml");
    std::fs::write(&global_path, global).unwrap();
    let local_path = temp.path().join("local.toml");
    std::fs::write(&local_path, local).unwrap();

    let config = viewer_config::Config::load_layered(Some(&global_path), &local_path).unwrap();

    // [instance] untouched by the local file
    assert_eq!(config.instance.service_name, "com.example.global");
    // [crash] replaced wholesale: grid from local, title back to default
    assert_eq!(config.crash.grid_id, "aditi");
    assert_eq!(config.crash.app_title, "Second Life");
}

/// Test complete config serialization/deserialization cycle
#[test]
fn test_config_full_roundtrip_with_all_sections() {
    let original = viewer_config::Config::default();

    let temp = tempdir().unwrap();
    let config_path = temp.path().join("config.toml");
    std::fs::write(&config_path, viewer_config::Config::default_toml().unwrap()).unwrap();

    let loaded: viewer_config::Config =
        toml::from_str(&std::fs::read_to_string(&config_path).unwrap()).unwrap();

    assert_eq!(original.instance.service_name, loaded.instance.service_name);
    assert_eq!(original.instance.object_path, loaded.instance.object_path);
    assert_eq!(original.crash.reporter_name, loaded.crash.reporter_name);
    assert_eq!(original.crash.trap_signal, loaded.crash.trap_signal);
    assert_eq!(
        original.plugin.search_paths.len(),
        loaded.plugin.search_paths.len()
    );
    assert_eq!(original.logging.level, loaded.logging.level);
}

/// Malformed TOML surfaces as a parse error, not a panic
#[test]
fn test_malformed_local_config_is_an_error() {
    let mut config = viewer_config::Config::default();
    let err = config.merge_str("[crash\ngrid_id = 1").unwrap_err();
    assert!(matches!(err, viewer_config::ConfigError::Toml(_)));
}

/// Missing files fall back to defaults rather than failing
#[test]
fn test_load_layered_without_files_is_default() {
    let temp = tempdir().unwrap();
    let config = viewer_config::Config::load_layered(
        Some(&temp.path().join("absent-global.toml")),
        &temp.path().join("absent-local.toml"),
    )
    .unwrap();
    let default = viewer_config::Config::default();
    assert_eq!(config.instance.service_name, default.instance.service_name);
    assert_eq!(config.crash.grid_id, default.crash.grid_id);

    let config =
        viewer_config::Config::load_layered(None, &temp.path().join("absent.toml")).unwrap();
    assert_eq!(config.logging.level, default.logging.level);
}

/// A broken explicit file is reported, not silently replaced by defaults
#[test]
fn test_load_from_malformed_file_is_an_error() {
    let temp = tempdir().unwrap();
    let config_path = temp.path().join("config.toml");
    std::fs::write(&config_path, "[instance\nservice_name = ").unwrap();
    assert!(matches!(
        viewer_config::Config::load_from(&config_path),
        Err(viewer_config::ConfigError::Toml(_))
    ));
    assert!(matches!(
        viewer_config::Config::load_from(&temp.path().join("missing.toml")),
        Err(viewer_config::ConfigError::Io(_))
    ));
}
