use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use bindery::config::{ConfigError, DataViewConfig, EngineConfig, PersistenceConfig, ValidationConfig};
use bindery::{Runtime, RuntimeSettings};

fn write_config(dir: &tempfile::TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("config.toml");
    fs::write(&path, content).expect("write config");
    path
}

/// Test that EngineConfig::default() produces the documented values.
#[test]
fn test_config_default_values() {
    let config = EngineConfig::default();

    assert_eq!(config.validation.debounce_ms, 300);
    assert!(config.validation.validate_on_change);
    assert!(!config.lifecycle.strict);
    assert_eq!(config.data_view.default_page_size, 20);
    assert!(config.persistence.dir.is_none());
}

/// Test that EngineConfig::config_path() ends with the expected filename.
#[test]
fn test_config_path_ends_with_expected() {
    let path = EngineConfig::config_path();
    assert!(path.ends_with("bindery/config.toml"));
}

#[test]
fn test_load_from_full_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
[validation]
debounce_ms = 150
validate_on_change = false

[lifecycle]
strict = true

[data_view]
default_page_size = 50

[persistence]
dir = "/var/lib/bindery"
"#,
    );

    let config = EngineConfig::load_from(&path).unwrap();
    assert_eq!(
        config.validation,
        ValidationConfig {
            debounce_ms: 150,
            validate_on_change: false,
        }
    );
    assert!(config.lifecycle.strict);
    assert_eq!(config.data_view, DataViewConfig { default_page_size: 50 });
    assert_eq!(
        config.persistence,
        PersistenceConfig {
            dir: Some(PathBuf::from("/var/lib/bindery")),
        }
    );
}

/// Missing sections and keys fall back to defaults.
#[test]
fn test_load_from_partial_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[validation]\ndebounce_ms = 10\n");

    let config = EngineConfig::load_from(&path).unwrap();
    assert_eq!(config.validation.debounce_ms, 10);
    assert!(config.validation.validate_on_change);
    assert_eq!(config.data_view, DataViewConfig::default());

    let empty = write_config(&dir, "");
    assert_eq!(EngineConfig::load_from(&empty).unwrap(), EngineConfig::default());
}

#[test]
fn test_load_from_missing_file_is_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    match EngineConfig::load_from(&path) {
        Err(ConfigError::ReadError { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("Expected ReadError, got {other:?}"),
    }
}

#[test]
fn test_load_from_invalid_toml_is_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[validation\ndebounce_ms = ");

    let err = EngineConfig::load_from(&path).unwrap_err();
    assert!(matches!(err, ConfigError::ParseError { .. }));
    assert!(err.to_string().contains("Failed to parse config file"));
}

#[test]
fn test_load_from_wrong_type_is_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[data_view]\ndefault_page_size = \"many\"\n");

    assert!(matches!(
        EngineConfig::load_from(&path),
        Err(ConfigError::ParseError { .. })
    ));
}

#[test]
fn test_validation_rejects_long_debounce() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[validation]\ndebounce_ms = 60001\n");

    match EngineConfig::load_from(&path).unwrap_err() {
        ConfigError::ValidationError { message } => {
            assert!(message.contains("validation.debounce_ms"));
        }
        other => panic!("Expected ValidationError, got {other:?}"),
    }
}

#[test]
fn test_validation_rejects_empty_persistence_dir() {
    let mut config = EngineConfig::default();
    config.persistence.dir = Some(PathBuf::new());

    match config.validate().unwrap_err() {
        ConfigError::ValidationError { message } => {
            assert_eq!(message, "persistence.dir must not be empty");
        }
        other => panic!("Expected ValidationError, got {other:?}"),
    }
}

#[test]
fn test_validation_passes_for_default() {
    assert!(EngineConfig::default().validate().is_ok());
}

#[test]
fn test_config_serializes_back_to_toml() {
    let mut config = EngineConfig::default();
    config.lifecycle.strict = true;
    config.data_view.default_page_size = 5;

    let text = toml::to_string(&config).unwrap();
    let parsed: EngineConfig = toml::from_str(&text).unwrap();
    assert_eq!(parsed, config);
}

/// The runtime picks its defaults up from the loaded config.
#[test]
fn test_runtime_settings_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        "[validation]\ndebounce_ms = 25\n[lifecycle]\nstrict = true\n[data_view]\ndefault_page_size = 3\n",
    );
    let config = EngineConfig::load_from(&path).unwrap();

    let settings = RuntimeSettings::from(&config);
    assert_eq!(settings.validation_debounce, Duration::from_millis(25));
    assert!(settings.strict);

    let rt = Runtime::with_config(&config);
    assert_eq!(rt.settings(), settings);
    assert_eq!(rt.settings().default_page_size, 3);
}
