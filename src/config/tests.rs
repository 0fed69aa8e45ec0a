//! Tests for settings loading and validation.

use super::*;
use std::collections::HashMap;
use std::path::PathBuf;
use tempfile::TempDir;

fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_default_settings() {
    let settings = Settings::default();

    assert_eq!(settings.wrapper, "/usr/bin/env");
    assert_eq!(settings.unbuffered_marker, "NSUnbufferedIO=YES");
    assert_eq!(settings.read_chunk_size, 65536);
    assert!(settings.watchdog_enabled);
    assert!(settings.watchdog.is_none());
    assert_eq!(settings.watchdog_poll_ms, 500);
    assert_eq!(settings.kill_grace_ms, 1000);
    assert!(settings.validate().is_ok());
}

#[test]
fn test_parse_empty_yaml() {
    let settings = Settings::from_yaml("").unwrap();
    assert_eq!(settings, Settings::default());
}

#[test]
fn test_parse_partial_yaml() {
    let yaml = r#"
wrapper: /bin/env
watchdog_poll_ms: 100
some_future_field: true
"#;
    let settings = Settings::from_yaml(yaml).unwrap();

    assert_eq!(settings.wrapper, "/bin/env");
    assert_eq!(settings.watchdog_poll_ms, 100);
    // Unspecified values should use defaults
    assert_eq!(settings.kill_grace_ms, 1000);
    assert!(settings.watchdog_enabled);
}

#[test]
fn test_invalid_marker_rejected() {
    let yaml = "unbuffered_marker: UNBUFFERED\n";
    let err = Settings::from_yaml(yaml).unwrap_err();
    assert!(err.to_string().contains("KEY=VALUE"));
}

#[test]
fn test_zero_values_rejected() {
    for yaml in [
        "read_chunk_size: 0\n",
        "watchdog_poll_ms: 0\n",
        "kill_grace_ms: 0\n",
        "wrapper: ''\n",
    ] {
        assert!(Settings::from_yaml(yaml).is_err(), "accepted: {}", yaml);
    }
}

#[test]
fn test_malformed_yaml_is_config_error() {
    let err = Settings::from_yaml("wrapper: [unterminated").unwrap_err();
    assert!(matches!(err, crate::error::TaskError::Config(_)));
}

#[test]
fn test_yaml_roundtrip_preserves_watchdog_path() {
    let settings = Settings {
        watchdog: Some(PathBuf::from("/opt/bin/taskrun-watchdog")),
        ..Settings::default()
    };
    let yaml = settings.to_yaml().unwrap();
    assert_eq!(Settings::from_yaml(&yaml).unwrap(), settings);
}

#[test]
fn test_load_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("taskrun.yaml");
    std::fs::write(&path, "kill_grace_ms: 250\n").unwrap();

    let settings = Settings::load(&path).unwrap();
    assert_eq!(settings.kill_grace_ms, 250);
}

#[test]
fn test_load_missing_file_fails() {
    let temp_dir = TempDir::new().unwrap();
    let err = Settings::load(temp_dir.path().join("missing.yaml")).unwrap_err();
    assert!(err.to_string().contains("failed to read settings file"));
}

#[test]
fn test_env_overrides() {
    let settings = Settings::from_lookup(lookup_from(&[
        (WRAPPER_ENV, "/bin/env"),
        (WATCHDOG_ENV, "/tmp/wd"),
        (NO_WATCHDOG_ENV, "1"),
    ]))
    .unwrap();

    assert_eq!(settings.wrapper, "/bin/env");
    assert_eq!(settings.watchdog, Some(PathBuf::from("/tmp/wd")));
    assert!(!settings.watchdog_enabled);
}

#[test]
fn test_no_watchdog_zero_keeps_watchdog() {
    let settings = Settings::from_lookup(lookup_from(&[(NO_WATCHDOG_ENV, "0")])).unwrap();
    assert!(settings.watchdog_enabled);
}

#[test]
fn test_env_config_file_then_overrides() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("taskrun.yaml");
    std::fs::write(&path, "wrapper: /from/file\nwatchdog_poll_ms: 50\n").unwrap();

    let settings = Settings::from_lookup(lookup_from(&[
        (CONFIG_ENV, path.to_str().unwrap()),
        (WRAPPER_ENV, "/from/env"),
    ]))
    .unwrap();

    assert_eq!(settings.wrapper, "/from/env");
    assert_eq!(settings.watchdog_poll_ms, 50);
}
