//! Integration tests for the persisted settings file.
//!
//! These tests cover writing and reading the `[trayprop]` document on disk
//! and the precedence of `CCTRAY_*` environment variables over file values.
//!
//! # Important Notes
//!
//! The precedence tests modify environment variables and use `serial_test`
//! to prevent interference between tests.

use std::env;
use std::fs;
use std::time::Duration;

use cctray_monitor::config::{Credentials, ManagementConfig, PollConfiguration};
use cctray_monitor::settings::{Settings, SettingsError};
use cctray_monitor::types::TrackingMode;
use serial_test::serial;
use tempfile::TempDir;

// =============================================================================
// Test Helpers
// =============================================================================

/// Runs `f` with every `CCTRAY_*` variable cleared, restoring them after.
fn with_clean_env<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let saved: Vec<(String, String)> = env::vars()
        .filter(|(k, _)| k.starts_with("CCTRAY_"))
        .collect();
    for (key, _) in &saved {
        env::remove_var(key);
    }

    let result = f();

    for (key, _) in env::vars().filter(|(k, _)| k.starts_with("CCTRAY_")) {
        env::remove_var(key);
    }
    for (key, value) in saved {
        env::set_var(key, value);
    }
    result
}

fn multi_project_config() -> PollConfiguration {
    PollConfiguration {
        url: "http://ci.example.com:8080/cruisecontrol".to_string(),
        interval: Duration::from_secs(30),
        show_notifications: false,
        save_on_exit: true,
        management: Some(ManagementConfig {
            port: 8001,
            credentials: Some(Credentials::new("admin", "secret")),
        }),
        mode: TrackingMode::from_projects(vec!["core".to_string(), "web".to_string()]),
        ..PollConfiguration::default()
    }
}

// =============================================================================
// File round trip
// =============================================================================

#[test]
fn test_saved_settings_load_back() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("property.toml");
    let config = multi_project_config();

    Settings::from_config(&config).save(&path).unwrap();
    let loaded = Settings::load(&path).unwrap().to_config();

    assert_eq!(loaded, config);
}

#[test]
fn test_single_project_on_index_url_survives_save() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("property.toml");
    let config = PollConfiguration {
        url: "http://ci.example.com:8080/cruisecontrol".to_string(),
        mode: TrackingMode::Single("core".to_string()),
        ..PollConfiguration::default()
    };

    Settings::from_config(&config).save(&path).unwrap();
    let loaded = Settings::load(&path).unwrap().to_config();

    assert_eq!(loaded.mode, TrackingMode::Single("core".to_string()));
    assert_eq!(loaded.failure_marker, "failed");
    assert_eq!(loaded.project_marker, "BUILD FAILED");
    assert_eq!(loaded, config);
}

#[test]
fn test_custom_markers_survive_save_in_every_mode() {
    let dir = TempDir::new().unwrap();
    let modes = [
        ("http://ci/cruisecontrol", TrackingMode::Index),
        (
            "http://ci/cruisecontrol/buildresults/core",
            TrackingMode::Single("core".to_string()),
        ),
        (
            "http://ci/cruisecontrol",
            TrackingMode::Multi(vec!["core".to_string(), "web".to_string()]),
        ),
    ];

    for (i, (url, mode)) in modes.into_iter().enumerate() {
        let path = dir.path().join(format!("property-{i}.toml"));
        let config = PollConfiguration {
            url: url.to_string(),
            failure_marker: "red".to_string(),
            project_marker: "BUILD RED".to_string(),
            mode,
            ..PollConfiguration::default()
        };

        Settings::from_config(&config).save(&path).unwrap();
        let loaded = Settings::load(&path).unwrap().to_config();

        assert_eq!(loaded, config, "mode {:?}", config.mode);
    }
}

#[test]
fn test_saved_file_uses_tray_property_keys() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("property.toml");

    Settings::from_config(&multi_project_config()).save(&path).unwrap();
    let contents = fs::read_to_string(&path).unwrap();

    assert!(contents.contains("[trayprop]"));
    assert!(contents.contains("refreshTime = 30000"));
    assert!(contents.contains("multipleProjects = \"core:web\""));
    assert!(contents.contains("remotePort = 8001"));
}

#[test]
fn test_save_creates_missing_directories() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("cctray").join("property.toml");

    Settings::from_config(&PollConfiguration::default())
        .save(&path)
        .unwrap();

    assert!(path.exists());
}

#[test]
fn test_hand_written_file_loads() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("property.toml");
    fs::write(
        &path,
        r#"
[trayprop]
url = "http://ci.example.com/cruisecontrol/buildresults/core"
failString = "BUILD FAILED"
refreshTime = 45000
showDialog = true
saveConfig = false
remotePortActive = false
remotePort = 8000
multipleOn = false
multipleProjects = ""
useAuth = true
userName = "viewer"
passwd = "pw"
jmxUseAuth = false
jmxUserName = ""
jmxPassWord = ""
"#,
    )
    .unwrap();

    let config = Settings::load(&path).unwrap().to_config();

    assert_eq!(config.mode, TrackingMode::Single("core".to_string()));
    assert_eq!(config.project_marker, "BUILD FAILED");
    assert_eq!(config.interval, Duration::from_secs(45));
    assert!(config.management.is_none());
    assert_eq!(config.web_credentials, Some(Credentials::new("viewer", "pw")));
    tokio_test::assert_ok!(config.validate());
}

#[test]
fn test_truncated_file_is_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("property.toml");
    fs::write(&path, "[trayprop]\nurl = \"http://ci/cruisecontrol\"\n").unwrap();

    let err = Settings::load(&path).unwrap_err();

    assert!(matches!(err, SettingsError::Parse { .. }));
}

// =============================================================================
// Environment precedence
// =============================================================================

#[test]
#[serial]
fn test_env_overrides_settings_file() {
    with_clean_env(|| {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("property.toml");
        Settings::from_config(&multi_project_config()).save(&path).unwrap();

        env::set_var("CCTRAY_REFRESH_SECS", "90");
        env::set_var("CCTRAY_PROJECTS", "docs");

        let config = Settings::load(&path).unwrap().to_config().with_env().unwrap();

        assert_eq!(config.interval, Duration::from_secs(90));
        assert_eq!(config.mode, TrackingMode::Single("docs".to_string()));
        assert_eq!(config.url, "http://ci.example.com:8080/cruisecontrol");
        assert_eq!(config.management.map(|m| m.port), Some(8001));
    });
}

#[test]
#[serial]
fn test_settings_file_used_without_env() {
    with_clean_env(|| {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("property.toml");
        let expected = multi_project_config();
        Settings::from_config(&expected).save(&path).unwrap();

        let config = Settings::load(&path).unwrap().to_config().with_env().unwrap();

        assert_eq!(config, expected);
    });
}
