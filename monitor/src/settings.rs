//! Persisted settings file.
//!
//! Settings are stored as a TOML document with a single `[trayprop]` table.
//! The key set mirrors the configuration dialog of the tray application, so
//! files written by one session load cleanly in the next:
//!
//! ```toml
//! [trayprop]
//! url = "http://localhost:8080/cruisecontrol"
//! failString = "BUILD FAILED"
//! refreshTime = 60000
//! showDialog = true
//! saveConfig = false
//! remotePortActive = true
//! remotePort = 8000
//! multipleOn = true
//! multipleProjects = "core:web"
//! useAuth = false
//! userName = ""
//! passwd = ""
//! jmxUseAuth = false
//! jmxUserName = ""
//! jmxPassWord = ""
//! indexFailString = "failed"
//! ```
//!
//! `failString` is the marker of the pages the restored mode polls: the
//! index marker in index mode, the project marker otherwise. The marker the
//! mode does not use is kept in `indexFailString` or `projectFailString` so
//! a later mode switch still sees it; files without those keys load with
//! the default.
//!
//! `multipleOn` is set whenever the URL alone would imply a different mode,
//! so a single project tracked from an index URL is written as a one-name
//! `multipleProjects` list.
//!
//! Loaded from `<config dir>/cctray/property.toml` unless a path is given.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{
    join_project_list, split_project_list, Credentials, ManagementConfig, PollConfiguration,
    DEFAULT_MANAGEMENT_PORT,
};
use crate::types::TrackingMode;

/// File name of the settings file inside the config directory.
const SETTINGS_FILE: &str = "property.toml";

/// Errors that can occur while reading or writing the settings file.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// File system I/O error.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or misses required keys.
    #[error("invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// The settings could not be encoded.
    #[error("failed to encode settings: {0}")]
    Encode(#[from] toml::ser::Error),

    /// No platform config directory could be determined.
    #[error("failed to determine configuration directory")]
    NoConfigDirectory,
}

#[derive(Debug, Serialize, Deserialize)]
struct SettingsFile {
    trayprop: Settings,
}

/// The persisted key set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub url: String,
    pub fail_string: String,
    /// Poll interval in milliseconds.
    pub refresh_time: u64,
    pub show_dialog: bool,
    pub save_config: bool,
    pub remote_port_active: bool,
    pub remote_port: u16,
    pub multiple_on: bool,
    /// Colon-delimited project names.
    pub multiple_projects: String,
    pub use_auth: bool,
    pub user_name: String,
    pub passwd: String,
    pub jmx_use_auth: bool,
    pub jmx_user_name: String,
    pub jmx_pass_word: String,
    /// Index marker while a project mode is active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_fail_string: Option<String>,
    /// Project marker while index mode is active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_fail_string: Option<String>,
}

impl Settings {
    /// Default settings file location.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::NoConfigDirectory` if no home directory exists.
    pub fn default_path() -> Result<PathBuf, SettingsError> {
        ProjectDirs::from("net", "cctray", "cctray")
            .map(|dirs| dirs.config_dir().join(SETTINGS_FILE))
            .ok_or(SettingsError::NoConfigDirectory)
    }

    /// Reads settings from `path`.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: SettingsFile = toml::from_str(&contents).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Settings loaded");
        Ok(file.trayprop)
    }

    /// Writes settings to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if encoding or writing fails.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let contents = toml::to_string(&SettingsFile {
            trayprop: self.clone(),
        })?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| SettingsError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        fs::write(path, contents).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Settings saved");
        Ok(())
    }

    /// Converts persisted settings into a poll configuration.
    ///
    /// The result is not validated; callers validate after applying any
    /// overrides.
    #[must_use]
    pub fn to_config(&self) -> PollConfiguration {
        let defaults = PollConfiguration::default();

        let mode = if self.multiple_on {
            TrackingMode::from_projects(split_project_list(&self.multiple_projects))
        } else {
            PollConfiguration::mode_from_url(&self.url)
        };

        let (failure_marker, project_marker) = if mode == TrackingMode::Index {
            (
                self.fail_string.clone(),
                self.project_fail_string
                    .clone()
                    .unwrap_or(defaults.project_marker),
            )
        } else {
            (
                self.index_fail_string
                    .clone()
                    .unwrap_or(defaults.failure_marker),
                self.fail_string.clone(),
            )
        };

        let management = self.remote_port_active.then(|| ManagementConfig {
            port: self.remote_port,
            credentials: self
                .jmx_use_auth
                .then(|| Credentials::new(self.jmx_user_name.clone(), self.jmx_pass_word.clone())),
        });

        PollConfiguration {
            url: self.url.clone(),
            failure_marker,
            project_marker,
            interval: Duration::from_millis(self.refresh_time),
            show_notifications: self.show_dialog,
            save_on_exit: self.save_config,
            web_credentials: self
                .use_auth
                .then(|| Credentials::new(self.user_name.clone(), self.passwd.clone())),
            management,
            mode,
        }
    }

    /// Captures a poll configuration for persistence.
    #[must_use]
    pub fn from_config(config: &PollConfiguration) -> Self {
        let (fail_string, index_fail_string, project_fail_string) = match &config.mode {
            TrackingMode::Index => (
                config.failure_marker.clone(),
                None,
                Some(config.project_marker.clone()),
            ),
            _ => (
                config.project_marker.clone(),
                Some(config.failure_marker.clone()),
                None,
            ),
        };
        let multiple_on = config.mode != PollConfiguration::mode_from_url(&config.url);
        let multiple_projects = if multiple_on {
            join_project_list(&config.mode.project_names())
        } else {
            String::new()
        };
        let web = config.web_credentials.as_ref();
        let jmx = config.management.as_ref().and_then(|m| m.credentials.as_ref());

        Self {
            url: config.url.clone(),
            fail_string,
            refresh_time: u64::try_from(config.interval.as_millis()).unwrap_or(u64::MAX),
            show_dialog: config.show_notifications,
            save_config: config.save_on_exit,
            remote_port_active: config.management.is_some(),
            remote_port: config
                .management
                .as_ref()
                .map_or(DEFAULT_MANAGEMENT_PORT, |m| m.port),
            multiple_on,
            multiple_projects,
            use_auth: web.is_some(),
            user_name: web.map(|c| c.username.clone()).unwrap_or_default(),
            passwd: web.map(|c| c.password.clone()).unwrap_or_default(),
            jmx_use_auth: jmx.is_some(),
            jmx_user_name: jmx.map(|c| c.username.clone()).unwrap_or_default(),
            jmx_pass_word: jmx.map(|c| c.password.clone()).unwrap_or_default(),
            index_fail_string,
            project_fail_string,
        }
    }
}
