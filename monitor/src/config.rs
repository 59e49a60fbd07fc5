//! Poll configuration for the CCTray Monitor.
//!
//! A [`PollConfiguration`] is an immutable-per-cycle snapshot of everything
//! the poll cycle needs. It is assembled from defaults, an optional settings
//! file (see [`crate::settings`]), environment variables and CLI flags, and
//! validated once at that boundary.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `CCTRAY_URL` | `http://localhost:8080/cruisecontrol` | Index or project page URL |
//! | `CCTRAY_FAIL_STRING` | `failed` | Failure marker on the index page |
//! | `CCTRAY_PROJECT_FAIL_STRING` | `BUILD FAILED` | Failure marker on project pages |
//! | `CCTRAY_REFRESH_SECS` | 60 | Seconds between polls (minimum 20) |
//! | `CCTRAY_QUIET` | unset | Any value other than `0`/`false` disables notifications |
//! | `CCTRAY_REMOTE_PORT` | unset | Management port; enables project discovery |
//! | `CCTRAY_PROJECTS` | unset | Colon-delimited list of projects to observe |
//! | `CCTRAY_WEB_USER` / `CCTRAY_WEB_PASSWORD` | unset | Status page basic auth |
//! | `CCTRAY_JMX_USER` / `CCTRAY_JMX_PASSWORD` | unset | Management endpoint basic auth |
//!
//! # Example
//!
//! ```no_run
//! use cctray_monitor::config::PollConfiguration;
//!
//! let config = PollConfiguration::from_env().expect("Failed to load configuration");
//! println!("Polling {} every {:?}", config.url, config.interval);
//! ```

use std::env;
use std::fmt;
use std::time::Duration;

use thiserror::Error;
use url::Url;
use zeroize::Zeroize;

use crate::types::TrackingMode;

/// Default CruiseControl web application URL.
pub const DEFAULT_URL: &str = "http://localhost:8080/cruisecontrol";

/// Default failure marker on the index page.
pub const DEFAULT_FAILURE_MARKER: &str = "failed";

/// Default failure marker on a project's build-results page.
pub const DEFAULT_PROJECT_MARKER: &str = "BUILD FAILED";

/// Default poll interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Shortest poll interval accepted at the configuration boundary.
pub const MIN_INTERVAL: Duration = Duration::from_secs(20);

/// Default management (remote admin) port.
pub const DEFAULT_MANAGEMENT_PORT: u16 = 8000;

/// Path segment between the index URL and a project name.
const BUILD_RESULTS_SEGMENT: &str = "buildresults";

/// Errors that can occur while assembling or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A value failed to parse or violates a constraint.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// The configured URL cannot be used.
    #[error("invalid url '{url}': {message}")]
    InvalidUrl { url: String, message: String },
}

/// Basic-auth credentials.
///
/// The password is wiped from memory on drop and never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    fn validate(&self, key: &str) -> Result<(), ConfigError> {
        if self.username.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: "username cannot be empty".to_string(),
            });
        }
        if self.password.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: "password cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Drop for Credentials {
    fn drop(&mut self) {
        self.password.zeroize();
    }
}

/// Settings for the CI server's management endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagementConfig {
    /// Port of the management HTTP adaptor on the CI host.
    pub port: u16,
    pub credentials: Option<Credentials>,
}

/// Everything a poll cycle needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfiguration {
    /// Index page or project page URL.
    pub url: String,

    /// Marker whose occurrences on the index page indicate failures.
    pub failure_marker: String,

    /// Marker whose occurrences on a project page indicate a failure.
    pub project_marker: String,

    /// Time between the end of one cycle and the start of the next.
    pub interval: Duration,

    /// Whether edge transitions produce notifications.
    pub show_notifications: bool,

    /// Whether the settings file is written back on shutdown.
    pub save_on_exit: bool,

    /// Basic-auth credentials for the status pages.
    pub web_credentials: Option<Credentials>,

    /// Management endpoint; `None` disables discovery and remote builds.
    pub management: Option<ManagementConfig>,

    pub mode: TrackingMode,
}

impl Default for PollConfiguration {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            failure_marker: DEFAULT_FAILURE_MARKER.to_string(),
            project_marker: DEFAULT_PROJECT_MARKER.to_string(),
            interval: DEFAULT_INTERVAL,
            show_notifications: true,
            save_on_exit: false,
            web_credentials: None,
            management: None,
            mode: TrackingMode::Index,
        }
    }
}

impl PollConfiguration {
    /// Builds a validated configuration from defaults and `CCTRAY_*` variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if a variable cannot be parsed or the result
    /// fails [`validate`](Self::validate).
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::default().with_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Overlays `CCTRAY_*` environment variables onto this configuration.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if a numeric variable cannot be parsed.
    pub fn with_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(url) = env::var("CCTRAY_URL") {
            self.url = url;
            self.mode = Self::mode_from_url(&self.url);
        }

        if let Ok(marker) = env::var("CCTRAY_FAIL_STRING") {
            self.failure_marker = marker;
        }

        if let Ok(marker) = env::var("CCTRAY_PROJECT_FAIL_STRING") {
            self.project_marker = marker;
        }

        if let Ok(val) = env::var("CCTRAY_REFRESH_SECS") {
            let secs = val.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: "CCTRAY_REFRESH_SECS".to_string(),
                message: format!("expected positive integer, got '{val}'"),
            })?;
            self.interval = Duration::from_secs(secs);
        }

        if let Ok(val) = env::var("CCTRAY_QUIET") {
            self.show_notifications = matches!(val.trim(), "0" | "false");
        }

        if let Ok(val) = env::var("CCTRAY_REMOTE_PORT") {
            let port = val.parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                key: "CCTRAY_REMOTE_PORT".to_string(),
                message: format!("expected port number, got '{val}'"),
            })?;
            let credentials = self.management.take().and_then(|m| m.credentials);
            self.management = Some(ManagementConfig { port, credentials });
        }

        if let (Ok(user), Ok(password)) = (env::var("CCTRAY_WEB_USER"), env::var("CCTRAY_WEB_PASSWORD")) {
            self.web_credentials = Some(Credentials::new(user, password));
        }

        if let (Ok(user), Ok(password)) = (env::var("CCTRAY_JMX_USER"), env::var("CCTRAY_JMX_PASSWORD")) {
            if let Some(management) = self.management.as_mut() {
                management.credentials = Some(Credentials::new(user, password));
            }
        }

        if let Ok(val) = env::var("CCTRAY_PROJECTS") {
            self.mode = TrackingMode::from_projects(split_project_list(&val));
        }

        Ok(self)
    }

    /// Checks the constraints that the poll cycle relies on.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` describing the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.parsed_url()?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                url: self.url.clone(),
                message: "url must start with 'http://' or 'https://'".to_string(),
            });
        }

        if self.failure_marker.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "failure_marker".to_string(),
                message: "failure marker cannot be empty".to_string(),
            });
        }

        if self.project_marker.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "project_marker".to_string(),
                message: "project failure marker cannot be empty".to_string(),
            });
        }

        if self.interval < MIN_INTERVAL {
            return Err(ConfigError::InvalidValue {
                key: "interval".to_string(),
                message: format!(
                    "refresh time too short: {}s (minimum {}s)",
                    self.interval.as_secs(),
                    MIN_INTERVAL.as_secs()
                ),
            });
        }

        if let Some(credentials) = &self.web_credentials {
            credentials.validate("web_credentials")?;
        }

        if let Some(management) = &self.management {
            if management.port == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "management.port".to_string(),
                    message: "port must be greater than 0".to_string(),
                });
            }
            if let Some(credentials) = &management.credentials {
                credentials.validate("management.credentials")?;
            }
        }

        Ok(())
    }

    /// URL of the project index page: scheme, authority and the first path
    /// segment of the configured URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidUrl` if the URL cannot be parsed.
    pub fn index_url(&self) -> Result<String, ConfigError> {
        let url = self.parsed_url()?;
        let mut index = format!("{}://{}", url.scheme(), authority(&url));
        if let Some(first) = url.path_segments().and_then(|mut s| s.next()).filter(|s| !s.is_empty()) {
            index.push('/');
            index.push_str(first);
        }
        Ok(index)
    }

    /// URL of a project's build-results page.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidUrl` if the URL cannot be parsed.
    pub fn project_url(&self, project: &str) -> Result<String, ConfigError> {
        Ok(format!("{}/{BUILD_RESULTS_SEGMENT}/{project}", self.index_url()?))
    }

    /// Base URL of the management endpoint, or `None` when it is disabled.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidUrl` if the URL has no host.
    pub fn management_base(&self) -> Result<Option<String>, ConfigError> {
        let Some(management) = &self.management else {
            return Ok(None);
        };
        let url = self.parsed_url()?;
        let host = url.host_str().ok_or_else(|| ConfigError::InvalidUrl {
            url: self.url.clone(),
            message: "url has no host".to_string(),
        })?;
        Ok(Some(format!("http://{host}:{}", management.port)))
    }

    /// Infers the tracking mode implied by a URL alone.
    ///
    /// A URL ending in `/buildresults/<name>` observes that project; any
    /// other URL observes the index page.
    #[must_use]
    pub fn mode_from_url(url: &str) -> TrackingMode {
        let Ok(parsed) = Url::parse(url) else {
            return TrackingMode::Index;
        };
        let segments: Vec<&str> = parsed
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();
        match segments.as_slice() {
            [.., marker, name] if *marker == BUILD_RESULTS_SEGMENT => {
                TrackingMode::Single((*name).to_string())
            }
            _ => TrackingMode::Index,
        }
    }

    fn parsed_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.url).map_err(|e| ConfigError::InvalidUrl {
            url: self.url.clone(),
            message: e.to_string(),
        })?;
        if url.host_str().map_or(true, str::is_empty) {
            return Err(ConfigError::InvalidUrl {
                url: self.url.clone(),
                message: "the url is incomplete".to_string(),
            });
        }
        Ok(url)
    }
}

/// Splits a colon-delimited project list, dropping empty entries.
#[must_use]
pub fn split_project_list(list: &str) -> Vec<String> {
    list.split(':')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Joins project names into the colon-delimited persisted form.
#[must_use]
pub fn join_project_list(projects: &[&str]) -> String {
    projects.join(":")
}

fn authority(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}
