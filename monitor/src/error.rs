//! Error types for the CCTray Monitor.
//!
//! Each module owns its own error enum; [`MonitorError`] gathers them for
//! callers that just need to propagate. [`ErrorSignal`] is the reduced form
//! handed to the UI collaborator, which only needs to know which message to
//! show.

use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::directory::DirectoryError;
use crate::fetcher::FetchError;
use crate::management::ManagementError;
use crate::settings::SettingsError;

/// Errors that can occur during monitor operations.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Settings file error.
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),

    /// Status page fetch error.
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Management endpoint error.
    #[error("management error: {0}")]
    Management(#[from] ManagementError),

    /// Project lookup error.
    #[error("directory error: {0}")]
    Directory(#[from] DirectoryError),

    /// Remote management is not configured.
    #[error("remote management is disabled; set a management port first")]
    RemoteDisabled,

    /// The scheduler task is gone.
    #[error("scheduler stopped")]
    SchedulerStopped,
}

/// Error conditions surfaced to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ErrorSignal {
    /// The management endpoint refused the connection; remote mode is off.
    RemoteUnavailable,

    /// The management endpoint rejected the configured credentials.
    AuthRejected,

    /// The management endpoint needs credentials and none are configured.
    AuthRequired,

    /// Anything else, including unknown projects.
    InternalFailure(String),
}

impl ErrorSignal {
    /// Text for a modal error message.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::RemoteUnavailable => "Connection refused!".to_string(),
            Self::AuthRejected => {
                "Wrong management username or password.\nSet it in the configuration.".to_string()
            }
            Self::AuthRequired => {
                "Management username and password required.\nSet them in the configuration."
                    .to_string()
            }
            Self::InternalFailure(detail) => format!("Internal application failure: {detail}"),
        }
    }
}

impl From<&ManagementError> for ErrorSignal {
    fn from(err: &ManagementError) -> Self {
        match err {
            ManagementError::RemoteUnavailable { .. } => Self::RemoteUnavailable,
            ManagementError::AuthRejected => Self::AuthRejected,
            ManagementError::AuthRequired => Self::AuthRequired,
            other => Self::InternalFailure(other.to_string()),
        }
    }
}

impl From<&DirectoryError> for ErrorSignal {
    fn from(err: &DirectoryError) -> Self {
        Self::InternalFailure(err.to_string())
    }
}

/// A specialized `Result` type for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Slot;

    #[test]
    fn management_errors_map_to_signals() {
        let refused = ManagementError::RemoteUnavailable {
            url: "http://ci:8000/getattribute".to_string(),
        };
        assert_eq!(ErrorSignal::from(&refused), ErrorSignal::RemoteUnavailable);
        assert_eq!(
            ErrorSignal::from(&ManagementError::AuthRejected),
            ErrorSignal::AuthRejected
        );
        assert_eq!(
            ErrorSignal::from(&ManagementError::AuthRequired),
            ErrorSignal::AuthRequired
        );
        assert!(matches!(
            ErrorSignal::from(&ManagementError::Status { status: 500 }),
            ErrorSignal::InternalFailure(_)
        ));
    }

    #[test]
    fn unknown_project_is_internal_failure() {
        let signal = ErrorSignal::from(&DirectoryError::UnknownSlot(Slot::new(9)));
        assert_eq!(
            signal,
            ErrorSignal::InternalFailure("unknown project slot: #9".to_string())
        );
    }

    #[test]
    fn monitor_error_display() {
        let err: MonitorError = ManagementError::AuthRequired.into();
        assert_eq!(
            err.to_string(),
            "management error: management endpoint requires a username and password"
        );

        let err: MonitorError = DirectoryError::UnknownProject("web".to_string()).into();
        assert_eq!(err.to_string(), "directory error: unknown project: web");
    }

    #[test]
    fn signal_messages() {
        assert_eq!(ErrorSignal::RemoteUnavailable.message(), "Connection refused!");
        assert!(ErrorSignal::InternalFailure("x".to_string())
            .message()
            .ends_with(": x"));
    }

    #[test]
    fn error_source_chain() {
        use std::error::Error;

        let config_err = ConfigError::InvalidValue {
            key: "interval".to_string(),
            message: "too short".to_string(),
        };
        let err: MonitorError = config_err.into();
        assert!(err.source().is_some());
    }
}
