//! CCTray Monitor - CI build status poller for the system tray.
//!
//! This crate polls a CruiseControl-style CI server, decides whether the
//! tracked builds are healthy, and turns status changes into tray icon
//! updates and pop-up notifications.
//!
//! # Overview
//!
//! Each poll cycle fetches one or more status pages, counts the failure
//! markers on them, compares the result with the previous cycle and hands
//! the outcome to a [`sink::StatusSink`]. Only edges (a build breaking or
//! being fixed) notify; the icon and tooltip are refreshed every cycle.
//!
//! Three tracking modes are supported: the aggregate index page, a single
//! project, or a set of projects. Project names are discovered through the
//! CI server's management endpoint when it is enabled.
//!
//! # Modules
//!
//! - [`types`]: Core value types (status, transitions, tray state)
//! - [`config`]: Poll configuration from defaults and environment variables
//! - [`settings`]: Persisted settings file
//! - [`fetcher`]: Status page fetching and failure-marker counting
//! - [`management`]: Management endpoint client (discovery, remote builds)
//! - [`directory`]: Project name to slot mapping
//! - [`store`]: Last-known status per target
//! - [`transition`]: Transition classification
//! - [`presenter`]: Icon and tooltip rendering
//! - [`monitor`]: One complete poll cycle
//! - [`scheduler`]: Recurring poll timer and its control handle
//! - [`sink`]: Output collaborator trait and a logging implementation
//! - [`error`]: Error types for monitor operations

pub mod config;
pub mod directory;
pub mod error;
pub mod fetcher;
pub mod management;
pub mod monitor;
pub mod presenter;
pub mod scheduler;
pub mod settings;
pub mod sink;
pub mod store;
pub mod transition;
pub mod types;

pub use config::{ConfigError, Credentials, ManagementConfig, PollConfiguration};
pub use directory::{DirectoryError, ProjectDirectory};
pub use error::{ErrorSignal, MonitorError, Result};
pub use fetcher::{FetchError, FetchRequest, HttpStatusFetcher, StatusFetcher, StatusPage};
pub use management::{ManagementApi, ManagementClient, ManagementError};
pub use monitor::{CycleReport, Monitor, TargetOutcome};
pub use scheduler::{PollScheduler, SchedulerCommand, SchedulerHandle};
pub use settings::{Settings, SettingsError};
pub use sink::{LogSink, StatusSink};
pub use store::StatusStore;
pub use types::{
    BuildStatus, IconState, Notification, Project, Slot, StatusKey, TrackingMode, TrackingTarget,
    Transition, TrayState,
};
