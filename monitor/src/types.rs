//! Core value types for build-status monitoring.
//!
//! These types are shared by every stage of a poll cycle: the fetcher
//! produces [`BuildStatus`] values, the store keys them by [`StatusKey`],
//! the transition engine turns pairs of them into [`Transition`]s, and the
//! presenter folds them into a [`TrayState`].

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable handle for one discovered project.
///
/// Slots are assigned in discovery order and never reused within a session.
/// The index-page aggregate is not a slot; it is [`StatusKey::Index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slot(usize);

impl Slot {
    /// Creates a slot from its discovery position.
    #[must_use]
    pub const fn new(position: usize) -> Self {
        Self(position)
    }

    /// Returns the discovery position of this slot.
    #[must_use]
    pub const fn position(self) -> usize {
        self.0
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One CI-tracked build unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub slot: Slot,
}

/// Last-known health of a tracked target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    /// Nothing observed yet, or the last fetch failed.
    #[default]
    Unknown,
    Ok,
    Broken,
}

impl BuildStatus {
    /// Maps a broken-build count to a status.
    #[must_use]
    pub fn from_broken_count(count: usize) -> Self {
        if count > 0 {
            Self::Broken
        } else {
            Self::Ok
        }
    }

    #[must_use]
    pub fn is_known(self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// Key into the status store.
///
/// The index-page aggregate is its own variant rather than a reserved slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKey {
    Index,
    Project(Slot),
}

/// Which projects are observed, expressed by name.
///
/// This is the configuration-level view; it is resolved against the
/// project directory into a [`TrackingTarget`] at the start of each cycle.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "projects", rename_all = "snake_case")]
pub enum TrackingMode {
    /// Aggregate "all projects" view from the index page.
    #[default]
    Index,
    /// One project page.
    Single(String),
    /// An explicit list of project pages.
    Multi(Vec<String>),
}

impl TrackingMode {
    /// Builds a mode from a list of project names.
    ///
    /// An empty list means the index page, one name a single project,
    /// more than one a multi-project set.
    #[must_use]
    pub fn from_projects(mut projects: Vec<String>) -> Self {
        projects.retain(|p| !p.trim().is_empty());
        match projects.len() {
            0 => Self::Index,
            1 => Self::Single(projects.remove(0)),
            _ => Self::Multi(projects),
        }
    }

    /// Names of the projects this mode observes, empty for the index page.
    #[must_use]
    pub fn project_names(&self) -> Vec<&str> {
        match self {
            Self::Index => Vec::new(),
            Self::Single(name) => vec![name.as_str()],
            Self::Multi(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

/// What is being watched this cycle, resolved to slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackingTarget {
    IndexPage,
    SingleProject(Slot),
    MultiProject(BTreeSet<Slot>),
}

impl TrackingTarget {
    /// Store keys touched by this target, in slot order.
    #[must_use]
    pub fn keys(&self) -> Vec<StatusKey> {
        match self {
            Self::IndexPage => vec![StatusKey::Index],
            Self::SingleProject(slot) => vec![StatusKey::Project(*slot)],
            Self::MultiProject(slots) => slots.iter().copied().map(StatusKey::Project).collect(),
        }
    }
}

/// Classified change between two consecutive known statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    StillBroken,
    Fixed,
    Broken,
    StillWorking,
}

impl Transition {
    /// Returns true for edges, the only transitions that notify.
    #[must_use]
    pub fn is_edge(self) -> bool {
        matches!(self, Self::Fixed | Self::Broken)
    }
}

/// Icon shown by the tray collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IconState {
    Unknown,
    Ok,
    Broken,
}

impl From<BuildStatus> for IconState {
    fn from(status: BuildStatus) -> Self {
        match status {
            BuildStatus::Unknown => Self::Unknown,
            BuildStatus::Ok => Self::Ok,
            BuildStatus::Broken => Self::Broken,
        }
    }
}

/// Externally visible result of a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrayState {
    pub icon: IconState,
    pub tooltip: String,
}

/// A user-visible build event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Display name of the target (project name or index label).
    pub target: String,
    pub transition: Transition,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    #[must_use]
    pub fn new(target: impl Into<String>, transition: Transition) -> Self {
        Self {
            target: target.into(),
            transition,
            timestamp: Utc::now(),
        }
    }

    /// Human-readable message for pop-up presentation.
    #[must_use]
    pub fn message(&self) -> String {
        let what = match self.transition {
            Transition::Fixed => "Build has been fixed",
            Transition::Broken => "Build has been broken",
            Transition::StillBroken => "Build is still broken",
            Transition::StillWorking => "Build is still working",
        };
        format!("Project {}: {}", self.target, what)
    }
}
