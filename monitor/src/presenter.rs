//! Folding per-target statuses into the single tray icon and tooltip.
//!
//! - Index and single-project views show the one target's status.
//! - Multi-project views show `Broken` if any tracked project is broken and
//!   `Ok` otherwise. Projects still `Unknown` do not count toward the icon.
//! - When no tracked project is known yet, such as before the first
//!   successful fetch, the multi-project icon is `Unknown` rather than `Ok`.
//!   This is the same unknown indicator a single target shows before it has
//!   a known status.

use crate::types::{BuildStatus, IconState, TrayState};

/// Display label of the index-page aggregate.
pub const INDEX_LABEL: &str = "INDEX PAGE";

/// Separator between entries of a multi-project tooltip.
pub const MULTI_DELIMITER: char = '|';

/// One tracked project and its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectView<'a> {
    pub name: &'a str,
    pub status: BuildStatus,
}

/// What the presenter renders, per tracking mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View<'a> {
    Index {
        status: BuildStatus,
        failed_names: &'a [String],
    },
    Single(ProjectView<'a>),
    Multi(Vec<ProjectView<'a>>),
}

/// Renders a view into the tray icon state and tooltip text.
#[must_use]
pub fn render(view: &View<'_>) -> TrayState {
    match view {
        View::Index {
            status,
            failed_names,
        } => {
            let label = if *status == BuildStatus::Broken {
                index_label(failed_names)
            } else {
                INDEX_LABEL.to_string()
            };
            single_target(&label, *status)
        }
        View::Single(project) => single_target(project.name, project.status),
        View::Multi(projects) => multi_target(projects),
    }
}

/// Display name of the index page, listing failed projects when known.
#[must_use]
pub fn index_label(failed_names: &[String]) -> String {
    if failed_names.is_empty() {
        return INDEX_LABEL.to_string();
    }
    let names: Vec<String> = failed_names.iter().map(|n| format!("[{n}]")).collect();
    format!("{INDEX_LABEL}: {}", names.join(" "))
}

fn single_target(label: &str, status: BuildStatus) -> TrayState {
    let tooltip = match status {
        BuildStatus::Unknown => format!("Status of '{label}' is UNKNOWN"),
        BuildStatus::Ok => format!("Status of\n'{label}'\nis OK"),
        BuildStatus::Broken => format!("Status of\n'{label}'\nis FAILURE"),
    };
    TrayState {
        icon: status.into(),
        tooltip,
    }
}

fn multi_target(projects: &[ProjectView<'_>]) -> TrayState {
    let any_known = projects.iter().any(|p| p.status.is_known());
    let any_broken = projects.iter().any(|p| p.status == BuildStatus::Broken);

    let icon = if any_broken {
        IconState::Broken
    } else if any_known {
        IconState::Ok
    } else {
        IconState::Unknown
    };

    let mut tooltip = String::from(MULTI_DELIMITER);
    for project in projects {
        let annotation = match project.status {
            BuildStatus::Ok => "Ok",
            BuildStatus::Broken => "Failed",
            BuildStatus::Unknown => "Unknown",
        };
        tooltip.push_str(project.name);
        tooltip.push('=');
        tooltip.push_str(annotation);
        tooltip.push(MULTI_DELIMITER);
    }

    TrayState { icon, tooltip }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(name: &str, status: BuildStatus) -> ProjectView<'_> {
        ProjectView { name, status }
    }

    #[test]
    fn test_multi_any_broken_is_broken() {
        let state = render(&View::Multi(vec![
            project("a", BuildStatus::Ok),
            project("b", BuildStatus::Broken),
            project("c", BuildStatus::Unknown),
        ]));
        assert_eq!(state.icon, IconState::Broken);
        assert_eq!(state.tooltip, "|a=Ok|b=Failed|c=Unknown|");
    }

    #[test]
    fn test_multi_unknown_not_aggregated() {
        let state = render(&View::Multi(vec![
            project("a", BuildStatus::Ok),
            project("b", BuildStatus::Ok),
            project("c", BuildStatus::Unknown),
        ]));
        assert_eq!(state.icon, IconState::Ok);
    }

    #[test]
    fn test_multi_nothing_known_is_unknown() {
        let state = render(&View::Multi(vec![
            project("a", BuildStatus::Unknown),
            project("b", BuildStatus::Unknown),
        ]));
        assert_eq!(state.icon, IconState::Unknown);
    }

    #[test]
    fn test_single_project_tooltips() {
        let ok = render(&View::Single(project("core", BuildStatus::Ok)));
        assert_eq!(ok.icon, IconState::Ok);
        assert_eq!(ok.tooltip, "Status of\n'core'\nis OK");

        let broken = render(&View::Single(project("core", BuildStatus::Broken)));
        assert_eq!(broken.icon, IconState::Broken);
        assert_eq!(broken.tooltip, "Status of\n'core'\nis FAILURE");

        let unknown = render(&View::Single(project("core", BuildStatus::Unknown)));
        assert_eq!(unknown.icon, IconState::Unknown);
        assert_eq!(unknown.tooltip, "Status of 'core' is UNKNOWN");
    }

    #[test]
    fn test_index_lists_failed_names() {
        let failed = vec!["core".to_string(), "docs".to_string()];
        let state = render(&View::Index {
            status: BuildStatus::Broken,
            failed_names: &failed,
        });
        assert_eq!(state.icon, IconState::Broken);
        assert_eq!(state.tooltip, "Status of\n'INDEX PAGE: [core] [docs]'\nis FAILURE");
    }

    #[test]
    fn test_index_ok_has_plain_label() {
        let state = render(&View::Index {
            status: BuildStatus::Ok,
            failed_names: &[],
        });
        assert_eq!(state.tooltip, "Status of\n'INDEX PAGE'\nis OK");
    }
}
