//! Output side of a poll cycle.
//!
//! The tray icon, pop-up notifications and error dialogs live outside this
//! crate. They receive cycle results through [`StatusSink`]. [`LogSink`] is
//! the headless implementation used by the CLI: tray updates become log
//! lines and notifications are printed to stdout.

use std::sync::Mutex;

use tracing::{debug, error, info};

use crate::error::ErrorSignal;
use crate::types::{IconState, Notification, Project, TrayState};

/// Receiver of everything a cycle produces.
pub trait StatusSink: Send + Sync {
    /// Called once per cycle with the rendered icon and tooltip.
    fn update_tray(&self, state: &TrayState);

    /// Called for each edge transition while notifications are enabled.
    fn notify(&self, notification: &Notification);

    /// Called when an error must be shown to the user.
    fn report_error(&self, signal: &ErrorSignal);

    /// Called after discovery with the project list in slot order.
    fn projects_discovered(&self, _projects: &[Project]) {}
}

/// Sink that writes to the tracing subscriber and stdout.
///
/// Tray updates are only logged at info level when the icon changes.
#[derive(Debug, Default)]
pub struct LogSink {
    last_icon: Mutex<Option<IconState>>,
}

impl LogSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatusSink for LogSink {
    fn update_tray(&self, state: &TrayState) {
        let changed = match self.last_icon.lock() {
            Ok(mut last) => last.replace(state.icon) != Some(state.icon),
            Err(_) => true,
        };

        let tooltip = state.tooltip.replace('\n', " ");
        if changed {
            info!(icon = ?state.icon, tooltip = %tooltip, "Tray icon changed");
        } else {
            debug!(icon = ?state.icon, tooltip = %tooltip, "Tray icon refreshed");
        }
    }

    fn notify(&self, notification: &Notification) {
        println!(
            "[{}] {}",
            notification.timestamp.format("%Y-%m-%d %H:%M:%S"),
            notification.message()
        );
    }

    fn report_error(&self, signal: &ErrorSignal) {
        error!(signal = ?signal, "{}", signal.message().replace('\n', " "));
    }

    fn projects_discovered(&self, projects: &[Project]) {
        let names: Vec<&str> = projects.iter().map(|p| p.name.as_str()).collect();
        info!(count = projects.len(), projects = ?names, "Projects discovered");
    }
}
