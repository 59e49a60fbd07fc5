//! Classification of status changes between cycles.
//!
//! | previous | current | transition | notifies |
//! |----------|---------|------------|----------|
//! | Broken   | Broken  | StillBroken | no |
//! | Broken   | Ok      | Fixed       | yes |
//! | Ok       | Broken  | Broken      | yes |
//! | Ok       | Ok      | StillWorking | no |
//! | Unknown  | any     | none        | no |
//! | any      | Unknown | none        | no |
//!
//! A current status of `Unknown` means the fetch failed, so the cycle has
//! nothing to compare for that target.

use crate::types::{BuildStatus, Notification, Transition};

/// Classifies the change from `previous` to `current`.
///
/// Returns `None` when either side is `Unknown`.
#[must_use]
pub fn classify(previous: BuildStatus, current: BuildStatus) -> Option<Transition> {
    match (previous, current) {
        (BuildStatus::Broken, BuildStatus::Broken) => Some(Transition::StillBroken),
        (BuildStatus::Broken, BuildStatus::Ok) => Some(Transition::Fixed),
        (BuildStatus::Ok, BuildStatus::Broken) => Some(Transition::Broken),
        (BuildStatus::Ok, BuildStatus::Ok) => Some(Transition::StillWorking),
        (BuildStatus::Unknown, _) | (_, BuildStatus::Unknown) => None,
    }
}

/// The notification to emit for a transition, if any.
///
/// Steady states are suppressed; only edges reach the user.
#[must_use]
pub fn notification_for(target: &str, transition: Transition) -> Option<Notification> {
    transition
        .is_edge()
        .then(|| Notification::new(target, transition))
}
