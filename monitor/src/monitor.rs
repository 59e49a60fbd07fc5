//! One poll cycle from discovery to tray update.
//!
//! [`Monitor`] owns everything a cycle reads or writes: the configuration
//! snapshot, the project directory and the status store. It is driven by
//! the scheduler, which guarantees that at most one [`Monitor::run_cycle`]
//! is in progress at a time, so none of this state needs locking.
//!
//! A cycle runs these steps:
//!
//! 1. Populate the project directory, from the management endpoint when
//!    remote management is enabled, otherwise from the configured names.
//! 2. Resolve the tracking mode to a [`TrackingTarget`].
//! 3. For each target key: fetch, record, classify and notify on edges.
//! 4. Commit the store and hand the rendered [`TrayState`] to the sink.
//!
//! No step propagates an error out of the cycle. Network failures degrade
//! the affected target to `Unknown`; everything else becomes an
//! [`ErrorSignal`] for the sink.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, PollConfiguration};
use crate::directory::{DirectoryError, ProjectDirectory};
use crate::error::{ErrorSignal, MonitorError, Result};
use crate::fetcher::{FetchRequest, HttpStatusFetcher, StatusFetcher};
use crate::management::{ManagementApi, ManagementClient, ManagementError};
use crate::presenter::{self, ProjectView, View};
use crate::sink::StatusSink;
use crate::store::StatusStore;
use crate::transition;
use crate::types::{
    BuildStatus, Notification, Project, StatusKey, TrackingMode, TrackingTarget, Transition,
    TrayState,
};

/// What happened to one target during a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOutcome {
    pub key: StatusKey,
    /// Project name or index label.
    pub label: String,
    pub previous: BuildStatus,
    pub current: BuildStatus,
    pub transition: Option<Transition>,
}

/// Everything a cycle produced, in addition to what was sent to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub tray: TrayState,
    pub outcomes: Vec<TargetOutcome>,
    /// Notifications delivered to the sink.
    pub notifications: Vec<Notification>,
    /// Error signals delivered to the sink.
    pub errors: Vec<ErrorSignal>,
}

impl CycleReport {
    /// Transitions observed this cycle, in target order.
    #[must_use]
    pub fn transitions(&self) -> Vec<Transition> {
        self.outcomes.iter().filter_map(|o| o.transition).collect()
    }
}

/// The poll-cycle engine.
pub struct Monitor {
    config: PollConfiguration,
    directory: ProjectDirectory,
    store: StatusStore,
    fetcher: Arc<dyn StatusFetcher>,
    management: Option<Arc<dyn ManagementApi>>,
    remote_enabled: bool,
    sink: Arc<dyn StatusSink>,
    failed_names: Vec<String>,
    /// Discovery or resolution problem already shown to the user.
    standing_error: Option<ErrorSignal>,
}

impl Monitor {
    /// Creates a monitor from its collaborators.
    ///
    /// Remote management is enabled when both a management client is given
    /// and the configuration has a management section.
    #[must_use]
    pub fn new(
        config: PollConfiguration,
        fetcher: Arc<dyn StatusFetcher>,
        management: Option<Arc<dyn ManagementApi>>,
        sink: Arc<dyn StatusSink>,
    ) -> Self {
        let remote_enabled = management.is_some() && config.management.is_some();
        Self {
            config,
            directory: ProjectDirectory::new(),
            store: StatusStore::new(),
            fetcher,
            management,
            remote_enabled,
            sink,
            failed_names: Vec::new(),
            standing_error: None,
        }
    }

    /// Creates a monitor talking HTTP to the configured CI server.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Config` if the management URL cannot be derived.
    pub fn from_config(config: PollConfiguration, sink: Arc<dyn StatusSink>) -> Result<Self> {
        let management = management_client(&config)?;
        Ok(Self::new(
            config,
            Arc::new(HttpStatusFetcher::new()),
            management,
            sink,
        ))
    }

    #[must_use]
    pub fn config(&self) -> &PollConfiguration {
        &self.config
    }

    #[must_use]
    pub fn directory(&self) -> &ProjectDirectory {
        &self.directory
    }

    #[must_use]
    pub fn store(&self) -> &StatusStore {
        &self.store
    }

    /// Whether discovery and remote builds are currently available.
    #[must_use]
    pub fn remote_enabled(&self) -> bool {
        self.remote_enabled
    }

    /// Runs one complete poll cycle.
    pub async fn run_cycle(&mut self) -> CycleReport {
        debug!(mode = ?self.config.mode, "Starting poll cycle");

        let mut errors = Vec::new();
        let mut standing = None;
        let directory_ready = self.prepare_directory(&mut errors, &mut standing).await;

        let mut outcomes = Vec::new();
        let mut notifications = Vec::new();

        match self.resolve_target() {
            Ok(target) => {
                for key in target.keys() {
                    let outcome = self.poll_target(key, &mut errors).await;
                    if let Some(notification) = self.edge_notification(&outcome) {
                        notifications.push(notification);
                    }
                    outcomes.push(outcome);
                }
            }
            Err(err) if directory_ready => {
                warn!(error = %err, "Tracked project is not in the project directory");
                self.raise_standing(ErrorSignal::from(&err), &mut errors, &mut standing);
            }
            Err(err) => {
                debug!(error = %err, "Project directory unavailable, skipping project targets");
            }
        }

        self.standing_error = standing;
        self.store.commit();

        let tray = self.render();
        self.sink.update_tray(&tray);

        CycleReport {
            tray,
            outcomes,
            notifications,
            errors,
        }
    }

    /// Switches what is observed. Takes effect from the next cycle.
    pub fn set_mode(&mut self, mode: TrackingMode) {
        info!(mode = ?mode, "Tracking mode changed");
        if mode != TrackingMode::Index {
            self.failed_names.clear();
        }
        self.config.mode = mode;
        self.standing_error = None;
    }

    /// Replaces the configuration between cycles.
    ///
    /// The project directory is rebuilt when remote management is turned
    /// back on, or when its address or credentials change.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the new configuration is invalid; the
    /// current configuration is kept in that case.
    pub fn apply_config(&mut self, config: PollConfiguration) -> std::result::Result<(), ConfigError> {
        config.validate()?;

        let new_base = config.management_base()?;
        let old_base = self.config.management_base().ok().flatten();
        let old_credentials = self.config.management.as_ref().and_then(|m| m.credentials.clone());
        let new_credentials = config.management.as_ref().and_then(|m| m.credentials.clone());

        let mut rebuild = false;
        match new_base {
            None => {
                self.management = None;
                self.remote_enabled = false;
            }
            Some(base) => {
                if self.management.is_none()
                    || old_base.as_deref() != Some(base.as_str())
                    || old_credentials != new_credentials
                {
                    self.management = Some(Arc::new(ManagementClient::new(base, new_credentials)));
                    rebuild = true;
                }
                if !self.remote_enabled {
                    rebuild = true;
                }
                self.remote_enabled = true;
            }
        }

        if rebuild {
            info!("Remote management enabled, project directory will be rebuilt");
            self.directory.clear();
            self.store.reset_projects();
        }

        if config.mode != TrackingMode::Index {
            self.failed_names.clear();
        }
        self.config = config;
        self.standing_error = None;
        Ok(())
    }

    /// Discovers projects now, outside a cycle.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::RemoteDisabled` when remote management is off,
    /// or the `ManagementError` from the listing request.
    pub async fn discover(&mut self) -> Result<Vec<Project>> {
        let api = self.remote_api().ok_or(MonitorError::RemoteDisabled)?;
        match self
            .directory
            .discover(api.as_ref())
            .await
            .map(<[Project]>::to_vec)
        {
            Ok(projects) => {
                if !projects.is_empty() {
                    self.sink.projects_discovered(&projects);
                }
                Ok(projects)
            }
            Err(err) => {
                if matches!(err, ManagementError::RemoteUnavailable { .. }) {
                    self.remote_enabled = false;
                }
                Err(err.into())
            }
        }
    }

    /// Asks the CI server to build `project` now.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::RemoteDisabled` when remote management is off,
    /// `MonitorError::Directory` when discovery ran and did not list the
    /// project, or the `ManagementError` from the request.
    pub async fn trigger_build(&self, project: &str) -> Result<()> {
        let api = self.remote_api().ok_or(MonitorError::RemoteDisabled)?;
        if self.directory.is_populated() {
            self.directory.slot_of(project)?;
        }
        api.trigger_build(project).await?;
        Ok(())
    }

    fn remote_api(&self) -> Option<Arc<dyn ManagementApi>> {
        if self.remote_enabled {
            self.management.clone()
        } else {
            None
        }
    }

    /// Returns false when project targets cannot be resolved this cycle.
    async fn prepare_directory(
        &mut self,
        errors: &mut Vec<ErrorSignal>,
        standing: &mut Option<ErrorSignal>,
    ) -> bool {
        let Some(api) = self.remote_api() else {
            self.seed_directory();
            return true;
        };

        if self.directory.is_populated() {
            return true;
        }

        let discovered = self
            .directory
            .discover(api.as_ref())
            .await
            .map(<[Project]>::to_vec);

        match discovered {
            Ok(projects) if projects.is_empty() => {
                warn!("Management listing contained no projects, disabling remote management");
                self.remote_enabled = false;
                self.raise(
                    ErrorSignal::InternalFailure("no projects found in management listing".to_string()),
                    errors,
                );
                self.seed_directory();
                true
            }
            Ok(projects) => {
                self.sink.projects_discovered(&projects);
                true
            }
            Err(err @ ManagementError::RemoteUnavailable { .. }) => {
                error!(error = %err, "Management endpoint unreachable, disabling remote management");
                self.remote_enabled = false;
                self.raise(ErrorSignal::from(&err), errors);
                self.seed_directory();
                true
            }
            Err(err) => {
                error!(error = %err, "Project discovery failed");
                self.raise_standing(ErrorSignal::from(&err), errors, standing);
                false
            }
        }
    }

    fn seed_directory(&mut self) {
        for name in self.config.mode.project_names() {
            self.directory.insert(name.to_string());
        }
    }

    fn resolve_target(&self) -> std::result::Result<TrackingTarget, DirectoryError> {
        match &self.config.mode {
            TrackingMode::Index => Ok(TrackingTarget::IndexPage),
            TrackingMode::Single(name) => {
                Ok(TrackingTarget::SingleProject(self.directory.slot_of(name)?))
            }
            TrackingMode::Multi(names) => names
                .iter()
                .map(|name| self.directory.slot_of(name))
                .collect::<std::result::Result<BTreeSet<_>, _>>()
                .map(TrackingTarget::MultiProject),
        }
    }

    async fn poll_target(&mut self, key: StatusKey, errors: &mut Vec<ErrorSignal>) -> TargetOutcome {
        let previous = self.store.previous(key);

        let current = match self.request_for(key) {
            Ok(request) => match self.fetcher.fetch(&request).await {
                Ok(page) => {
                    if key == StatusKey::Index {
                        self.failed_names = page.failed_names.clone();
                    }
                    page.status()
                }
                Err(err) => {
                    warn!(url = %request.url, error = %err, "Status fetch failed");
                    if key == StatusKey::Index {
                        self.failed_names.clear();
                    }
                    BuildStatus::Unknown
                }
            },
            Err(err) => {
                error!(key = ?key, error = %err, "Cannot build status request");
                self.raise(ErrorSignal::InternalFailure(err.to_string()), errors);
                BuildStatus::Unknown
            }
        };

        self.store.record(key, current);

        TargetOutcome {
            key,
            label: self.label_for(key),
            previous,
            current,
            transition: transition::classify(previous, current),
        }
    }

    fn request_for(&self, key: StatusKey) -> Result<FetchRequest> {
        let credentials = self.config.web_credentials.clone();
        let request = match key {
            StatusKey::Index => FetchRequest {
                url: self.index_page_url()?,
                marker: self.config.failure_marker.clone(),
                credentials,
                extract_failures: true,
            },
            StatusKey::Project(slot) => FetchRequest {
                url: self.config.project_url(self.directory.name_of(slot)?)?,
                marker: self.config.project_marker.clone(),
                credentials,
                extract_failures: false,
            },
        };
        Ok(request)
    }

    /// The configured URL when it already is an index page, else the
    /// index URL derived from it.
    fn index_page_url(&self) -> std::result::Result<String, ConfigError> {
        if PollConfiguration::mode_from_url(&self.config.url) == TrackingMode::Index {
            Ok(self.config.url.clone())
        } else {
            self.config.index_url()
        }
    }

    fn label_for(&self, key: StatusKey) -> String {
        match key {
            StatusKey::Index => presenter::index_label(&self.failed_names),
            StatusKey::Project(slot) => self
                .directory
                .name_of(slot)
                .map_or_else(|_| slot.to_string(), str::to_string),
        }
    }

    fn edge_notification(&self, outcome: &TargetOutcome) -> Option<Notification> {
        let notification = transition::notification_for(&outcome.label, outcome.transition?)?;
        info!(
            target_name = %outcome.label,
            transition = ?notification.transition,
            "Build status changed"
        );

        if !self.config.show_notifications {
            debug!("Notifications disabled, not notifying");
            return None;
        }

        self.sink.notify(&notification);
        Some(notification)
    }

    fn status_of(&self, name: &str) -> BuildStatus {
        self.directory
            .slot_of(name)
            .map(|slot| self.store.previous(StatusKey::Project(slot)))
            .unwrap_or_default()
    }

    fn render(&self) -> TrayState {
        let view = match &self.config.mode {
            TrackingMode::Index => View::Index {
                status: self.store.previous(StatusKey::Index),
                failed_names: &self.failed_names,
            },
            TrackingMode::Single(name) => View::Single(ProjectView {
                name,
                status: self.status_of(name),
            }),
            TrackingMode::Multi(names) => View::Multi(
                names
                    .iter()
                    .map(|name| ProjectView {
                        name,
                        status: self.status_of(name),
                    })
                    .collect(),
            ),
        };
        presenter::render(&view)
    }

    fn raise(&self, signal: ErrorSignal, errors: &mut Vec<ErrorSignal>) {
        self.sink.report_error(&signal);
        errors.push(signal);
    }

    /// Reports a condition that persists across cycles only when it first
    /// appears.
    fn raise_standing(
        &self,
        signal: ErrorSignal,
        errors: &mut Vec<ErrorSignal>,
        standing: &mut Option<ErrorSignal>,
    ) {
        if self.standing_error.as_ref() != Some(&signal) {
            self.raise(signal.clone(), errors);
        }
        *standing = Some(signal);
    }
}

fn management_client(
    config: &PollConfiguration,
) -> std::result::Result<Option<Arc<dyn ManagementApi>>, ConfigError> {
    let Some(base) = config.management_base()? else {
        return Ok(None);
    };
    let credentials = config.management.as_ref().and_then(|m| m.credentials.clone());
    Ok(Some(Arc::new(ManagementClient::new(base, credentials))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManagementConfig;
    use crate::fetcher::{FetchError, StatusPage};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct PageFetcher {
        pages: Mutex<Vec<(String, String)>>,
        requests: Mutex<Vec<String>>,
    }

    impl PageFetcher {
        fn serve(&self, url: &str, body: &str) {
            let mut pages = self.pages.lock().unwrap();
            pages.retain(|(u, _)| u != url);
            pages.push((url.to_string(), body.to_string()));
        }
    }

    #[async_trait]
    impl StatusFetcher for PageFetcher {
        async fn fetch(&self, request: &FetchRequest) -> std::result::Result<StatusPage, FetchError> {
            self.requests.lock().unwrap().push(request.url.clone());
            let body = self
                .pages
                .lock()
                .unwrap()
                .iter()
                .find(|(u, _)| *u == request.url)
                .map(|(_, b)| b.clone())
                .ok_or_else(|| FetchError::Status {
                    url: request.url.clone(),
                    status: 404,
                })?;
            Ok(StatusPage::scan(body, &request.marker, request.extract_failures))
        }
    }

    #[derive(Default)]
    struct NullSink;

    impl StatusSink for NullSink {
        fn update_tray(&self, _state: &TrayState) {}
        fn notify(&self, _notification: &Notification) {}
        fn report_error(&self, _signal: &ErrorSignal) {}
    }

    const INDEX: &str = "http://ci/cruisecontrol";

    fn config(mode: TrackingMode) -> PollConfiguration {
        PollConfiguration {
            url: INDEX.to_string(),
            mode,
            ..PollConfiguration::default()
        }
    }

    fn monitor(mode: TrackingMode, fetcher: Arc<PageFetcher>) -> Monitor {
        Monitor::new(config(mode), fetcher, None, Arc::new(NullSink))
    }

    #[tokio::test]
    async fn test_project_urls_and_markers() {
        let fetcher = Arc::new(PageFetcher::default());
        fetcher.serve("http://ci/cruisecontrol/buildresults/core", "BUILD FAILED x BUILD FAILED");
        let mut monitor = monitor(TrackingMode::Single("core".to_string()), fetcher.clone());

        let report = monitor.run_cycle().await;
        assert_eq!(report.outcomes[0].current, BuildStatus::Broken);
        assert_eq!(
            *fetcher.requests.lock().unwrap(),
            vec!["http://ci/cruisecontrol/buildresults/core".to_string()]
        );
    }

    #[tokio::test]
    async fn test_index_label_carries_failed_names() {
        let fetcher = Arc::new(PageFetcher::default());
        fetcher.serve(
            INDEX,
            "<tr><a href=\"x\">core</a> failed failed</tr>",
        );
        let mut monitor = monitor(TrackingMode::Index, fetcher);

        let report = monitor.run_cycle().await;
        assert_eq!(report.outcomes[0].label, "INDEX PAGE: [core]");
        assert_eq!(report.tray.tooltip, "Status of\n'INDEX PAGE: [core]'\nis FAILURE");
    }

    #[tokio::test]
    async fn test_set_mode_takes_effect_next_cycle() {
        let fetcher = Arc::new(PageFetcher::default());
        fetcher.serve(INDEX, "all good");
        fetcher.serve("http://ci/cruisecontrol/buildresults/web", "BUILD SUCCESSFUL");
        let mut monitor = monitor(TrackingMode::Index, fetcher);

        monitor.run_cycle().await;
        monitor.set_mode(TrackingMode::Single("web".to_string()));
        let report = monitor.run_cycle().await;

        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].label, "web");
        assert_eq!(report.tray.tooltip, "Status of\n'web'\nis OK");
    }

    #[tokio::test]
    async fn test_trigger_build_requires_remote() {
        let monitor = monitor(TrackingMode::Index, Arc::new(PageFetcher::default()));
        let err = monitor.trigger_build("core").await.unwrap_err();
        assert!(matches!(err, MonitorError::RemoteDisabled));
    }

    #[test]
    fn test_apply_config_rejects_invalid() {
        let mut monitor = monitor(TrackingMode::Index, Arc::new(PageFetcher::default()));
        let mut bad = config(TrackingMode::Index);
        bad.url = "ftp://ci".to_string();

        assert!(monitor.apply_config(bad).is_err());
        assert_eq!(monitor.config().url, INDEX);
    }

    #[test]
    fn test_apply_config_enables_remote() {
        let mut monitor = monitor(TrackingMode::Index, Arc::new(PageFetcher::default()));
        assert!(!monitor.remote_enabled());

        let mut enabled = config(TrackingMode::Index);
        enabled.management = Some(ManagementConfig {
            port: 8000,
            credentials: None,
        });
        monitor.apply_config(enabled).unwrap();
        assert!(monitor.remote_enabled());
    }
}
