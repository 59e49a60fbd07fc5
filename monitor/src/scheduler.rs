//! Recurring poll timer.
//!
//! The scheduler is a single tokio task that owns the [`Monitor`]. Timer
//! firings and commands from [`SchedulerHandle`]s are handled one at a time
//! in the same loop, so a cycle can never start while another is running.
//!
//! The timer is one optional deadline:
//!
//! - [`PollScheduler::stop`] clears it.
//! - [`PollScheduler::start`] arms it one interval from now.
//! - [`PollScheduler::run_once`] clears it, runs a cycle, and re-arms it
//!   afterwards whatever the cycle reported.
//!
//! A UI that opens a blocking dialog brackets it with
//! [`SchedulerHandle::stop`] and [`SchedulerHandle::resume`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cctray_monitor::config::PollConfiguration;
//! use cctray_monitor::monitor::Monitor;
//! use cctray_monitor::scheduler::PollScheduler;
//! use cctray_monitor::sink::LogSink;
//!
//! # async fn example() -> cctray_monitor::error::Result<()> {
//! let config = PollConfiguration::from_env()?;
//! let monitor = Monitor::from_config(config, Arc::new(LogSink::new()))?;
//! let (handle, task) = PollScheduler::new(monitor).spawn();
//!
//! handle.refresh().await?;
//! handle.shutdown().await?;
//! let _monitor = task.await.expect("scheduler task panicked");
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, PollConfiguration};
use crate::error::{MonitorError, Result};
use crate::monitor::{CycleReport, Monitor};
use crate::types::TrackingMode;

/// Capacity of the command channel.
const COMMAND_BUFFER: usize = 32;

/// Requests handled by the scheduler task between cycles.
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Run a cycle now.
    Refresh {
        reply: oneshot::Sender<CycleReport>,
    },
    /// Pause the timer.
    Stop,
    /// Arm the timer, optionally with a new interval.
    Start(Option<Duration>),
    /// Change the tracking mode and run a cycle now.
    Track {
        mode: TrackingMode,
        reply: oneshot::Sender<CycleReport>,
    },
    /// Replace the configuration.
    Reconfigure {
        config: Box<PollConfiguration>,
        reply: oneshot::Sender<std::result::Result<(), ConfigError>>,
    },
    /// Ask the CI server to build a project.
    Build {
        project: String,
        reply: oneshot::Sender<Result<()>>,
    },
    /// End the task.
    Shutdown,
}

/// Owner of the poll timer and the monitor it drives.
pub struct PollScheduler {
    monitor: Monitor,
    interval: Duration,
    deadline: Option<Instant>,
}

impl PollScheduler {
    /// Creates a stopped scheduler using the configured interval.
    #[must_use]
    pub fn new(monitor: Monitor) -> Self {
        let interval = monitor.config().interval;
        Self {
            monitor,
            interval,
            deadline: None,
        }
    }

    #[must_use]
    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// When the timer fires next, or `None` while stopped.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.deadline.is_some()
    }

    /// Arms the timer to fire `interval` from now.
    pub fn start(&mut self, interval: Duration) {
        self.interval = interval;
        self.deadline = Some(Instant::now() + interval);
        debug!(interval_secs = interval.as_secs(), "Poll timer started");
    }

    /// Disarms the timer.
    pub fn stop(&mut self) {
        if self.deadline.take().is_some() {
            debug!("Poll timer stopped");
        }
    }

    /// Runs one cycle with the timer stopped, then restarts it.
    pub async fn run_once(&mut self) -> CycleReport {
        self.stop();
        let report = self.monitor.run_cycle().await;
        self.start(self.interval);
        report
    }

    /// Moves the scheduler onto its own task.
    ///
    /// The task ends on [`SchedulerHandle::shutdown`] or when every handle
    /// is dropped, and yields the monitor back.
    #[must_use]
    pub fn spawn(self) -> (SchedulerHandle, JoinHandle<Monitor>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let task = tokio::spawn(self.run(rx));
        (SchedulerHandle { tx }, task)
    }

    /// Runs the timer and command loop until shutdown.
    pub async fn run(mut self, mut commands: mpsc::Receiver<SchedulerCommand>) -> Monitor {
        info!(interval_secs = self.interval.as_secs(), "Scheduler running");

        loop {
            tokio::select! {
                () = wait_for(self.deadline) => {
                    debug!("Poll timer fired");
                    self.run_once().await;
                }
                command = commands.recv() => {
                    match command {
                        None | Some(SchedulerCommand::Shutdown) => break,
                        Some(command) => self.handle(command).await,
                    }
                }
            }
        }

        info!("Scheduler stopped");
        self.monitor
    }

    async fn handle(&mut self, command: SchedulerCommand) {
        match command {
            SchedulerCommand::Refresh { reply } => {
                let report = self.run_once().await;
                let _ = reply.send(report);
            }
            SchedulerCommand::Stop => {
                self.stop();
                info!("Polling paused");
            }
            SchedulerCommand::Start(interval) => {
                self.start(interval.unwrap_or(self.interval));
                info!(interval_secs = self.interval.as_secs(), "Polling resumed");
            }
            SchedulerCommand::Track { mode, reply } => {
                self.monitor.set_mode(mode);
                let report = self.run_once().await;
                let _ = reply.send(report);
            }
            SchedulerCommand::Reconfigure { config, reply } => {
                let interval = config.interval;
                let result = self.monitor.apply_config(*config);
                match &result {
                    Ok(()) => {
                        self.interval = interval;
                        if self.is_running() {
                            self.start(interval);
                        }
                        info!(interval_secs = interval.as_secs(), "Configuration applied");
                    }
                    Err(e) => warn!(error = %e, "Rejected configuration"),
                }
                let _ = reply.send(result);
            }
            SchedulerCommand::Build { project, reply } => {
                let _ = reply.send(self.monitor.trigger_build(&project).await);
            }
            SchedulerCommand::Shutdown => {}
        }
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Cloneable control surface for a spawned scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Runs a cycle now and waits for its report.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::SchedulerStopped` if the task has ended.
    pub async fn refresh(&self) -> Result<CycleReport> {
        let (reply, rx) = oneshot::channel();
        self.send(SchedulerCommand::Refresh { reply }).await?;
        rx.await.map_err(|_| MonitorError::SchedulerStopped)
    }

    /// Pauses polling until [`resume`](Self::resume) or [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::SchedulerStopped` if the task has ended.
    pub async fn stop(&self) -> Result<()> {
        self.send(SchedulerCommand::Stop).await
    }

    /// Re-arms the timer with a new interval.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::SchedulerStopped` if the task has ended.
    pub async fn start(&self, interval: Duration) -> Result<()> {
        self.send(SchedulerCommand::Start(Some(interval))).await
    }

    /// Re-arms the timer with the current interval.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::SchedulerStopped` if the task has ended.
    pub async fn resume(&self) -> Result<()> {
        self.send(SchedulerCommand::Start(None)).await
    }

    /// Switches the tracking mode and runs a cycle for it.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::SchedulerStopped` if the task has ended.
    pub async fn track(&self, mode: TrackingMode) -> Result<CycleReport> {
        let (reply, rx) = oneshot::channel();
        self.send(SchedulerCommand::Track { mode, reply }).await?;
        rx.await.map_err(|_| MonitorError::SchedulerStopped)
    }

    /// Replaces the configuration between cycles.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Config` if the configuration is rejected, or
    /// `MonitorError::SchedulerStopped` if the task has ended.
    pub async fn reconfigure(&self, config: PollConfiguration) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(SchedulerCommand::Reconfigure {
            config: Box::new(config),
            reply,
        })
        .await?;
        rx.await.map_err(|_| MonitorError::SchedulerStopped)??;
        Ok(())
    }

    /// Asks the CI server to build `project`.
    ///
    /// # Errors
    ///
    /// Returns the error from [`Monitor::trigger_build`], or
    /// `MonitorError::SchedulerStopped` if the task has ended.
    pub async fn trigger_build(&self, project: impl Into<String>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(SchedulerCommand::Build {
            project: project.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| MonitorError::SchedulerStopped)?
    }

    /// Ends the scheduler task.
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::SchedulerStopped` if the task has already ended.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(SchedulerCommand::Shutdown).await
    }

    async fn send(&self, command: SchedulerCommand) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| MonitorError::SchedulerStopped)
    }
}
