//! CCTray Monitor - CI build status poller.
//!
//! This binary polls a CruiseControl server and reports build status
//! changes on the console.
//!
//! # Commands
//!
//! - `cctray-monitor run`: Poll until interrupted
//! - `cctray-monitor check`: Run a single poll cycle and print the result
//! - `cctray-monitor projects`: List projects known to the management endpoint
//! - `cctray-monitor build <project>`: Trigger a build through the management endpoint
//!
//! # Environment Variables
//!
//! See the [`config`](cctray_monitor::config) module for available
//! configuration options.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use cctray_monitor::config::{split_project_list, ManagementConfig, PollConfiguration};
use cctray_monitor::monitor::Monitor;
use cctray_monitor::scheduler::PollScheduler;
#[cfg(unix)]
use cctray_monitor::scheduler::SchedulerHandle;
use cctray_monitor::settings::Settings;
use cctray_monitor::sink::LogSink;
use cctray_monitor::types::{IconState, TrackingMode};

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT_SECS: u64 = 5;

/// CCTray Monitor - CI build status poller.
///
/// Polls a CruiseControl web application and reports when builds break
/// or get fixed.
#[derive(Parser, Debug)]
#[command(name = "cctray-monitor")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    CCTRAY_URL                 Index or project page URL
    CCTRAY_FAIL_STRING         Failure marker on the index page (default: failed)
    CCTRAY_PROJECT_FAIL_STRING Failure marker on project pages (default: BUILD FAILED)
    CCTRAY_REFRESH_SECS        Seconds between polls (default: 60, minimum: 20)
    CCTRAY_QUIET               Disable notifications
    CCTRAY_REMOTE_PORT         Management port (enables discovery and remote builds)
    CCTRAY_PROJECTS            Colon-separated projects to track
    CCTRAY_WEB_USER            Status page username (with CCTRAY_WEB_PASSWORD)
    CCTRAY_JMX_USER            Management username (with CCTRAY_JMX_PASSWORD)

EXAMPLES:
    # Watch the index page of a local server
    cctray-monitor run -u http://localhost:8080/cruisecontrol

    # Watch two projects, discovering them through the management port
    cctray-monitor run -p 8000 --projects core:web

    # One-shot status check for scripts
    cctray-monitor check --json
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Poll the CI server until interrupted.
    ///
    /// Send SIGUSR1 to force an immediate poll.
    Run(ConfigArgs),

    /// Run a single poll cycle and print the tray state.
    Check {
        #[command(flatten)]
        config: ConfigArgs,

        /// Print the tray state as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List projects known to the management endpoint.
    Projects(ConfigArgs),

    /// Trigger a build through the management endpoint.
    Build {
        /// Name of the project to build.
        project: String,

        #[command(flatten)]
        config: ConfigArgs,
    },
}

/// Options shared by every command. They override the settings file and
/// environment variables.
#[derive(Args, Debug, Default, Clone)]
struct ConfigArgs {
    /// URL of the CruiseControl web page, including http://.
    #[arg(short, long)]
    url: Option<String>,

    /// CruiseControl management port (enables project discovery).
    #[arg(short = 'p', long)]
    remote_port: Option<u16>,

    /// Do not notify on status changes.
    #[arg(short, long)]
    quiet: bool,

    /// Seconds to wait between polls.
    #[arg(short, long = "delay", value_name = "SECS")]
    delay: Option<u64>,

    /// Text whose presence on the page means a build is broken.
    #[arg(short = 'b', long)]
    fail_string: Option<String>,

    /// Colon-separated list of projects to track.
    #[arg(long)]
    projects: Option<String>,

    /// Settings file to load (default: platform config dir).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Save the settings file on exit.
    #[arg(short, long)]
    save: bool,
}

impl ConfigArgs {
    fn apply(&self, config: &mut PollConfiguration) {
        if let Some(url) = &self.url {
            config.url.clone_from(url);
            config.mode = PollConfiguration::mode_from_url(url);
        }

        if let Some(projects) = &self.projects {
            config.mode = TrackingMode::from_projects(split_project_list(projects));
        }

        if let Some(port) = self.remote_port {
            let credentials = config.management.take().and_then(|m| m.credentials);
            config.management = Some(ManagementConfig { port, credentials });
        }

        if self.quiet {
            config.show_notifications = false;
        }

        if let Some(secs) = self.delay {
            config.interval = Duration::from_secs(secs);
        }

        if let Some(marker) = &self.fail_string {
            match config.mode {
                TrackingMode::Index => config.failure_marker.clone_from(marker),
                _ => config.project_marker.clone_from(marker),
            }
        }

        if self.save {
            config.save_on_exit = true;
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    init_logging();

    runtime.block_on(async move {
        match cli.command {
            Command::Run(args) => run_monitor(args).await,
            Command::Check { config, json } => run_check(config, json).await,
            Command::Projects(args) => run_projects(args).await,
            Command::Build { project, config } => run_build(project, config).await,
        }
    })
}

/// Assembles the configuration: defaults, settings file, environment, flags.
///
/// Returns the configuration and the settings file path it maps to.
fn load_configuration(args: &ConfigArgs) -> Result<(PollConfiguration, PathBuf)> {
    let path = match &args.config {
        Some(path) => path.clone(),
        None => Settings::default_path().context("Failed to determine settings file location")?,
    };

    let base = if path.exists() {
        Settings::load(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?
            .to_config()
    } else if args.config.is_some() {
        bail!("Settings file not found: {}", path.display());
    } else {
        debug!(path = %path.display(), "No settings file, using defaults");
        PollConfiguration::default()
    };

    let mut config = base
        .with_env()
        .context("Failed to read configuration from environment")?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    Ok((config, path))
}

/// Runs the polling daemon.
async fn run_monitor(args: ConfigArgs) -> Result<()> {
    info!("Starting CCTray Monitor");

    let (config, settings_path) = load_configuration(&args)?;
    info!(
        url = %config.url,
        interval_secs = config.interval.as_secs(),
        mode = ?config.mode,
        remote = config.management.is_some(),
        "Configuration loaded"
    );

    let monitor = Monitor::from_config(config, Arc::new(LogSink::new()))
        .context("Failed to create monitor")?;
    let (handle, mut task) = PollScheduler::new(monitor).spawn();

    handle.refresh().await.context("Initial poll failed")?;

    #[cfg(unix)]
    spawn_refresh_listener(handle.clone())?;

    info!("Monitor running. Press Ctrl+C to stop.");

    tokio::select! {
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received");
        }
        result = &mut task => {
            result.context("Scheduler task failed")?;
            bail!("Scheduler stopped unexpectedly");
        }
    }

    info!("Shutting down...");
    handle.shutdown().await.context("Failed to stop scheduler")?;
    let monitor = tokio::time::timeout(Duration::from_secs(SHUTDOWN_TIMEOUT_SECS), task)
        .await
        .context("Timed out waiting for the current poll to finish")?
        .context("Scheduler task failed")?;

    if monitor.config().save_on_exit {
        Settings::from_config(monitor.config())
            .save(&settings_path)
            .with_context(|| format!("Failed to save settings to {}", settings_path.display()))?;
    }

    info!("Monitor stopped");
    Ok(())
}

/// Runs one cycle and prints the tray state.
async fn run_check(args: ConfigArgs, json: bool) -> Result<()> {
    let (config, _) = load_configuration(&args)?;
    let mut monitor = Monitor::from_config(config, Arc::new(LogSink::new()))
        .context("Failed to create monitor")?;

    let report = monitor.run_cycle().await;

    if json {
        let output =
            serde_json::to_string_pretty(&report.tray).context("Failed to encode tray state")?;
        println!("{output}");
    } else {
        let label = match report.tray.icon {
            IconState::Ok => "OK",
            IconState::Broken => "BROKEN",
            IconState::Unknown => "UNKNOWN",
        };
        println!("{label}: {}", report.tray.tooltip.replace('\n', " "));
    }

    for signal in &report.errors {
        eprintln!("Error: {}", signal.message());
    }

    Ok(())
}

/// Lists the projects reported by the management endpoint.
async fn run_projects(args: ConfigArgs) -> Result<()> {
    let (config, _) = load_configuration(&args)?;
    let mut monitor = Monitor::from_config(config, Arc::new(LogSink::new()))
        .context("Failed to create monitor")?;

    let projects = monitor.discover().await.context("Project discovery failed")?;
    if projects.is_empty() {
        eprintln!("No projects found in the management listing.");
    }
    for project in projects {
        println!("{}\t{}", project.slot, project.name);
    }

    Ok(())
}

/// Triggers a build of one project.
async fn run_build(project: String, args: ConfigArgs) -> Result<()> {
    let (config, _) = load_configuration(&args)?;
    let monitor = Monitor::from_config(config, Arc::new(LogSink::new()))
        .context("Failed to create monitor")?;

    monitor
        .trigger_build(&project)
        .await
        .with_context(|| format!("Failed to trigger a build of '{project}'"))?;
    println!("Build of '{project}' requested.");

    Ok(())
}

/// Initializes the tracing subscriber with environment filter.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .init();
}

/// Forces a poll on every SIGUSR1.
#[cfg(unix)]
fn spawn_refresh_listener(handle: SchedulerHandle) -> Result<()> {
    let mut refresh = signal::unix::signal(signal::unix::SignalKind::user_defined1())
        .context("Failed to install SIGUSR1 handler")?;

    tokio::spawn(async move {
        while refresh.recv().await.is_some() {
            info!("Refresh requested");
            if let Err(e) = handle.refresh().await {
                warn!(error = %e, "Refresh failed");
                break;
            }
        }
    });

    Ok(())
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
