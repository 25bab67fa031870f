//! modwatch - update tracker for mods published on a remote catalog
//!
//! Main entry point for the command line application.
//!
//! # Overview
//!
//! This binary is a thin front end over the [`Tracker`] engine. It initializes:
//! - Logging infrastructure (file rotation, console output when requested)
//! - Tokio async runtime (timer task and catalog requests)
//! - Configuration loading ([`ConfigManager`])
//! - File-backed state storage under `<data-dir>/state`
//!
//! # Commands
//!
//! - `run`: Arm the scheduler and print change notifications until Ctrl-C
//! - `add <ids..>` / `remove <id>` / `reset`: Edit the tracked set
//! - `list` / `history [--mod <id>]`: Inspect stored state
//! - `refresh`: Run one poll cycle now
//! - `configure`: Change tracking settings
//!
//! # Data Directory
//!
//! Defaults to `modwatch-data/`:
//! - `modwatch.yaml`: Catalog endpoint, API token, request gap
//! - `state/`: Tracked mods, history and tracking settings (JSON)
//! - `logs/`: Daily rotating log files

use anyhow::{Context, Result, bail};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use modwatch::metrics::Metrics;
use modwatch::{
    APP_NAME, CatalogClient, ConfigManager, FileStorage, RateLimitedFetcher, RefreshOutcome,
    Tracker, TrackerEvent, TrackerOptions, VERSION,
};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

/// Update tracker for mods published on a remote catalog
#[derive(Parser)]
#[command(name = "modwatch")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Directory holding modwatch.yaml, state and logs
    #[arg(long, global = true, default_value = "modwatch-data")]
    data_dir: Utf8PathBuf,

    /// Verbose logging, mirrored to the console
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll on the configured interval and print updates until Ctrl-C
    Run,

    /// Start tracking one or more mods by id
    Add {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Stop tracking a mod
    Remove { id: String },

    /// Show tracked mods and their last known versions
    List,

    /// Show detected version changes
    History {
        /// Only entries for this mod id
        #[arg(long = "mod")]
        mod_id: Option<String>,
    },

    /// Run one poll cycle now
    Refresh,

    /// Change tracking settings
    Configure {
        #[arg(long)]
        enabled: Option<bool>,

        #[arg(long)]
        notify: Option<bool>,

        /// Polling interval in minutes, 1 to 180
        #[arg(long)]
        interval: Option<i64>,
    },

    /// Stop tracking every mod (history is kept)
    Reset,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_manager = ConfigManager::new(&cli.data_dir)?;
    let console = cli.debug || matches!(cli.command, Commands::Run);
    let _log_guard = modwatch::logging::setup_logging_with_console(
        &config_manager.log_dir(),
        modwatch::logging::LOG_PREFIX,
        cli.debug,
        console,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("modwatch-worker")
        .build()?;

    let app_config = config_manager.load_app_config()?;
    let storage = FileStorage::new(config_manager.state_dir())
        .context("Failed to open state directory")?;

    let metrics = Arc::new(Metrics::new());
    let fetcher = RateLimitedFetcher::from_config(&app_config).with_metrics(Arc::clone(&metrics));
    let options = TrackerOptions {
        history_limit: app_config.history_limit,
        ..TrackerOptions::default()
    };

    let tracker = Arc::new(Tracker::with_metrics(
        CatalogClient::new(fetcher),
        Arc::new(storage),
        options,
        runtime.handle().clone(),
        metrics,
    ));

    let result = runtime.block_on(execute(cli.command, Arc::clone(&tracker)));

    tracker.shutdown();
    runtime.shutdown_timeout(std::time::Duration::from_secs(5));
    tracing::info!("Shutdown complete");

    result
}

async fn execute(command: Commands, tracker: Arc<Tracker<CatalogClient>>) -> Result<()> {
    match command {
        Commands::Run => run(tracker).await,

        Commands::Add { ids } => {
            let report = tracker.add_tracked(&ids).await?;
            for id in &report.added {
                println!("Added {}", id);
            }
            for id in &report.refreshed {
                println!("Already tracked {}", id);
            }
            for id in &report.missing {
                println!("Not found in catalog: {}", id);
            }
            Ok(())
        }

        Commands::Remove { id } => {
            if tracker.remove_tracked(&id)? {
                println!("Removed {}", id);
            } else {
                println!("{} is not tracked", id);
            }
            Ok(())
        }

        Commands::List => {
            let tracked = tracker.tracked();
            if tracked.is_empty() {
                println!("No tracked mods");
            }
            for m in tracked {
                println!(
                    "{:>8}  {}  {} (SPT {})",
                    m.id,
                    m.display_name(),
                    m.package_version.as_deref().unwrap_or("?"),
                    m.compatibility_version.as_deref().unwrap_or("?")
                );
            }
            Ok(())
        }

        Commands::History { mod_id } => {
            let entries = match mod_id {
                Some(id) => tracker.history_for(&id),
                None => tracker.history(),
            };
            if entries.is_empty() {
                println!("No history");
            }
            for entry in entries {
                println!("{}  {}", entry.detected_at.format("%Y-%m-%d %H:%M"), entry.describe());
            }
            Ok(())
        }

        Commands::Refresh => {
            match tracker.refresh_now().await {
                RefreshOutcome::Completed(report) => {
                    println!("{}", report.summary());
                    if report.has_errors() {
                        bail!("{} mods could not be checked", report.errors);
                    }
                }
                RefreshOutcome::AlreadyRunning => println!("A poll cycle is already running"),
            }
            Ok(())
        }

        Commands::Configure {
            enabled,
            notify,
            interval,
        } => configure(&tracker, enabled, notify, interval),

        Commands::Reset => {
            tracker.reset_tracked()?;
            println!("Tracked set cleared");
            Ok(())
        }
    }
}

fn configure(
    tracker: &Tracker<CatalogClient>,
    enabled: Option<bool>,
    notify: Option<bool>,
    interval: Option<i64>,
) -> Result<()> {
    if enabled.is_some() || notify.is_some() {
        let mut settings = tracker.settings();
        if let Some(enabled) = enabled {
            settings.enabled = enabled;
        }
        if let Some(notify) = notify {
            settings.notify_on_change = notify;
        }
        tracker.configure_tracking(settings)?;
    }

    if let Some(requested) = interval {
        let minutes = tracker.set_interval_minutes(requested)?;
        println!("Polling interval stored as {} minute(s)", minutes);
    }

    let settings = tracker.settings();
    println!(
        "enabled={} notify={} interval={}m",
        settings.enabled, settings.notify_on_change, settings.interval_minutes
    );
    Ok(())
}

async fn run(tracker: Arc<Tracker<CatalogClient>>) -> Result<()> {
    let mut events = tracker.subscribe();
    tracker.start();

    let settings = tracker.settings();
    if settings.enabled {
        println!(
            "Watching {} mods every {} minute(s), Ctrl-C to stop",
            tracker.tracked().len(),
            settings.interval_minutes
        );
    } else {
        println!("Tracking is disabled; enable it with `modwatch configure --enabled true`");
    }

    let listener_tracker = Arc::clone(&tracker);
    let listener = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(TrackerEvent::ChangeDetected {
                    name,
                    previous_package_version,
                    new_package_version,
                    ..
                }) => {
                    if listener_tracker.settings().notify_on_change {
                        println!(
                            "Update available: {} {} -> {}",
                            name,
                            previous_package_version.as_deref().unwrap_or("?"),
                            new_package_version.as_deref().unwrap_or("?")
                        );
                    }
                }
                Ok(TrackerEvent::CycleCompleted { report }) => {
                    tracing::info!("Cycle completed: {}", report.summary());
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event listener lagged, {} events dropped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    println!("Stopping");
    listener.abort();
    Ok(())
}
