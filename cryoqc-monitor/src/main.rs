//! cryoqc-monitor - cryo-EM acquisition QC
//!
//! Subcommands:
//! - `watch`: watch the incoming directory and run the processing pipeline for
//!   every new movie (optionally with the QC loop alongside)
//! - `qc`: aggregate pipeline metadata into the consolidated table and render
//!   per-movie diagnostics
//! - `transfer`: copy acquired movies to remote storage
//!
//! Every subcommand runs until interrupted (Ctrl+C / SIGTERM) and then shuts
//! down cleanly.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use cryoqc_common::config::{resolve_config_path, QcConfig};
use cryoqc_common::events::EventBus;
use cryoqc_monitor::services::{run_watch, DispatchPool, ExternalPipeline};
use cryoqc_monitor::transfer::{SshRemoteCopy, TransferMonitor};
use cryoqc_monitor::QcMonitor;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for cryoqc-monitor
#[derive(Parser, Debug)]
#[command(name = "cryoqc-monitor")]
#[command(about = "Automated quality control for cryo-EM movie acquisition")]
#[command(version)]
struct Cli {
    /// Config file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is not set (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "CRYOQC_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch a directory and dispatch new movies to the pipeline
    Watch(WatchArgs),
    /// Aggregate metadata and render QC artifacts
    Qc(QcArgs),
    /// Copy movies to remote storage
    Transfer(TransferArgs),
}

#[derive(Args, Debug)]
struct ProjectArg {
    /// Project directory holding the pipeline outputs
    #[arg(short, long, env = "CRYOQC_PROJECT")]
    project: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct WatchArgs {
    #[command(flatten)]
    project: ProjectArg,

    /// Incoming-files directory
    #[arg(short, long, env = "CRYOQC_WATCH_DIR")]
    directory: Option<PathBuf>,

    /// Microscope voltage in kV [default: 200]
    #[arg(long)]
    voltage: Option<f64>,

    /// Sampling rate in Å/pixel [default: 1.0]
    #[arg(long)]
    sampling_rate: Option<f64>,

    /// Concurrent pipeline invocations [default: 1]
    #[arg(short, long)]
    workers: Option<usize>,

    /// Run the QC loop in the same process
    #[arg(long)]
    with_qc: bool,
}

#[derive(Args, Debug)]
struct QcArgs {
    #[command(flatten)]
    project: ProjectArg,

    /// Directory receiving the table and the artifacts
    #[arg(long)]
    working_dir: Option<PathBuf>,

    /// Run a single step and exit
    #[arg(long)]
    once: bool,
}

#[derive(Args, Debug)]
struct TransferArgs {
    #[command(flatten)]
    project: ProjectArg,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = resolve_config_path(cli.config.as_deref());
    let mut config = QcConfig::load(config_path.as_deref()).context("Failed to load configuration")?;

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting cryoqc-monitor {}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) if path.exists() => info!(path = %path.display(), "Configuration file"),
        Some(path) => warn!(path = %path.display(), "Config file not found, using defaults"),
        None => info!("No config file, using defaults"),
    }

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });

    let event_bus = EventBus::default();

    match cli.command {
        Command::Watch(args) => run_watch_command(&mut config, args, event_bus, cancel).await,
        Command::Qc(args) => run_qc_command(&mut config, args, event_bus, cancel).await,
        Command::Transfer(args) => run_transfer_command(&mut config, args, event_bus, cancel).await,
    }
}

async fn run_watch_command(
    config: &mut QcConfig,
    args: WatchArgs,
    event_bus: EventBus,
    cancel: CancellationToken,
) -> Result<()> {
    if let Some(project) = args.project.project {
        config.project = Some(project);
    }
    if let Some(directory) = args.directory {
        config.watch_directory = Some(directory);
    }
    if let Some(voltage) = args.voltage {
        config.acquisition.voltage = voltage;
    }
    if let Some(sampling_rate) = args.sampling_rate {
        config.acquisition.sampling_rate = sampling_rate;
    }
    if let Some(workers) = args.workers {
        config.dispatch.workers = workers;
    }
    config.validate_for_dispatch().context("Invalid configuration")?;

    let config = &*config;
    let (Some(project), Some(directory)) = (config.project.clone(), config.watch_directory.clone())
    else {
        bail!("project and watch directory are required");
    };

    info!(
        project = %project.display(),
        directory = %directory.display(),
        voltage = config.acquisition.voltage,
        sampling_rate = config.acquisition.sampling_rate,
        workers = config.dispatch.workers,
        "Watch configuration"
    );

    let runner = Arc::new(ExternalPipeline::from_config(config, project.clone()));
    let pool = Arc::new(
        DispatchPool::from_config(runner, &config.dispatch).with_event_bus(event_bus.clone()),
    );

    let qc_task = if args.with_qc {
        let mut monitor = QcMonitor::from_config(config, project, event_bus);
        let token = cancel.clone();
        Some(tokio::spawn(async move { monitor.run(token).await }))
    } else {
        None
    };

    let summary = run_watch(&directory, pool.clone(), &config.dispatch, cancel.clone())
        .await
        .context("Directory watch failed")?;

    // A watch that stopped on its own still takes the QC loop down with it
    cancel.cancel();
    if let Some(task) = qc_task {
        if let Err(e) = task.await {
            error!(error = %e, "QC loop task failed");
        }
    }

    let stats = pool.stats();
    info!(
        backlog = summary.backlog,
        arrivals = summary.arrivals,
        succeeded = stats.succeeded,
        failed = stats.failed,
        peak_in_flight = stats.peak_in_flight,
        "Watch stopped"
    );
    for (movie, status) in pool.failures() {
        warn!(movie = %movie.display(), ?status, "Movie not processed");
    }
    Ok(())
}

async fn run_qc_command(
    config: &mut QcConfig,
    args: QcArgs,
    event_bus: EventBus,
    cancel: CancellationToken,
) -> Result<()> {
    if let Some(project) = args.project.project {
        config.project = Some(project);
    }
    if let Some(working_dir) = args.working_dir {
        config.qc.working_dir = working_dir;
    }
    config.validate().context("Invalid configuration")?;
    let Some(project) = config.project.clone() else {
        bail!("project not configured (use --project or the `project` config key)");
    };

    let mut monitor = QcMonitor::from_config(config, project, event_bus);
    if args.once {
        let summary = monitor.step().await.context("QC step failed")?;
        info!(
            records = summary.poll.records,
            rendered = summary.artifacts.rendered,
            "Single QC step complete"
        );
    } else {
        monitor.run(cancel).await;
    }
    Ok(())
}

async fn run_transfer_command(
    config: &mut QcConfig,
    args: TransferArgs,
    event_bus: EventBus,
    cancel: CancellationToken,
) -> Result<()> {
    if let Some(project) = args.project.project {
        config.project = Some(project);
    }
    config.validate_for_transfer().context("Invalid configuration")?;
    let Some(project) = config.project.clone() else {
        bail!("project not configured");
    };

    let remote = SshRemoteCopy::from_config(&config.transfer).context("Invalid transfer settings")?;
    if let Err(e) = remote.probe().await {
        warn!(error = %e, destination = %remote.target().scp_target(), "Remote login check failed");
    }

    let monitor =
        TransferMonitor::from_config(config, project, Arc::new(remote)).with_event_bus(event_bus);
    if args.once {
        monitor.step().await;
    } else {
        monitor.run(cancel).await;
    }
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
