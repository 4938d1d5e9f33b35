/// Quill Daemon - Main entry point
/// Loads the configuration, wires the services and drains the queues until shutdown
use clap::Parser;
use quill_core::ConfigManager;
use quill_daemon::{effective_level, init_logging, Services};
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    name = "quill-daemon",
    about = "Background worker for the Quill editorial workflow engine",
    version = env!("CARGO_PKG_VERSION")
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "PATH",
        help = "Path to configuration file (TOML, default: ~/.quill/config.toml)"
    )]
    config: Option<PathBuf>,

    /// Log level
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Log level (trace, debug, info, warn, error); overrides the config file"
    )]
    log_level: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable verbose output")]
    verbose: bool,

    /// Drain each queue once and exit
    #[arg(long, help = "Run one drain of each queue and exit")]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Configuration decides the log format, so it is read first
    let mut manager = ConfigManager::load(args.config.as_deref())?;
    manager.load_from_env()?;

    let logging = &manager.config().logging;
    let level = effective_level(args.verbose, args.log_level.as_deref(), &logging.level);
    init_logging(&level, logging.format)?;

    info!("Starting Quill daemon v{}", quill_daemon::VERSION);
    info!("Configuration: {}", manager.config_path().display());
    manager.validate()?;

    let config = manager.config();
    let services = Services::build(config).await?;

    if args.once {
        let (jobs, index) = services.drain_once().await?;
        info!(
            "Single drain finished: {} jobs executed, {} index entries processed",
            jobs.executed,
            index.processed()
        );
        services.close().await;
        return Ok(());
    }

    info!(
        "Draining job queue every {}s and index queue every {}s",
        config.scheduler.job_queue_interval_secs, config.scheduler.index_interval_secs
    );

    let (shutdown_tx, _) = broadcast::channel(1);
    let loops = services.spawn_drain_loops(config, &shutdown_tx);

    wait_for_shutdown_signal().await;
    info!("Shutting down daemon...");

    // Receivers only go away once both loops have already stopped
    let _ = shutdown_tx.send(());
    loops.join().await;
    services.close().await;

    info!("Quill daemon stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for CTRL+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received CTRL+C signal");
        },
        () = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
