//! PacketPilot Agent - per-interface daily traffic accounting daemon
//!
//! This agent keeps today's rx/tx totals for each monitored interface:
//! - Interface discovery (specific interface or `any`)
//! - Periodic counter accounting with crash-safe persistence
//! - Periodic report delivery to the PacketPilot server
//! - Relay of server-issued commands

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use packetpilot_agent::repository::{JsonFileRepository, UsageRepository};
use packetpilot_agent::usage::BYTES_PER_MB;
use packetpilot_agent::{
    logging, AgentConfig, Clock, DailyUsage, Daemon, RepositoryError, SystemClock, VERSION,
};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;

const BUILD: &str = match option_env!("PACKETPILOT_BUILD") {
    Some(build) => build,
    None => "dev",
};

#[derive(Debug, Parser)]
#[command(
    name = "packetpilot-agent",
    about = "PacketPilot traffic monitoring daemon",
    long_about = "A daemon service that tracks daily network usage per interface and reports it to a PacketPilot server"
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the daemon (default)
    Run,
    /// Print today's persisted usage
    Usage,
    /// Print version information
    Version,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = dispatch(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Version => {
            println!("PacketPilot Daemon v{}", VERSION);
            println!("Build: {}", BUILD);
            Ok(())
        }
        Commands::Usage => {
            let config = AgentConfig::load(cli.config.as_deref()).context("failed to load config")?;
            print_usage(&config)
        }
        Commands::Run => run_daemon(cli.config, cli.log_level).await,
    }
}

async fn run_daemon(config_path: Option<PathBuf>, log_level: Option<String>) -> Result<()> {
    let config = AgentConfig::load(config_path.as_deref()).context("failed to load config")?;

    let level = log_level.as_deref().unwrap_or(&config.logging.level);
    logging::init(level, config.logging.file.as_deref())
        .context("failed to initialize logger")?;

    info!(version = VERSION, build = BUILD, "Starting PacketPilot daemon");

    let daemon = Daemon::new(config).context("failed to create daemon")?;

    let cancel = CancellationToken::new();
    tokio::spawn(watch_signals(cancel.clone()));

    daemon.start(cancel).await.context("daemon failed")?;

    info!("PacketPilot daemon stopped");
    Ok(())
}

/// Cancel on SIGINT or SIGTERM
async fn watch_signals(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                info!(signal = "SIGINT", "Received signal, shutting down gracefully");
                cancel.cancel();
                return;
            }
        };

        let name = tokio::select! {
            _ = tokio::signal::ctrl_c() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
        };
        info!(signal = name, "Received signal, shutting down gracefully");
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!(signal = "ctrl-c", "Received signal, shutting down gracefully");
    }

    cancel.cancel();
}

fn print_usage(config: &AgentConfig) -> Result<()> {
    let repository = JsonFileRepository::new(config.monitor.usage_file.clone());
    let usage = match repository.load() {
        Ok(usage) => usage,
        Err(RepositoryError::NotFound(path)) => {
            println!("No usage recorded yet ({})", path.display());
            return Ok(());
        }
        Err(e) => return Err(e).context("failed to read usage file"),
    };

    print!("{}", render_usage(&usage, &SystemClock.today()));
    Ok(())
}

/// Usage table in MB, flagged when the saved day is not `today`
fn render_usage(usage: &DailyUsage, today: &str) -> String {
    let mut out = format!("Date: {}\n", usage.date);
    if !usage.is_for(today) {
        out.push_str(&format!(
            "Note: saved usage is from {}, not today ({}); it resets when the daemon next runs\n",
            usage.date, today
        ));
    }

    out.push_str(&format!("{:<16} {:>14} {:>14}\n", "INTERFACE", "RX (MB)", "TX (MB)"));
    for stats in usage.interfaces.values() {
        out.push_str(&format!(
            "{:<16} {:>14.2} {:>14.2}\n",
            stats.interface,
            stats.total_rx_mb(),
            stats.total_tx_mb()
        ));
    }
    out.push_str(&format!(
        "{:<16} {:>14.2} {:>14.2}\n",
        "TOTAL",
        usage.total_rx() as f64 / BYTES_PER_MB,
        usage.total_tx() as f64 / BYTES_PER_MB
    ));
    out
}
