mod bot;
mod config;
mod domain;
mod engine;
mod exchanges;
mod notification;
mod storage;

use bot::{Bot, BotConfig};
use clap::Parser;
use config::Config;
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::{Level, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_CONFIG_PATH: &str = "configs/config.yaml";
const STARTUP_ERROR: u8 = 1;

#[derive(Parser, Debug)]
#[command(version, about = "Cross-exchange spread capture engine")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Number of cycles to run (0 runs until Ctrl-C)
    #[arg(long)]
    cycles: Option<u64>,

    /// Run a single cycle and exit
    #[arg(long, conflicts_with = "cycles")]
    once: bool,

    /// Simulate orders against live quotes
    #[arg(long)]
    dry_run: bool,

    /// Report opportunities without executing them
    #[arg(long)]
    scan_only: bool,
}

/// Logs go to stderr so stdout carries only cycle results.
fn init_tracing(log_level: Option<&str>) {
    let level = match log_level {
        Some("debug") => Level::DEBUG,
        Some("warn") | Some("warning") => Level::WARN,
        Some("error") => Level::ERROR,
        Some("trace") => Level::TRACE,
        _ => Level::INFO,
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Installs the interrupt handler right away and raises the returned flag
/// when Ctrl-C arrives. The handler must be in place before the first cycle,
/// otherwise an early Ctrl-C would kill the process in the middle of a trade.
fn listen_for_interrupt() -> std::io::Result<watch::Receiver<bool>> {
    #[cfg(unix)]
    let mut interrupt =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;
    #[cfg(windows)]
    let mut interrupt = tokio::signal::windows::ctrl_c()?;

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if interrupt.recv().await.is_some() {
            info!("interrupt received, finishing current cycle");
            if tx.send(true).is_err() {
                warn!("bot stopped before the interrupt was delivered");
            }
        }
    });
    Ok(rx)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match Config::load_with(&args.config, args.dry_run) {
        Ok(config) => config,
        Err(e) => {
            init_tracing(None);
            error!(config = %args.config, error = %e, "failed to load config");
            return ExitCode::from(STARTUP_ERROR);
        }
    };

    init_tracing(config.app.log_level.as_deref());

    let mut settings = BotConfig::from_config(&config);
    settings.scan_only = args.scan_only;
    if args.once {
        settings.max_cycles = 1;
    } else if let Some(cycles) = args.cycles {
        settings.max_cycles = cycles;
    }

    let shutdown = match listen_for_interrupt() {
        Ok(shutdown) => shutdown,
        Err(e) => {
            error!(error = %e, "failed to install interrupt handler");
            return ExitCode::from(STARTUP_ERROR);
        }
    };

    let mut bot = match Bot::from_config(&config, settings).await {
        Ok(bot) => bot,
        Err(e) => {
            error!(error = %e, "failed to create bot");
            return ExitCode::from(STARTUP_ERROR);
        }
    };

    info!(
        config = %args.config,
        exchanges = ?config.enabled_exchanges(),
        pairs = ?config.pairs,
        "bot initialized"
    );

    let mut stdout = std::io::stdout().lock();
    match bot.run(&mut stdout, shutdown).await {
        Ok(summary) => {
            info!(
                reason = ?summary.stop_reason,
                cycles = summary.stats.cycles,
                trades = summary.stats.trades_attempted,
                settled = summary.stats.trades_settled,
                residual = summary.stats.residual_trades,
                exit_code = summary.exit_code(),
                "run finished"
            );
            ExitCode::from(u8::try_from(summary.exit_code()).unwrap_or(STARTUP_ERROR))
        }
        Err(e) => {
            error!(error = %e, "bot error");
            ExitCode::from(STARTUP_ERROR)
        }
    }
}
