// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! tracectld: per-application userspace tracing session controller.
//!
//! Architecture:
//! - Listener thread: accepts app registrations, one monitor thread per app
//! - Main thread: blocks in the listener's accept loop; the public API (C7)
//!   is driven by whatever process embeds [`tracectl_daemon::Controller`]
//!   over its own command channel (out of scope here)

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::os::unix::net::UnixStream;
use std::sync::Arc;

use thiserror::Error;
use tracectl_core::{Bitness, FdBudget, SystemClock, UuidIdGen};
use tracectl_daemon::{Config, Controller};
use tracectl_reconcile::{ReconcileConfig, Reconciler, UnixTraceDirCreator};
use tracectl_registry::AppRegistry;
use tracectl_transport::{ConsumerEndpoints, UnixConsumerClient};
use tracing::{error, info, warn};

fn main() {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("tracectld {}", env!("CARGO_PKG_VERSION"));
                return;
            }
            "--help" | "-h" | "help" => {
                print_help();
                return;
            }
            other => {
                eprintln!("error: unexpected argument '{other}'");
                eprintln!("Usage: tracectld [--help | --version] [config path]");
                std::process::exit(1);
            }
        }
    }

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let config = match config_path {
        Some(path) => Config::load(&path),
        None => Ok(Config::default()),
    };
    let config = match config {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: failed to load configuration: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = std::fs::create_dir_all(&config.state_dir) {
        eprintln!("error: failed to create state dir {}: {err}", config.state_dir.display());
        std::process::exit(1);
    }

    rotate_log_if_needed(&config.log_path());
    if let Err(err) = write_startup_marker(&config) {
        eprintln!("error: failed to write startup marker: {err}");
    }

    let _log_guard = match setup_logging(&config) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("error: failed to set up logging: {err}");
            std::process::exit(1);
        }
    };

    info!("starting tracectld");

    let controller = Arc::new(build_controller(&config));

    info!(socket = %config.socket_path().display(), "daemon ready");
    println!("READY");

    if let Err(err) = tracectl_daemon::listener::run(&config.socket_path(), controller) {
        error!(%err, "accept loop exited");
        std::process::exit(1);
    }
}

fn print_help() {
    println!("tracectld {}", env!("CARGO_PKG_VERSION"));
    println!("Per-application userspace tracing session controller");
    println!();
    println!("USAGE:");
    println!("    tracectld [config.toml]");
    println!();
    println!("Listens on a Unix socket for app registrations and drives each app's");
    println!("tracer transport to match the daemon's logical session configuration.");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help       Print help information");
    println!("    -v, --version    Print version information");
}

/// Wire the registry (C4), reconciler (C6), and public API (C7) together,
/// dialing the configured consumer daemons best-effort: a bitness with no
/// reachable consumer is simply unavailable to apps of that bitness.
fn build_controller(config: &Config) -> Controller {
    let consumers = Arc::new(ConsumerEndpoints::new());
    connect_consumer(&consumers, Bitness::B32, config.consumerd32_socket.as_deref());
    connect_consumer(&consumers, Bitness::B64, config.consumerd64_socket.as_deref());

    let fd_budget = Arc::new(FdBudget::new(config.fd_budget_ceiling));
    let registry = AppRegistry::new(consumers.clone(), fd_budget.clone(), config.supported_protocol_major);

    let reconcile_config = ReconcileConfig {
        trace_base_path: config.trace_base_path.clone(),
        trace_subdir: config.trace_subdir.clone(),
        metadata_channel_attr: config.default_metadata_attr,
    };
    let reconciler = Reconciler::new(
        consumers,
        fd_budget,
        Arc::new(UuidIdGen),
        Arc::new(SystemClock),
        Arc::new(UnixTraceDirCreator),
        reconcile_config,
    );

    Controller::new(registry, reconciler, tracectl_daemon::SessionStore::new())
}

fn connect_consumer(consumers: &ConsumerEndpoints, bitness: Bitness, path: Option<&std::path::Path>) {
    let Some(path) = path else { return };
    match UnixStream::connect(path) {
        Ok(sock) => {
            consumers.set(bitness, Arc::new(UnixConsumerClient::new(sock)));
            info!(?bitness, path = %path.display(), "connected to consumer daemon");
        }
        Err(err) => {
            warn!(?bitness, path = %path.display(), %err, "failed to connect to consumer daemon; apps of this bitness will be rejected");
        }
    }
}

/// Maximum log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;
/// Number of rotated log files to keep (tracectl.log.1, .2, .3).
const MAX_ROTATED_LOGS: u32 = 3;

/// Rotate the daemon log file if it exceeds [`MAX_LOG_SIZE`]. Best-effort:
/// rotation failures are silently ignored so the daemon still starts.
fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };
    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

const STARTUP_MARKER_PREFIX: &str = "--- tracectld: starting (pid: ";

fn write_startup_marker(config: &Config) -> std::io::Result<()> {
    use std::io::Write;

    if let Some(parent) = config.log_path().parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(config.log_path())?;
    writeln!(file, "{}{}) ---\n", STARTUP_MARKER_PREFIX, std::process::id())
}

#[derive(Debug, Error)]
enum LoggingError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("log path has no parent directory")]
    NoLogDir,
}

fn setup_logging(config: &Config) -> Result<tracing_appender::non_blocking::WorkerGuard, LoggingError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let log_path = config.log_path();
    let parent = log_path.parent().ok_or(LoggingError::NoLogDir)?;
    std::fs::create_dir_all(parent)?;

    let file_name = log_path.file_name().ok_or(LoggingError::NoLogDir)?;
    let file_appender = tracing_appender::rolling::never(parent, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter).with(fmt::layer().with_writer(non_blocking)).init();

    Ok(guard)
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
