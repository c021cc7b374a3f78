mod backend;
mod buffer;
mod control_server;
mod daemon_core;
mod error;
mod image_source;
mod macros;
mod render;
mod surface;
mod wayland;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use common::{Config, History};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;
use tokio::task::JoinError;

use crate::control_server::ControlServer;
use crate::daemon_core::DaemonCore;
use crate::wayland::WaylandBackend;

#[derive(Parser)]
#[command(name = "sw-daemon")]
#[command(about = "Wallpaper daemon for wlroots-based Wayland compositors", long_about = None)]
#[command(version)]
struct Args {
    /// Image to show on startup
    image_path: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Path to the config file
    #[arg(short, long, env = "SW_CONFIG")]
    config: Option<PathBuf>,

    /// Control socket path, overrides the config
    #[arg(short, long)]
    socket: Option<PathBuf>,

    /// Do not restore the last wallpaper from history
    #[arg(long)]
    no_restore: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    log::info!("Starting sw-daemon v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(args.config.as_deref());
    let socket_path = match &args.socket {
        Some(path) => path.clone(),
        None => config
            .socket_path()
            .context("Failed to resolve control socket path")?,
    };

    let core = DaemonCore::<WaylandBackend>::new();
    apply_initial_image(&core, &args, &config)?;

    let server = ControlServer::bind(&socket_path, core.clone())
        .context("Failed to start control server")?;

    let running = Arc::new(AtomicBool::new(true));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut server_handle = tokio::spawn(server.serve(shutdown_rx));

    let wayland_core = core.clone();
    let wayland_running = running.clone();
    let mut wayland_handle =
        tokio::task::spawn_blocking(move || wayland::run(wayland_core, wayland_running));

    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to set up SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to set up SIGINT handler")?;

    let outcome = tokio::select! {
        _ = sigterm.recv() => {
            log::info!("Received SIGTERM, shutting down...");
            Ok(())
        }
        _ = sigint.recv() => {
            log::info!("Received SIGINT, shutting down...");
            Ok(())
        }
        result = &mut server_handle => task_outcome("Control server", result),
        result = &mut wayland_handle => task_outcome("Wayland event loop", result),
    };

    running.store(false, Ordering::Release);
    let _ = shutdown_tx.send(true);

    if !server_handle.is_finished() {
        log_task_exit("Control server", server_handle.await);
    }
    if !wayland_handle.is_finished() {
        log_task_exit("Wayland event loop", wayland_handle.await);
    }

    log::info!("Daemon stopped");
    outcome
}

fn load_config(path: Option<&Path>) -> Config {
    let result = match path {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    };

    match result {
        Ok(config) => {
            log::info!("Configuration loaded");
            log::debug!("  Socket: {}", config.daemon.socket_path);
            log::debug!(
                "  History: {} (limit {})",
                config.history.file,
                config.history.limit
            );
            config
        }
        Err(e) => {
            log::warn!("Failed to load config: {}. Using defaults.", e);
            Config::default()
        }
    }
}

/// Load the image given on the command line, or fall back to the most recent
/// history entry. Only an explicitly requested image is allowed to fail startup.
fn apply_initial_image(
    core: &DaemonCore<WaylandBackend>,
    args: &Args,
    config: &Config,
) -> Result<()> {
    if let Some(path) = &args.image_path {
        return core
            .set_image(path)
            .with_context(|| format!("Failed to load initial image {}", path.display()));
    }

    if args.no_restore {
        log::info!("Starting without a wallpaper");
        return Ok(());
    }

    match last_wallpaper(config) {
        Ok(Some(path)) => {
            log::info!("Restoring last wallpaper: {}", path);
            if let Err(e) = core.set_image(&path) {
                log::warn!("Could not restore last wallpaper: {}", e);
            }
        }
        Ok(None) => log::info!("No wallpaper history, starting without a wallpaper"),
        Err(e) => log::warn!("Could not read wallpaper history: {:#}", e),
    }

    Ok(())
}

fn last_wallpaper(config: &Config) -> Result<Option<String>> {
    let file = config.history_file()?;
    if !file.exists() {
        return Ok(None);
    }

    let history = History::open(&file, config.history.limit)?;
    Ok(history.last().map(|entry| entry.path.clone()))
}

fn task_outcome(name: &str, result: Result<Result<()>, JoinError>) -> Result<()> {
    match result {
        Ok(Ok(())) => {
            log::info!("{} stopped", name);
            Ok(())
        }
        Ok(Err(e)) => Err(e.context(format!("{} failed", name))),
        Err(e) => Err(anyhow!("{} panicked: {}", name, e)),
    }
}

fn log_task_exit(name: &str, result: Result<Result<()>, JoinError>) {
    if let Err(e) = task_outcome(name, result) {
        log::error!("{:#}", e);
    }
}
