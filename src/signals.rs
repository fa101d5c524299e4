//! Signal handling: SIGINT/SIGTERM trigger graceful shutdown, SIGHUP reloads
//! the timetable, SIGUSR1 toggles debug logging. Each handler takes the
//! master lock and notifies, so it never races the control cycle.

use crate::cycle::SharedDaemon;
use anyhow::Context;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;

/// Runs until SIGINT or SIGTERM is received, at which point it sets
/// `Daemon::enabled = false` under the lock, notifies the control cycle, and
/// flips `shutdown_tx` so in-flight `GET /monitor` long-polls are released
/// with a terminal status.
///
/// Installing a Unix signal handler can fail (e.g. the slot is already
/// claimed); that's an unforeseeable setup fault, not a modeled exit
/// condition, so it's surfaced as a plain `anyhow::Error` instead of a
/// typed variant.
pub async fn run_shutdown_listener(
    daemon: SharedDaemon,
    condition: Arc<tokio::sync::Notify>,
    shutdown_tx: watch::Sender<bool>,
) -> anyhow::Result<&'static str> {
    let mut sigint = signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;
    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

    let reason = tokio::select! {
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    };

    tracing::info!(signal = reason, "shutdown requested");
    {
        let mut guard = daemon.lock().await;
        guard.enabled = false;
    }
    condition.notify_one();
    let _ = shutdown_tx.send(true);
    Ok(reason)
}

/// Runs until cancelled, reloading the timetable under the lock on every
/// SIGHUP and notifying so the cycle re-evaluates against the fresh
/// schedule immediately.
pub async fn run_reload_listener(daemon: SharedDaemon, condition: Arc<tokio::sync::Notify>) -> anyhow::Result<()> {
    let mut sighup = signal(SignalKind::hangup()).context("failed to install SIGHUP handler")?;
    loop {
        sighup.recv().await;
        tracing::info!("SIGHUP received, reloading timetable");
        let result = {
            let mut guard = daemon.lock().await;
            guard.timetable.reload()
        };
        match result {
            Ok(()) => {
                condition.notify_one();
                tracing::info!("timetable reloaded");
            }
            Err(e) => {
                tracing::error!(error = %e, "timetable reload failed, keeping prior state");
            }
        }
    }
}

/// Runs until cancelled, toggling the shared debug flag on every SIGUSR1.
/// The flag is read by `main` to decide the `tracing` filter directive at
/// startup; toggling it at runtime re-applies the filter via a
/// `tracing_subscriber::reload::Handle` held by the caller.
pub async fn run_debug_toggle_listener(
    debug: Arc<AtomicBool>,
    on_toggle: impl Fn(bool) + Send,
) -> anyhow::Result<()> {
    let mut sigusr1 =
        signal(SignalKind::user_defined1()).context("failed to install SIGUSR1 handler")?;
    loop {
        sigusr1.recv().await;
        let now_debug = !debug.load(Ordering::SeqCst);
        debug.store(now_debug, Ordering::SeqCst);
        tracing::info!(debug = now_debug, "SIGUSR1 received, toggled debug logging");
        on_toggle(now_debug);
    }
}
