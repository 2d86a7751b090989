//! Handler for the `run` command.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::adapter::inbound::cli::command::RunArgs;
use crate::adapter::inbound::cli::output;
use crate::application::orchestrator::{Orchestrator, ShutdownReport, StartupReport};
use crate::error::Result;
use crate::infrastructure::bootstrap;
use crate::infrastructure::config::settings::Config;
use crate::infrastructure::status_file::StatusWriter;

/// Execute the run command.
///
/// Starts every configured service, then supervises until SIGINT or SIGTERM
/// and stops everything in reverse dependency order.
pub async fn execute(args: &RunArgs) -> Result<()> {
    let mut config = Config::load(&args.config)?;
    config.logging = config
        .logging
        .with_overrides(args.log_level.as_deref(), args.json_logs || output::is_json());
    config.init_logging();

    let orchestrator = bootstrap::build_orchestrator(&config)?;
    print_startup_config(&config, &orchestrator);
    info!(
        services = config.services.len(),
        layers = orchestrator.layers().len(),
        "overseer starting"
    );

    let writer = (config.status.enabled && !args.no_status_file)
        .then(|| Arc::new(StatusWriter::new(config.status.path.clone())));
    let status_stop = CancellationToken::new();
    let status_task = writer.as_ref().map(|writer| {
        tokio::spawn(write_status_periodically(
            orchestrator.clone(),
            Arc::clone(writer),
            config.status.interval(),
            status_stop.clone(),
        ))
    });

    let grace = config.supervisor.shutdown_grace();
    let signal = wait_for_shutdown_signal();
    tokio::pin!(signal);
    let startup = orchestrator.start_all();
    tokio::pin!(startup);

    let shutdown = tokio::select! {
        result = &mut startup => {
            match result {
                Ok(report) => print_startup_report(&report),
                Err(e) => warn!(error = %e, "Startup did not run"),
            }
            if let Err(e) = (&mut signal).await {
                error!(error = %e, "Failed to listen for shutdown signals");
            }
            info!("Shutdown signal received");
            orchestrator.shutdown_all(grace).await
        }
        result = &mut signal => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for shutdown signals");
            }
            info!("Shutdown signal received during startup");
            // Keep driving startup so in-flight starts observe the shutdown.
            let (report, _) = tokio::join!(orchestrator.shutdown_all(grace), startup);
            report
        }
    };

    status_stop.cancel();
    if let Some(task) = status_task {
        if let Err(e) = task.await {
            warn!(error = %e, "Status writer task failed");
        }
    }
    if let Some(writer) = &writer {
        if let Err(e) = writer.write(&orchestrator.status_snapshot()) {
            warn!(error = %e, "Failed to write final status");
        }
    }

    print_shutdown_report(&shutdown);
    info!("overseer stopped");
    Ok(())
}

/// Completes on SIGINT or SIGTERM (Ctrl+C only on non-Unix platforms).
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = sigterm.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

async fn write_status_periodically(
    orchestrator: Orchestrator,
    writer: Arc<StatusWriter>,
    period: Duration,
    stop: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = stop.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = writer.write(&orchestrator.status_snapshot()) {
                    let path = writer.path().display();
                    warn!(path = %path, error = %e, "Failed to write status file");
                }
            }
        }
    }
}

fn print_startup_config(config: &Config, orchestrator: &Orchestrator) {
    if output::is_json() {
        return;
    }
    output::header(env!("CARGO_PKG_VERSION"));
    output::field("Services", config.services.len());
    output::field("Layers", orchestrator.layers().len());
    if output::verbosity() > 0 {
        for (index, layer) in orchestrator.layers().iter().enumerate() {
            let names: Vec<&str> = layer.iter().map(|n| n.as_str()).collect();
            output::field(&format!("Layer {index}"), names.join(", "));
        }
    }
    if config.status.enabled {
        output::field("Status", config.status.path.display());
    }
}

fn print_startup_report(report: &StartupReport) {
    if output::is_json() {
        output::json_output(json!({
            "command": "run",
            "event": "startup",
            "report": report,
        }));
        return;
    }

    output::section("Startup");
    for name in &report.running {
        output::success(&format!("{name} running"));
    }
    for name in &report.pending {
        output::warning(&format!("{name} still recovering"));
    }
    for name in &report.blocked {
        output::warning(&format!("{name} blocked on dependencies"));
    }
    for name in &report.failed {
        output::error(&format!("{name} failed"));
    }
    if report.is_complete() {
        output::note("All services running. Press Ctrl+C to stop.");
    } else {
        output::note("Failed services stay down until restarted.");
    }
}

fn print_shutdown_report(report: &ShutdownReport) {
    if output::is_json() {
        output::json_output(json!({
            "command": "run",
            "event": "shutdown",
            "report": report,
        }));
        return;
    }

    output::section("Shutdown");
    output::field("Stopped", report.stopped.len());
    for error in &report.errors {
        output::error(&error.to_string());
    }
    if report.abandoned_tasks {
        output::warning("Background tasks were still running after the grace period");
    }
    if report.is_clean() {
        output::success("All services stopped");
    }
}
