//! Handler for the `status` command.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::json;
use tabled::{Table, Tabled};

use crate::adapter::inbound::cli::command::StatusArgs;
use crate::adapter::inbound::cli::output;
use crate::application::status::ServiceStatus;
use crate::error::Result;
use crate::infrastructure::config::settings::Config;
use crate::infrastructure::config::status::StatusConfig;
use crate::infrastructure::status_file::StatusFile;

#[derive(Tabled)]
struct ServiceRow {
    #[tabled(rename = "Service")]
    name: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Uptime")]
    uptime: String,
    #[tabled(rename = "Failures")]
    failures: u32,
    #[tabled(rename = "Retries")]
    retries: u32,
    #[tabled(rename = "Restarts")]
    restarts: u32,
    #[tabled(rename = "Note")]
    note: String,
}

impl ServiceRow {
    fn from_status(service: &ServiceStatus, now: DateTime<Utc>) -> Self {
        let note = if service.blocked_on.is_empty() {
            service.last_error.clone().unwrap_or_default()
        } else {
            let names: Vec<&str> = service.blocked_on.iter().map(|n| n.as_str()).collect();
            format!("waiting on {}", names.join(", "))
        };
        Self {
            name: service.name.to_string(),
            state: output::state(service.state),
            uptime: service
                .uptime_secs(now)
                .map_or_else(|| "-".to_string(), format_duration),
            failures: service.consecutive_failures,
            retries: service.retry_attempts,
            restarts: service.restarts,
            note,
        }
    }
}

/// Resolve the status file: explicit path, then the config's `[status]`
/// table, then the default.
fn resolve_path(args: &StatusArgs) -> PathBuf {
    if let Some(path) = &args.path {
        return path.clone();
    }
    Config::load(&args.config)
        .map(|config| config.status.path)
        .unwrap_or_else(|_| StatusConfig::default().path)
}

/// Execute the status command.
pub fn execute(args: &StatusArgs) -> Result<()> {
    let path = resolve_path(args);

    if !path.exists() {
        if output::is_json() {
            output::json_output(json!({
                "command": "status",
                "path": path.display().to_string(),
                "status": "missing",
            }));
        } else {
            output::warning(&format!("Status file not found ({})", path.display()));
            output::note("Run `overseer run` to start supervising and create it.");
        }
        return Ok(());
    }

    let file = StatusFile::read(&path)?;
    if output::is_json() {
        output::json_output(json!({
            "command": "status",
            "path": path.display().to_string(),
            "status": "ok",
            "file": file,
        }));
        return Ok(());
    }
    if output::is_quiet() {
        return Ok(());
    }

    display(&path, &file);
    Ok(())
}

fn display(path: &Path, file: &StatusFile) {
    let now = Utc::now();
    output::header(env!("CARGO_PKG_VERSION"));
    output::field("Health", output::health(file.system.overall));
    output::field("PID", file.pid);
    output::field("Updated", format_age(now, file.updated_at));
    if output::verbosity() > 0 {
        output::field("File", path.display());
        output::field("Since", file.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }

    output::section("Services");
    if file.system.services.is_empty() {
        output::note("No services configured");
        return;
    }
    let rows: Vec<ServiceRow> = file
        .system
        .services
        .iter()
        .map(|service| ServiceRow::from_status(service, now))
        .collect();
    println!("{}", Table::new(rows));
}

fn format_age(now: DateTime<Utc>, then: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds().max(0);
    format!("{} ago", format_duration(secs))
}

fn format_duration(secs: i64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::domain::state::ServiceState;

    fn status(name: &str) -> ServiceStatus {
        ServiceStatus {
            name: name.into(),
            state: ServiceState::Stopped,
            consecutive_failures: 0,
            retry_attempts: 0,
            restarts: 0,
            since_transition_ms: 0,
            last_transition_at: Utc::now(),
            started_at: None,
            last_probe_at: None,
            blocked_on: Vec::new(),
            last_error: None,
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(42), "42s");
        assert_eq!(format_duration(125), "2m 5s");
        assert_eq!(format_duration(7_260), "2h 1m");
    }

    #[test]
    fn test_row_shows_blocked_dependencies() {
        let mut service = status("ai_brain");
        service.blocked_on = vec!["market_data".into()];
        service.last_error = Some("ignored".into());

        let row = ServiceRow::from_status(&service, Utc::now());
        assert_eq!(row.note, "waiting on market_data");
        assert_eq!(row.uptime, "-");
    }

    #[test]
    fn test_row_shows_uptime_and_last_error() {
        let now = Utc::now();
        let mut service = status("market_data");
        service.started_at = Some(now - Duration::seconds(90));
        service.last_error = Some("start failed: boom".into());

        let row = ServiceRow::from_status(&service, now);
        assert_eq!(row.uptime, "1m 30s");
        assert_eq!(row.note, "start failed: boom");
    }

    #[test]
    fn test_explicit_path_wins() {
        let args = StatusArgs {
            path: Some(PathBuf::from("/tmp/custom-status.json")),
            config: PathBuf::from("missing.toml"),
        };
        assert_eq!(resolve_path(&args), PathBuf::from("/tmp/custom-status.json"));
    }

    #[test]
    fn test_missing_config_falls_back_to_default() {
        let args = StatusArgs {
            path: None,
            config: PathBuf::from("/nonexistent/overseer.toml"),
        };
        assert_eq!(resolve_path(&args), StatusConfig::default().path);
    }
}
