//! CLI output formatting.
//!
//! Consistent terminal output with support for JSON mode (for scripting),
//! quiet mode, and verbosity levels.

use std::fmt::Display;
use std::sync::{OnceLock, RwLock};

use owo_colors::OwoColorize;
use serde_json::json;

use crate::domain::health::OverallHealth;
use crate::domain::state::ServiceState;

/// Runtime output configuration shared by CLI handlers.
///
/// Set once from the global `--json`, `--quiet` and `-v` flags; every
/// helper in this module reads it before printing.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Emit machine-readable JSON output instead of human-readable text.
    pub json: bool,
    /// Suppress non-essential output.
    pub quiet: bool,
    /// Verbosity level (0 = normal, 1+ = increasingly verbose).
    pub verbose: u8,
}

impl OutputConfig {
    /// Bundle the global output flags.
    #[must_use]
    pub const fn new(json: bool, quiet: bool, verbose: u8) -> Self {
        Self {
            json,
            quiet,
            verbose,
        }
    }
}

/// Process-wide output configuration.
static OUTPUT_CONFIG: OnceLock<RwLock<OutputConfig>> = OnceLock::new();

/// The configuration cell, initialized to defaults on first use.
fn config_cell() -> &'static RwLock<OutputConfig> {
    OUTPUT_CONFIG.get_or_init(|| RwLock::new(OutputConfig::default()))
}

/// Current configuration; a poisoned lock still yields its value.
fn read_config() -> OutputConfig {
    match config_cell().read() {
        Ok(config) => *config,
        Err(poisoned) => *poisoned.into_inner(),
    }
}

/// Replace the current configuration.
fn write_config(config: OutputConfig) {
    match config_cell().write() {
        Ok(mut current) => *current = config,
        Err(poisoned) => *poisoned.into_inner() = config,
    }
}

/// Whether human-readable output is muted by `--quiet`.
fn regular_output_suppressed(config: OutputConfig) -> bool {
    !config.json && config.quiet
}

/// Print one `{"type": .., "payload": ..}` JSON line.
fn emit_json_line(kind: &str, payload: serde_json::Value) {
    println!(
        "{}",
        json!({
            "type": kind,
            "payload": payload,
        })
    );
}

/// Apply output settings from global CLI flags.
///
/// Called from `main` right after argument parsing, before any command
/// prints.
pub fn configure(config: OutputConfig) {
    write_config(config);
}

/// Whether JSON output was requested with `--json`.
#[must_use]
pub fn is_json() -> bool {
    read_config().json
}

/// Whether `--quiet` is in effect.
#[must_use]
pub fn is_quiet() -> bool {
    read_config().quiet
}

/// Number of `-v` flags given.
#[must_use]
pub fn verbosity() -> u8 {
    read_config().verbose
}

/// Print the application header with name and version.
pub fn header(version: &str) {
    let config = read_config();
    if config.json {
        emit_json_line(
            "header",
            json!({
                "app": "overseer",
                "version": version,
            }),
        );
        return;
    }
    if regular_output_suppressed(config) {
        return;
    }

    println!("{} {}", "overseer".bold(), version.dimmed());
    println!();
}

/// Print a labeled value.
pub fn field(label: &str, value: impl Display) {
    let config = read_config();
    let value = value.to_string();

    if config.json {
        emit_json_line(
            "field",
            json!({
                "label": label,
                "value": value,
            }),
        );
        return;
    }
    if regular_output_suppressed(config) {
        return;
    }

    println!("  {:<12} {}", label.dimmed(), value);
}

/// Print a success line.
pub fn success(message: &str) {
    let config = read_config();

    if config.json {
        emit_json_line("success", json!({ "message": message }));
        return;
    }
    if regular_output_suppressed(config) {
        return;
    }

    println!("  {} {}", "✓".green(), message);
}

/// Print a warning line. Shown even in quiet mode.
pub fn warning(message: &str) {
    let config = read_config();

    if config.json {
        emit_json_line("warning", json!({ "message": message }));
        return;
    }

    println!("  {} {}", "⚠".yellow(), message);
}

/// Print an error line to stderr. Shown even in quiet mode.
pub fn error(message: &str) {
    let config = read_config();

    if config.json {
        eprintln!(
            "{}",
            json!({
                "type": "error",
                "payload": { "message": message },
            })
        );
        return;
    }

    eprintln!("  {} {}", "×".red(), message);
}

/// Print a section header.
pub fn section(title: &str) {
    let config = read_config();

    if config.json {
        emit_json_line("section", json!({ "title": title }));
        return;
    }
    if regular_output_suppressed(config) {
        return;
    }

    println!();
    println!("{}", title.bold());
}

/// Print a note/hint.
pub fn note(message: &str) {
    let config = read_config();

    if config.json {
        emit_json_line("note", json!({ "message": message }));
        return;
    }
    if regular_output_suppressed(config) {
        return;
    }

    println!("  {}", message.dimmed());
}

/// Emit a JSON value directly (for commands that need custom JSON output).
pub fn json_output(value: serde_json::Value) {
    println!("{value}");
}

/// Color a service state for terminal display.
///
/// Returns the plain label in JSON mode.
pub fn state(state: ServiceState) -> String {
    let label = state.as_str();
    if is_json() {
        return label.to_string();
    }
    match state {
        ServiceState::Running => format!("{}", label.green()),
        ServiceState::Degraded | ServiceState::Restarting | ServiceState::Starting => {
            format!("{}", label.yellow())
        }
        ServiceState::Failed => format!("{}", label.red()),
        ServiceState::Stopped | ServiceState::Stopping => format!("{}", label.dimmed()),
    }
}

/// Color the overall health for terminal display; plain in JSON mode.
pub fn health(health: OverallHealth) -> String {
    let label = health.as_str();
    if is_json() {
        return label.to_string();
    }
    match health {
        OverallHealth::Healthy => format!("{}", label.green().bold()),
        OverallHealth::Degraded => format!("{}", label.yellow().bold()),
        OverallHealth::Critical => format!("{}", label.red().bold()),
    }
}
