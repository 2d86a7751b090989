//! Command-line interface definitions.
//!
//! Defines the CLI structure for the overseer supervisor using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::infrastructure::config::settings::DEFAULT_CONFIG_PATH;

/// Dependency-aware service supervisor
#[derive(Parser, Debug)]
#[command(name = "overseer")]
#[command(version)]
pub struct Cli {
    /// JSON output for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// Decrease output verbosity
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase output verbosity
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the overseer CLI.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start every configured service and supervise until interrupted
    Run(RunArgs),

    /// Show the status written by a running supervisor
    Status(StatusArgs),

    /// Run diagnostic checks
    #[command(subcommand)]
    Check(CheckCommand),
}

/// Subcommands for `overseer check`.
#[derive(Subcommand, Debug)]
pub enum CheckCommand {
    /// Validate the configuration file and the dependency graph.
    Config(ConfigPathArg),
}

/// Shared argument struct for commands that require only a configuration path.
#[derive(Parser, Debug)]
pub struct ConfigPathArg {
    /// Path to the configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Override log level (debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Use JSON log format instead of pretty-printed logs.
    #[arg(long)]
    pub json_logs: bool,

    /// Do not write the status file.
    #[arg(long)]
    pub no_status_file: bool,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Path to the status file. Defaults to `status.path` from the config.
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Configuration file used to locate the status file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_overrides() {
        let cli = Cli::parse_from([
            "overseer",
            "run",
            "-c",
            "custom.toml",
            "--log-level",
            "debug",
            "--json-logs",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.config, PathBuf::from("custom.toml"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.json_logs);
        assert!(!args.no_status_file);
    }

    #[test]
    fn global_flags_apply_to_subcommands() {
        let cli = Cli::parse_from(["overseer", "status", "--json", "--path", "s.json"]);
        assert!(cli.json);
        let Commands::Status(args) = cli.command else {
            panic!("expected status");
        };
        assert_eq!(args.path, Some(PathBuf::from("s.json")));
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn parses_check_config() {
        let cli = Cli::parse_from(["overseer", "check", "config"]);
        assert!(matches!(
            cli.command,
            Commands::Check(CheckCommand::Config(ConfigPathArg { .. }))
        ));
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
