//! Application configuration loading and validation.
//!
//! Provides the main [`Config`] struct that aggregates all supervisor
//! settings. Configuration is loaded from a TOML file; every tunable has a
//! documented default.
//!
//! # Example
//!
//! ```no_run
//! use overseer::infrastructure::config::settings::Config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("overseer.toml")?;
//!     config.init_logging();
//!     Ok(())
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use super::logging::LoggingConfig;
use super::service::ServiceConfig;
use super::status::StatusConfig;
use super::supervisor::{ProbeConfig, RestartConfig, SupervisorConfig};
use crate::error::{ConfigError, Result};

/// Default configuration file name.
pub const DEFAULT_CONFIG_PATH: &str = "overseer.toml";

/// Main application configuration.
///
/// Load from a TOML file using [`Config::load`] or parse directly with
/// [`Config::parse_toml`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Logging and tracing configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Timeouts plus default probe and restart settings.
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// Status file written while running.
    #[serde(default)]
    pub status: StatusConfig,

    /// Supervised services, in registration order.
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

impl Config {
    /// Parse configuration from TOML content.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML content is malformed or validation fails.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The TOML content is malformed
    /// - Validation fails
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    /// Initialize the tracing subscriber from the `[logging]` table.
    pub fn init_logging(&self) {
        self.logging.init();
    }

    /// Validate configuration values.
    ///
    /// Dependency existence and cycles are left to the dependency graph.
    fn validate(&self) -> std::result::Result<(), ConfigError> {
        let supervisor = &self.supervisor;
        if supervisor.start_timeout_ms == 0 {
            return Err(invalid("start_timeout_ms", "must be greater than 0"));
        }
        if supervisor.event_channel_capacity == 0 {
            return Err(invalid("event_channel_capacity", "must be greater than 0"));
        }
        validate_probe(&supervisor.probe, "supervisor")?;
        validate_restart(&supervisor.restart, "supervisor")?;

        if self.status.enabled && self.status.interval_secs == 0 {
            return Err(invalid("status.interval_secs", "must be greater than 0"));
        }

        let mut seen = HashSet::new();
        for service in &self.services {
            let name = service.name.trim();
            if name.is_empty() {
                return Err(ConfigError::MissingField {
                    field: "services.name",
                });
            }
            if !seen.insert(name) {
                return Err(invalid(
                    "services.name",
                    format!("duplicate service name '{name}'"),
                ));
            }
            if service.command.trim().is_empty() {
                return Err(invalid(
                    "services.command",
                    format!("service '{name}' has an empty command"),
                ));
            }
            if service.depends_on.iter().any(|dep| dep.trim() == name) {
                return Err(invalid(
                    "services.depends_on",
                    format!("service '{name}' depends on itself"),
                ));
            }
            validate_probe(&service.probe_config(&supervisor.probe), name)?;
            validate_restart(&service.restart_config(&supervisor.restart), name)?;
        }

        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

fn validate_probe(probe: &ProbeConfig, scope: &str) -> std::result::Result<(), ConfigError> {
    if probe.interval_ms == 0 {
        return Err(invalid(
            "probe.interval_ms",
            format!("{scope}: must be greater than 0"),
        ));
    }
    if probe.timeout_ms == 0 {
        return Err(invalid(
            "probe.timeout_ms",
            format!("{scope}: must be greater than 0"),
        ));
    }
    if probe.failure_threshold == 0 {
        return Err(invalid(
            "probe.failure_threshold",
            format!("{scope}: must be at least 1"),
        ));
    }
    Ok(())
}

fn validate_restart(restart: &RestartConfig, scope: &str) -> std::result::Result<(), ConfigError> {
    if restart.base_delay_ms == 0 {
        return Err(invalid(
            "restart.base_delay_ms",
            format!("{scope}: must be greater than 0"),
        ));
    }
    if restart.max_delay_ms < restart.base_delay_ms {
        return Err(invalid(
            "restart.max_delay_ms",
            format!("{scope}: must be >= base_delay_ms"),
        ));
    }
    if !(0.0..=1.0).contains(&restart.jitter) {
        return Err(invalid(
            "restart.jitter",
            format!("{scope}: must be between 0 and 1"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::infrastructure::config::logging::LogFormat;
    use crate::testkit;

    fn invalid_field(content: &str) -> &'static str {
        match Config::parse_toml(content) {
            Err(Error::Config(ConfigError::InvalidValue { field, .. })) => field,
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::parse_toml("").unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.supervisor.probe.interval_ms, 10_000);
        assert_eq!(config.supervisor.restart.max_attempts, 3);
        assert!(config.status.enabled);
        assert!(config.services.is_empty());
    }

    #[test]
    fn testkit_config_parses() {
        let config = Config::parse_toml(testkit::config::toml()).unwrap();
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.services.len(), 2);
        assert_eq!(config.services[1].depends_on, ["state_manager"]);
        assert_eq!(
            config.services[1].probe_addr.as_deref(),
            Some("127.0.0.1:9100")
        );
    }

    #[test]
    fn rejects_zero_failure_threshold() {
        let field = invalid_field("[supervisor.probe]\nfailure_threshold = 0");
        assert_eq!(field, "probe.failure_threshold");
    }

    #[test]
    fn rejects_max_delay_below_base() {
        let field = invalid_field(
            "[supervisor.restart]\nbase_delay_ms = 5000\nmax_delay_ms = 1000",
        );
        assert_eq!(field, "restart.max_delay_ms");
    }

    #[test]
    fn rejects_out_of_range_jitter() {
        assert_eq!(
            invalid_field("[supervisor.restart]\njitter = 1.5"),
            "restart.jitter"
        );
    }

    #[test]
    fn rejects_duplicate_service_names() {
        let field = invalid_field(
            r#"
            [[services]]
            name = "feed"
            command = "a"
            [[services]]
            name = "feed"
            command = "b"
            "#,
        );
        assert_eq!(field, "services.name");
    }

    #[test]
    fn rejects_empty_command() {
        let field = invalid_field("[[services]]\nname = \"feed\"\ncommand = \" \"");
        assert_eq!(field, "services.command");
    }

    #[test]
    fn rejects_invalid_per_service_override() {
        let field = invalid_field(
            r#"
            [[services]]
            name = "feed"
            command = "run"
            [services.probe]
            timeout_ms = 0
            "#,
        );
        assert_eq!(field, "probe.timeout_ms");
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = Config::load("/definitely/not/here/overseer.toml").unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::ReadFile(_))));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = Config::parse_toml("[supervisor\n").unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::Parse(_))));
    }
}
