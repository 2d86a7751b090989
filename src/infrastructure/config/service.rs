//! Per-service configuration (`[[services]]` entries).

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use super::supervisor::{ProbeConfig, RestartConfig};
use crate::domain::health::ProbeSettings;
use crate::domain::recovery::RecoveryPolicy;

/// One supervised process.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Unique service name.
    pub name: String,
    /// Program to execute.
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables for the child process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Working directory of the child process.
    #[serde(default)]
    pub workdir: Option<String>,
    /// Services that must be running before this one starts.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Optional TCP address that must accept connections for the service to
    /// count as healthy.
    #[serde(default)]
    pub probe_addr: Option<String>,
    #[serde(default)]
    pub probe: ProbeOverrides,
    #[serde(default)]
    pub restart: RestartOverrides,
}

/// Fields that replace the `[supervisor.probe]` defaults for one service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeOverrides {
    pub interval_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub failure_threshold: Option<u32>,
}

/// Fields that replace the `[supervisor.restart]` defaults for one service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RestartOverrides {
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub jitter: Option<f64>,
}

impl ServiceConfig {
    /// Effective probe configuration given the supervisor defaults.
    #[must_use]
    pub fn probe_config(&self, defaults: &ProbeConfig) -> ProbeConfig {
        ProbeConfig {
            interval_ms: self.probe.interval_ms.unwrap_or(defaults.interval_ms),
            timeout_ms: self.probe.timeout_ms.unwrap_or(defaults.timeout_ms),
            failure_threshold: self
                .probe
                .failure_threshold
                .unwrap_or(defaults.failure_threshold),
        }
    }

    /// Effective restart configuration given the supervisor defaults.
    #[must_use]
    pub fn restart_config(&self, defaults: &RestartConfig) -> RestartConfig {
        RestartConfig {
            max_attempts: self.restart.max_attempts.unwrap_or(defaults.max_attempts),
            base_delay_ms: self.restart.base_delay_ms.unwrap_or(defaults.base_delay_ms),
            max_delay_ms: self.restart.max_delay_ms.unwrap_or(defaults.max_delay_ms),
            jitter: self.restart.jitter.unwrap_or(defaults.jitter),
        }
    }

    #[must_use]
    pub fn probe_settings(&self, defaults: &ProbeConfig) -> ProbeSettings {
        ProbeSettings::from(&self.probe_config(defaults))
    }

    #[must_use]
    pub fn recovery_policy(&self, defaults: &RestartConfig) -> RecoveryPolicy {
        RecoveryPolicy::from(&self.restart_config(defaults))
    }

    /// Probe timeout, used to bound TCP connects.
    #[must_use]
    pub fn probe_timeout(&self, defaults: &ProbeConfig) -> Duration {
        Duration::from_millis(self.probe_config(defaults).timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_only_given_fields() {
        let service: ServiceConfig = toml::from_str(
            r#"
            name = "ai_brain"
            command = "python"
            args = ["-m", "brain"]
            depends_on = ["market_data"]
            [probe]
            failure_threshold = 5
            [restart]
            max_attempts = 1
            "#,
        )
        .unwrap();

        let probe = service.probe_config(&ProbeConfig::default());
        assert_eq!(probe.failure_threshold, 5);
        assert_eq!(probe.interval_ms, 10_000);

        let restart = service.restart_config(&RestartConfig::default());
        assert_eq!(restart.max_attempts, 1);
        assert_eq!(restart.base_delay_ms, 1_000);
        assert_eq!(service.depends_on, ["market_data"]);
    }

    #[test]
    fn minimal_entry_parses() {
        let service: ServiceConfig =
            toml::from_str("name = \"dashboard\"\ncommand = \"serve\"").unwrap();
        assert!(service.args.is_empty());
        assert!(service.env.is_empty());
        assert!(service.probe_addr.is_none());
    }
}
