//! Supervisor-wide timing, probe and restart configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::application::orchestrator::OrchestratorSettings;
use crate::domain::health::ProbeSettings;
use crate::domain::recovery::RecoveryPolicy;

/// `[supervisor]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorConfig {
    /// Upper bound on a single service start (milliseconds).
    #[serde(default = "default_start_timeout_ms")]
    pub start_timeout_ms: u64,
    /// Grace period for stops and in-flight starts at shutdown (milliseconds).
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    /// Capacity of the health event channel.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
    /// Default probe settings for every service.
    #[serde(default)]
    pub probe: ProbeConfig,
    /// Default restart policy for every service.
    #[serde(default)]
    pub restart: RestartConfig,
}

const fn default_start_timeout_ms() -> u64 {
    30_000
}

const fn default_shutdown_grace_ms() -> u64 {
    10_000
}

const fn default_event_channel_capacity() -> usize {
    256
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            start_timeout_ms: default_start_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            event_channel_capacity: default_event_channel_capacity(),
            probe: ProbeConfig::default(),
            restart: RestartConfig::default(),
        }
    }
}

impl SupervisorConfig {
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    #[must_use]
    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            start_timeout: Duration::from_millis(self.start_timeout_ms),
            shutdown_grace: self.shutdown_grace(),
            event_capacity: self.event_channel_capacity,
        }
    }
}

/// Health probe configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    /// Wait between probes (milliseconds).
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Upper bound on one probe (milliseconds).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Consecutive failures before a service is degraded.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

const fn default_interval_ms() -> u64 {
    10_000
}

const fn default_timeout_ms() -> u64 {
    5_000
}

const fn default_failure_threshold() -> u32 {
    3
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            timeout_ms: default_timeout_ms(),
            failure_threshold: default_failure_threshold(),
        }
    }
}

impl From<&ProbeConfig> for ProbeSettings {
    fn from(config: &ProbeConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.interval_ms),
            timeout: Duration::from_millis(config.timeout_ms),
            failure_threshold: config.failure_threshold,
        }
    }
}

/// Restart policy configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RestartConfig {
    /// Automatic retries before a service is marked failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry (milliseconds).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Cap on the exponential delay (milliseconds).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Random jitter fraction applied to each delay.
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_base_delay_ms() -> u64 {
    1_000
}

const fn default_max_delay_ms() -> u64 {
    30_000
}

const fn default_jitter() -> f64 {
    0.1
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

impl From<&RestartConfig> for RecoveryPolicy {
    fn from(config: &RestartConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = SupervisorConfig::default();
        assert_eq!(config.start_timeout_ms, 30_000);
        assert_eq!(config.shutdown_grace_ms, 10_000);
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(ProbeSettings::from(&config.probe), ProbeSettings::default());
        assert_eq!(
            RecoveryPolicy::from(&config.restart),
            RecoveryPolicy::default()
        );
    }

    #[test]
    fn partial_table_fills_defaults() {
        let config: SupervisorConfig = toml::from_str(
            r#"
            start_timeout_ms = 500
            [restart]
            max_attempts = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.start_timeout_ms, 500);
        assert_eq!(config.shutdown_grace_ms, 10_000);
        assert_eq!(config.restart.max_attempts, 5);
        assert_eq!(config.restart.base_delay_ms, 1_000);
        assert_eq!(config.probe.failure_threshold, 3);
    }

    #[test]
    fn orchestrator_settings_convert_units() {
        let settings = SupervisorConfig::default().orchestrator_settings();
        assert_eq!(settings.start_timeout, Duration::from_secs(30));
        assert_eq!(settings.shutdown_grace, Duration::from_secs(10));
        assert_eq!(settings.event_capacity, 256);
    }
}
