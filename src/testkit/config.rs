//! Canonical test configurations.
//!
//! Single source of truth for settings used across tests, so timing-based
//! tests agree on what "fast" means.

use std::time::Duration;

use crate::application::orchestrator::OrchestratorSettings;
use crate::domain::health::ProbeSettings;
use crate::domain::recovery::RecoveryPolicy;

/// Probe every 100ms with a 50ms timeout; degrade after 2 failures.
pub fn probe() -> ProbeSettings {
    ProbeSettings {
        interval: Duration::from_millis(100),
        timeout: Duration::from_millis(50),
        failure_threshold: 2,
    }
}

/// Deterministic backoff: 10ms doubling up to 80ms, no jitter.
pub fn recovery(max_attempts: u32) -> RecoveryPolicy {
    RecoveryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(80),
        jitter: 0.0,
    }
}

/// Orchestrator settings with short timeouts.
pub fn orchestrator() -> OrchestratorSettings {
    OrchestratorSettings {
        start_timeout: Duration::from_secs(1),
        shutdown_grace: Duration::from_millis(500),
        event_capacity: 64,
    }
}

/// Minimal valid TOML config with a two-service chain.
pub fn toml() -> &'static str {
    r#"
[logging]
level = "debug"
format = "pretty"

[supervisor]
start_timeout_ms = 1000
shutdown_grace_ms = 500

[supervisor.probe]
interval_ms = 100
timeout_ms = 50
failure_threshold = 2

[supervisor.restart]
max_attempts = 2
base_delay_ms = 10
max_delay_ms = 80
jitter = 0.0

[status]
enabled = false

[[services]]
name = "state_manager"
command = "sleep"
args = ["3600"]

[[services]]
name = "market_data"
command = "sleep"
args = ["3600"]
depends_on = ["state_manager"]
probe_addr = "127.0.0.1:9100"
"#
}
