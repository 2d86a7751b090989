//! Health probing parameters and the derived system health value.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::state::ServiceState;

/// How a running service is probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSettings {
    /// Wait between probes.
    pub interval: Duration,
    /// Upper bound on a single probe; a hang counts as a failure.
    pub timeout: Duration,
    /// Consecutive failures before the service is declared degraded.
    pub failure_threshold: u32,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(5),
            failure_threshold: 3,
        }
    }
}

/// Aggregate health of the whole supervised system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallHealth {
    /// Every service is running.
    Healthy,
    /// Nothing has failed, but not every service is running.
    Degraded,
    /// At least one service has failed.
    Critical,
}

impl OverallHealth {
    /// Derive the system health from individual service states.
    ///
    /// `Critical` wins over everything; otherwise any state other than
    /// `Running` (degraded, restarting, or still coming up) makes the system
    /// `Degraded`. An empty system is `Healthy`.
    pub fn from_states<I>(states: I) -> Self
    where
        I: IntoIterator<Item = ServiceState>,
    {
        let mut health = Self::Healthy;
        for state in states {
            match state {
                ServiceState::Failed => return Self::Critical,
                ServiceState::Running => {}
                _ => health = Self::Degraded,
            }
        }
        health
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for OverallHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
