//! Service lifecycle states and the legal transitions between them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a supervised service.
///
/// Every service holds exactly one state at a time. `Stopped` is the initial
/// state; `Failed` is terminal until an operator requests a manual restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Stopped,
    Starting,
    Running,
    Degraded,
    Restarting,
    Failed,
    Stopping,
}

impl ServiceState {
    /// Stable lowercase label used in logs and command output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Degraded => "degraded",
            Self::Restarting => "restarting",
            Self::Failed => "failed",
            Self::Stopping => "stopping",
        }
    }

    /// Whether the lifecycle table allows moving from `self` to `to`.
    ///
    /// `Restarting -> Restarting` is legal: a retry that fails with attempts
    /// remaining stays in `Restarting` and records another transition.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        use ServiceState::*;

        matches!(
            (self, to),
            (Stopped, Starting)
                | (Starting, Running)
                | (Starting, Restarting)
                | (Starting, Failed)
                | (Starting, Stopping)
                | (Running, Degraded)
                | (Running, Stopping)
                | (Degraded, Running)
                | (Degraded, Restarting)
                | (Degraded, Failed)
                | (Degraded, Stopping)
                | (Restarting, Running)
                | (Restarting, Restarting)
                | (Restarting, Failed)
                | (Restarting, Stopping)
                | (Stopping, Stopped)
                | (Failed, Starting)
        )
    }

    /// Whether a service in this state may hold a running handle.
    #[must_use]
    pub const fn holds_handle(self) -> bool {
        matches!(
            self,
            Self::Starting | Self::Running | Self::Degraded | Self::Restarting
        )
    }

    /// Whether a stop request applies to a service in this state.
    #[must_use]
    pub const fn is_stoppable(self) -> bool {
        self.holds_handle()
    }

    /// Whether the health monitor of the current incarnation must stop.
    #[must_use]
    pub const fn ends_monitoring(self) -> bool {
        matches!(
            self,
            Self::Stopping | Self::Stopped | Self::Failed | Self::Restarting
        )
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
