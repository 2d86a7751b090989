//! Read-only system status and the manual restart command path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::application::orchestrator::Orchestrator;
use crate::application::registry::ServiceRegistry;
use crate::domain::health::OverallHealth;
use crate::domain::id::ServiceName;
use crate::domain::state::ServiceState;
use crate::error::OrchestrationError;

/// Status of one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub name: ServiceName,
    pub state: ServiceState,
    pub consecutive_failures: u32,
    pub retry_attempts: u32,
    pub restarts: u32,
    /// Milliseconds since the last state transition.
    pub since_transition_ms: u64,
    pub last_transition_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_probe_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked_on: Vec<ServiceName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl ServiceStatus {
    /// Seconds since the service last reached `Running`, if it is up.
    #[must_use]
    pub fn uptime_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        self.started_at
            .map(|started| (now - started).num_seconds().max(0))
    }
}

/// Point-in-time view of the whole system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub overall: OverallHealth,
    pub taken_at: DateTime<Utc>,
    pub services: Vec<ServiceStatus>,
}

impl SystemStatus {
    /// Build from one consistent registry snapshot.
    #[must_use]
    pub fn from_registry(registry: &ServiceRegistry) -> Self {
        let services: Vec<ServiceStatus> = registry
            .snapshot()
            .into_iter()
            .map(|s| ServiceStatus {
                name: s.name,
                state: s.state,
                consecutive_failures: s.consecutive_failures,
                retry_attempts: s.retry_attempts,
                restarts: s.restarts,
                since_transition_ms: u64::try_from(s.since_transition.as_millis())
                    .unwrap_or(u64::MAX),
                last_transition_at: s.last_transition_at,
                started_at: s.started_at,
                last_probe_at: s.last_probe_at,
                blocked_on: s.blocked_on,
                last_error: s.last_error,
            })
            .collect();

        Self {
            overall: OverallHealth::from_states(services.iter().map(|s| s.state)),
            taken_at: Utc::now(),
            services,
        }
    }

    #[must_use]
    pub fn service(&self, name: &str) -> Option<&ServiceStatus> {
        self.services.iter().find(|s| s.name.as_str() == name)
    }

    /// Number of services in `state`.
    #[must_use]
    pub fn count(&self, state: ServiceState) -> usize {
        self.services.iter().filter(|s| s.state == state).count()
    }
}

/// Read view over a running orchestrator.
#[derive(Clone)]
pub struct StatusReporter {
    orchestrator: Orchestrator,
}

impl StatusReporter {
    #[must_use]
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    #[must_use]
    pub fn snapshot(&self) -> SystemStatus {
        SystemStatus::from_registry(self.orchestrator.registry())
    }

    #[must_use]
    pub fn overall_health(&self) -> OverallHealth {
        self.snapshot().overall
    }

    /// Ask for a `Failed` service to be started again.
    ///
    /// # Errors
    ///
    /// Rejected with [`OrchestrationError::InvalidTransition`] unless the
    /// service is `Failed`. See [`Orchestrator::restart_service`].
    pub fn request_manual_restart(&self, name: &str) -> Result<(), OrchestrationError> {
        self.orchestrator.restart_service(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::descriptor::ServiceDescriptor;
    use crate::application::orchestrator::OrchestratorSettings;
    use crate::testkit::service::ScriptedService;

    fn orchestrator(names: &[&str]) -> Orchestrator {
        Orchestrator::new(
            names
                .iter()
                .map(|name| ServiceDescriptor::new(*name, ScriptedService::healthy())),
            OrchestratorSettings::default(),
        )
        .unwrap()
    }

    #[test]
    fn empty_system_is_healthy() {
        let reporter = orchestrator(&[]).status_reporter();
        let status = reporter.snapshot();
        assert!(status.services.is_empty());
        assert_eq!(status.overall, OverallHealth::Healthy);
    }

    #[test]
    fn stopped_services_make_the_system_degraded() {
        let status = orchestrator(&["feed", "api"]).status_snapshot();
        assert_eq!(status.overall, OverallHealth::Degraded);
        assert_eq!(status.count(ServiceState::Stopped), 2);
        assert!(status.service("api").is_some());
        assert!(status.service("ghost").is_none());
    }

    #[test]
    fn failed_service_makes_the_system_critical() {
        let orchestrator = orchestrator(&["feed", "api"]);
        let registry = orchestrator.registry();
        registry.begin_start("feed").unwrap();
        registry
            .transition("feed", ServiceState::Starting, ServiceState::Failed)
            .unwrap();

        assert_eq!(
            orchestrator.status_reporter().overall_health(),
            OverallHealth::Critical
        );
    }

    #[tokio::test]
    async fn manual_restart_of_stopped_service_is_rejected() {
        let reporter = orchestrator(&["feed"]).status_reporter();
        let err = reporter.request_manual_restart("feed").unwrap_err();
        assert!(matches!(
            err,
            OrchestrationError::InvalidTransition {
                actual: ServiceState::Stopped,
                ..
            }
        ));
        assert_eq!(
            reporter.snapshot().service("feed").unwrap().state,
            ServiceState::Stopped
        );
    }

    #[test]
    fn status_serializes_to_snake_case() {
        let status = orchestrator(&["feed"]).status_snapshot();
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["overall"], "degraded");
        assert_eq!(json["services"][0]["state"], "stopped");
        assert!(json["services"][0].get("last_error").is_none());
    }

    #[test]
    fn uptime_is_measured_from_start() {
        let mut status = orchestrator(&["feed"]).status_snapshot().services.remove(0);
        let now = Utc::now();
        assert_eq!(status.uptime_secs(now), None);
        status.started_at = Some(now - chrono::Duration::seconds(90));
        assert_eq!(status.uptime_secs(now), Some(90));
    }
}
