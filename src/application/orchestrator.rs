//! Top-level coordinator.
//!
//! Construction, shared state and the health event control loop live here;
//! the lifecycle phases are split out:
//!
//! - `startup` - Layered startup and the retrying launch loop
//! - `recovery` - Degradation, escalation and manual restarts
//! - `shutdown` - Reverse-order shutdown with grace timeouts

mod recovery;
mod shutdown;
mod startup;

pub use shutdown::ShutdownReport;
pub use startup::StartupReport;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::application::descriptor::ServiceDescriptor;
use crate::application::monitor::{HealthEvent, HealthMonitor};
use crate::application::registry::ServiceRegistry;
use crate::application::status::{StatusReporter, SystemStatus};
use crate::domain::graph::DependencyGraph;
use crate::domain::id::ServiceName;
use crate::domain::state::ServiceState;
use crate::error::OrchestrationError;

/// Orchestrator-wide timing and sizing knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    /// Upper bound on a single `start` call.
    pub start_timeout: Duration,
    /// Default grace period for `shutdown_all`.
    pub shutdown_grace: Duration,
    /// Capacity of the health event channel.
    pub event_capacity: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            start_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(10),
            event_capacity: 256,
        }
    }
}

/// Top-level supervisor.
///
/// Cloning is cheap and every clone drives the same set of services. The
/// orchestrator is an explicitly constructed value: build it once at the
/// process entry point and pass it to whatever fronts it.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<ServiceRegistry>,
    graph: DependencyGraph,
    layers: Vec<Vec<ServiceName>>,
    settings: OrchestratorSettings,
    monitor: HealthMonitor,
    events: Mutex<Option<mpsc::Receiver<HealthEvent>>>,
    shutdown: CancellationToken,
    /// Grace granted to in-flight starts once shutdown begins.
    abandon_after: Mutex<Duration>,
    /// Services with a `start` call that has not returned.
    starts_in_flight: Mutex<Vec<ServiceName>>,
    tasks: TaskTracker,
}

impl Orchestrator {
    /// Register `descriptors` and compute the startup layers.
    ///
    /// # Errors
    ///
    /// Fails on duplicate names, dependencies on unregistered services and
    /// dependency cycles. No orchestrator is built in that case.
    pub fn new<I>(
        descriptors: I,
        settings: OrchestratorSettings,
    ) -> Result<Self, OrchestrationError>
    where
        I: IntoIterator<Item = ServiceDescriptor>,
    {
        let registry = Arc::new(ServiceRegistry::new());
        let mut graph = DependencyGraph::new();
        let mut edges = Vec::new();

        for descriptor in descriptors {
            graph.add_node(descriptor.name().clone())?;
            for dependency in descriptor.dependencies() {
                edges.push((descriptor.name().clone(), dependency.clone()));
            }
            registry.register(descriptor)?;
        }
        for (dependent, dependency) in edges {
            graph.add_edge(&dependent, &dependency)?;
        }
        let layers = graph.topological_layers()?;

        let (events_tx, events_rx) = mpsc::channel(settings.event_capacity.max(1));
        let tasks = TaskTracker::new();
        let monitor = HealthMonitor::new(Arc::clone(&registry), events_tx, tasks.clone());

        info!(
            services = registry.len(),
            layers = layers.len(),
            "Orchestrator initialized"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                registry,
                graph,
                layers,
                settings,
                monitor,
                events: Mutex::new(Some(events_rx)),
                shutdown: CancellationToken::new(),
                abandon_after: Mutex::new(settings.shutdown_grace),
                starts_in_flight: Mutex::new(Vec::new()),
                tasks,
            }),
        })
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.inner.registry
    }

    /// Startup layers, dependencies first.
    #[must_use]
    pub fn layers(&self) -> &[Vec<ServiceName>] {
        &self.inner.layers
    }

    #[must_use]
    pub fn settings(&self) -> &OrchestratorSettings {
        &self.inner.settings
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Point-in-time view of every service and the overall health.
    #[must_use]
    pub fn status_snapshot(&self) -> SystemStatus {
        SystemStatus::from_registry(&self.inner.registry)
    }

    /// Read view with the manual restart command path.
    #[must_use]
    pub fn status_reporter(&self) -> StatusReporter {
        StatusReporter::new(self.clone())
    }

    /// Dependencies of `name` that are not currently `Running`.
    fn unmet_dependencies(&self, name: &str) -> Result<Vec<ServiceName>, OrchestrationError> {
        let mut waiting = Vec::new();
        for dependency in self.inner.graph.dependencies_of(name) {
            if self.inner.registry.state(&dependency)? != ServiceState::Running {
                waiting.push(dependency);
            }
        }
        Ok(waiting)
    }

    /// Spawn the single consumer of health events, once.
    fn ensure_control_loop(&self) {
        if self.is_shutting_down() {
            return;
        }
        let Some(mut events) = self.inner.events.lock().take() else {
            return;
        };

        let orchestrator = self.clone();
        self.inner.tasks.spawn(async move {
            debug!("Control loop started");
            loop {
                tokio::select! {
                    () = orchestrator.inner.shutdown.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => orchestrator.handle_health_event(event),
                        None => break,
                    },
                }
            }
            debug!("Control loop stopped");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::service::ScriptedService;

    fn descriptor(name: &str, deps: &[&str]) -> ServiceDescriptor {
        ServiceDescriptor::new(name, ScriptedService::healthy()).depends_on(deps.iter().copied())
    }

    #[test]
    fn construction_computes_layers() {
        let orchestrator = Orchestrator::new(
            [
                descriptor("web_api", &["trading_engine"]),
                descriptor("state_manager", &[]),
                descriptor("trading_engine", &["state_manager"]),
            ],
            OrchestratorSettings::default(),
        )
        .unwrap();

        let layers: Vec<Vec<&str>> = orchestrator
            .layers()
            .iter()
            .map(|layer| layer.iter().map(ServiceName::as_str).collect())
            .collect();
        assert_eq!(
            layers,
            vec![vec!["state_manager"], vec!["trading_engine"], vec!["web_api"]]
        );
    }

    #[test]
    fn cycle_aborts_construction() {
        let result = Orchestrator::new(
            [descriptor("a", &["b"]), descriptor("b", &["a"])],
            OrchestratorSettings::default(),
        );
        assert!(matches!(
            result,
            Err(OrchestrationError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn unknown_dependency_aborts_construction() {
        let result = Orchestrator::new(
            [descriptor("dashboard", &["web_api"])],
            OrchestratorSettings::default(),
        );
        assert!(matches!(
            result,
            Err(OrchestrationError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn duplicate_service_aborts_construction() {
        let result = Orchestrator::new(
            [descriptor("feed", &[]), descriptor("feed", &[])],
            OrchestratorSettings::default(),
        );
        assert!(matches!(
            result,
            Err(OrchestrationError::DuplicateService { .. })
        ));
    }

    #[test]
    fn fresh_orchestrator_reports_everything_stopped() {
        let orchestrator =
            Orchestrator::new([descriptor("feed", &[])], OrchestratorSettings::default()).unwrap();
        let status = orchestrator.status_snapshot();
        assert_eq!(status.services.len(), 1);
        assert_eq!(status.services[0].state, ServiceState::Stopped);
        assert!(!orchestrator.is_shutting_down());
    }
}
