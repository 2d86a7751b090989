//! Per-incarnation health probing.
//!
//! A monitor task is spawned each time a service reaches `Running` with a
//! fresh handle. It waits the probe interval, probes under a timeout, records
//! the outcome in the registry and reports it to the orchestrator's control
//! loop as a [`HealthEvent`]. The task never changes service state itself.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::application::descriptor::ServiceDescriptor;
use crate::application::registry::ServiceRegistry;
use crate::domain::id::ServiceName;
use crate::error::OrchestrationError;
use crate::port::outbound::service::ServiceHandle;

/// Probe outcome delivered to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    /// A probe passed; the failure counter was reset.
    ProbeSucceeded {
        service: ServiceName,
        generation: u64,
    },
    /// A probe failed below the failure threshold.
    ProbeFailed {
        service: ServiceName,
        generation: u64,
        failures: u32,
    },
    /// Consecutive failures reached the failure threshold.
    HealthFailureExceeded {
        service: ServiceName,
        generation: u64,
        failures: u32,
    },
}

impl HealthEvent {
    #[must_use]
    pub fn service(&self) -> &ServiceName {
        match self {
            Self::ProbeSucceeded { service, .. }
            | Self::ProbeFailed { service, .. }
            | Self::HealthFailureExceeded { service, .. } => service,
        }
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        match self {
            Self::ProbeSucceeded { generation, .. }
            | Self::ProbeFailed { generation, .. }
            | Self::HealthFailureExceeded { generation, .. } => *generation,
        }
    }
}

/// Spawns probe loops for running services.
#[derive(Clone)]
pub struct HealthMonitor {
    registry: Arc<ServiceRegistry>,
    events: mpsc::Sender<HealthEvent>,
    tracker: TaskTracker,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        events: mpsc::Sender<HealthEvent>,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            registry,
            events,
            tracker,
        }
    }

    /// Start probing `handle` until `cancel` fires or the control loop goes
    /// away.
    pub fn watch(
        &self,
        descriptor: Arc<ServiceDescriptor>,
        handle: ServiceHandle,
        generation: u64,
        cancel: CancellationToken,
    ) {
        let monitor = self.clone();
        self.tracker.spawn(async move {
            monitor.probe_loop(descriptor, handle, generation, cancel).await;
        });
    }

    async fn probe_loop(
        self,
        descriptor: Arc<ServiceDescriptor>,
        handle: ServiceHandle,
        generation: u64,
        cancel: CancellationToken,
    ) {
        let service = descriptor.name().clone();
        let settings = *descriptor.probe();
        debug!(
            service = %service,
            generation,
            interval_ms = settings.interval.as_millis() as u64,
            "Health monitor started"
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = sleep(settings.interval) => {}
            }

            let probe = timeout(settings.timeout, descriptor.service().health_probe(&handle));
            let outcome = tokio::select! {
                () = cancel.cancelled() => break,
                outcome = probe => outcome,
            };

            let reason = match outcome {
                Ok(Ok(true)) => None,
                Ok(Ok(false)) => Some("reported unhealthy".to_string()),
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some(format!("timed out after {:?}", settings.timeout)),
            };
            let failure = reason.map(|reason| OrchestrationError::Probe {
                service: service.clone(),
                reason,
            });

            let event = match failure {
                None => match self.registry.record_probe_success(&service, generation) {
                    Ok(Some(_)) => HealthEvent::ProbeSucceeded {
                        service: service.clone(),
                        generation,
                    },
                    _ => break,
                },
                Some(error) => {
                    match self
                        .registry
                        .record_probe_failure(&service, generation, &error.to_string())
                    {
                        Ok(Some(failures)) if failures >= settings.failure_threshold => {
                            warn!(
                                service = %service,
                                failures,
                                threshold = settings.failure_threshold,
                                error = %error,
                                "Health failure threshold exceeded"
                            );
                            HealthEvent::HealthFailureExceeded {
                                service: service.clone(),
                                generation,
                                failures,
                            }
                        }
                        Ok(Some(failures)) => {
                            debug!(service = %service, failures, error = %error, "Probe failed");
                            HealthEvent::ProbeFailed {
                                service: service.clone(),
                                generation,
                                failures,
                            }
                        }
                        _ => break,
                    }
                }
            };

            if self.events.send(event).await.is_err() {
                break;
            }
        }

        info!(service = %service, generation, "Health monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::health::ProbeSettings;
    use crate::domain::state::ServiceState;
    use crate::testkit::service::ScriptedService;

    fn probe() -> ProbeSettings {
        ProbeSettings {
            interval: Duration::from_millis(100),
            timeout: Duration::from_millis(50),
            failure_threshold: 2,
        }
    }

    fn running(
        service: Arc<ScriptedService>,
    ) -> (Arc<ServiceRegistry>, Arc<ServiceDescriptor>, ServiceHandle, u64) {
        let registry = Arc::new(ServiceRegistry::new());
        registry
            .register(ServiceDescriptor::new("feed", service).with_probe(probe()))
            .unwrap();
        registry.begin_start("feed").unwrap();
        let handle = ServiceHandle::new(());
        let generation = registry
            .mark_running(
                "feed",
                ServiceState::Starting,
                handle.clone(),
                CancellationToken::new(),
            )
            .unwrap();
        let descriptor = registry.descriptor("feed").unwrap();
        (registry, descriptor, handle, generation)
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_counted_until_threshold() {
        let service = Arc::new(ScriptedService::new().probe_script([false, false, true]));
        let (registry, descriptor, handle, generation) = running(service);
        let (tx, mut rx) = mpsc::channel(8);
        let monitor = HealthMonitor::new(Arc::clone(&registry), tx, TaskTracker::new());
        let cancel = CancellationToken::new();

        monitor.watch(descriptor, handle, generation, cancel.clone());

        assert_eq!(
            rx.recv().await,
            Some(HealthEvent::ProbeFailed {
                service: "feed".into(),
                generation,
                failures: 1,
            })
        );
        assert_eq!(
            rx.recv().await,
            Some(HealthEvent::HealthFailureExceeded {
                service: "feed".into(),
                generation,
                failures: 2,
            })
        );
        assert_eq!(
            rx.recv().await,
            Some(HealthEvent::ProbeSucceeded {
                service: "feed".into(),
                generation,
            })
        );
        assert_eq!(registry.get("feed").unwrap().consecutive_failures(), 0);
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_probe_counts_as_failure() {
        let service = Arc::new(ScriptedService::new().probe_delay(Duration::from_secs(60)));
        let (registry, descriptor, handle, generation) = running(service);
        let (tx, mut rx) = mpsc::channel(8);
        let monitor = HealthMonitor::new(Arc::clone(&registry), tx, TaskTracker::new());

        monitor.watch(descriptor, handle, generation, CancellationToken::new());

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, HealthEvent::ProbeFailed { failures: 1, .. }));
        assert_eq!(
            registry.get("feed").unwrap().last_error(),
            Some("health probe for 'feed' failed: timed out after 50ms")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_loop() {
        let service = Arc::new(ScriptedService::new());
        let (registry, descriptor, handle, generation) = running(Arc::clone(&service));
        let (tx, mut rx) = mpsc::channel(8);
        let tracker = TaskTracker::new();
        let monitor = HealthMonitor::new(registry, tx, tracker.clone());
        let cancel = CancellationToken::new();

        monitor.watch(descriptor, handle, generation, cancel.clone());
        cancel.cancel();
        tracker.close();
        tracker.wait().await;
        drop(monitor);

        assert_eq!(rx.recv().await, None);
        assert_eq!(service.probe_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_incarnation_exits_without_reporting() {
        let service = Arc::new(ScriptedService::new());
        let (registry, descriptor, handle, generation) = running(service);
        let (tx, mut rx) = mpsc::channel(8);
        let tracker = TaskTracker::new();
        let monitor = HealthMonitor::new(registry, tx, tracker.clone());

        monitor.watch(descriptor, handle, generation + 1, CancellationToken::new());
        tracker.close();
        tracker.wait().await;
        drop(monitor);

        assert_eq!(rx.recv().await, None);
    }
}
