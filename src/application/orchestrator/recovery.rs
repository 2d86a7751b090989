//! Health event handling, escalation, dependent restarts and manual
//! restarts.

use tracing::{debug, error, info, warn};

use super::shutdown::StopOutcome;
use super::startup::Launch;
use super::Orchestrator;
use crate::application::monitor::HealthEvent;
use crate::domain::id::ServiceName;
use crate::domain::recovery::RetryDecision;
use crate::domain::state::ServiceState;
use crate::error::OrchestrationError;

impl Orchestrator {
    /// Apply one health event. Runs on the control loop only.
    pub(super) fn handle_health_event(&self, event: HealthEvent) {
        let registry = &self.inner.registry;
        let record = match registry.get(event.service()) {
            Ok(record) => record,
            Err(e) => {
                error!(error = %e, "Health event for unregistered service");
                return;
            }
        };
        if record.generation() != event.generation() {
            debug!(service = %event.service(), "Ignoring event from previous incarnation");
            return;
        }

        match event {
            HealthEvent::ProbeSucceeded { service, .. } => {
                if record.state() == ServiceState::Degraded
                    && registry
                        .transition(&service, ServiceState::Degraded, ServiceState::Running)
                        .is_ok()
                {
                    info!(service = %service, "Service recovered");
                    self.start_blocked_dependents(&service);
                }
                if record.retry_attempts() > 0
                    && matches!(record.state(), ServiceState::Running | ServiceState::Degraded)
                {
                    if let Err(e) = registry.reset_attempts(&service) {
                        debug!(service = %service, error = %e, "Could not reset attempts");
                    }
                }
            }
            HealthEvent::ProbeFailed { .. } => {}
            HealthEvent::HealthFailureExceeded {
                service, failures, ..
            } => match record.state() {
                ServiceState::Running => {
                    if registry
                        .transition(&service, ServiceState::Running, ServiceState::Degraded)
                        .is_ok()
                    {
                        warn!(service = %service, failures, "Service degraded");
                    }
                }
                ServiceState::Degraded => self.escalate(&service, record.retry_attempts()),
                state => debug!(service = %service, state = %state, "Threshold event ignored"),
            },
        }
    }

    /// Failures persisted while degraded: restart or give up.
    fn escalate(&self, service: &ServiceName, attempt: u32) {
        let registry = &self.inner.registry;
        let Ok(descriptor) = registry.descriptor(service) else {
            return;
        };

        match descriptor.recovery().decide(attempt) {
            RetryDecision::Exhausted => {
                let Ok(transition) =
                    registry.transition(service, ServiceState::Degraded, ServiceState::Failed)
                else {
                    return;
                };
                self.report_exhausted(service, attempt);
                if let Some(handle) = transition.released {
                    let orchestrator = self.clone();
                    self.inner.tasks.spawn(async move {
                        orchestrator.release(&descriptor, handle).await;
                    });
                }
            }
            RetryDecision::Retry { delay } => {
                let Ok(transition) =
                    registry.transition(service, ServiceState::Degraded, ServiceState::Restarting)
                else {
                    return;
                };
                let used = registry.record_attempt(service).unwrap_or(attempt + 1);
                warn!(
                    service = %service,
                    attempt = used,
                    delay_ms = delay.as_millis() as u64,
                    "Restarting degraded service"
                );

                let orchestrator = self.clone();
                let service = service.clone();
                self.inner.tasks.spawn(async move {
                    if let Some(handle) = transition.released {
                        orchestrator.release(&descriptor, handle).await;
                    }
                    if orchestrator.backoff(delay).await {
                        let from = ServiceState::Restarting;
                        orchestrator.run_launch(&service, from, Launch::Restart).await;
                    }
                });
            }
        }
    }

    /// Restart a `Failed` service with a fresh retry budget.
    ///
    /// Returns once the service has entered `Starting`; the start itself
    /// runs in the background.
    ///
    /// # Errors
    ///
    /// - [`OrchestrationError::InvalidTransition`] unless the service is
    ///   `Failed`; nothing changes in that case
    /// - [`OrchestrationError::DependenciesNotReady`] while a dependency is
    ///   not running
    /// - [`OrchestrationError::ShuttingDown`] once shutdown has begun
    pub fn restart_service(&self, name: &str) -> Result<(), OrchestrationError> {
        if self.is_shutting_down() {
            return Err(OrchestrationError::ShuttingDown);
        }

        let registry = &self.inner.registry;
        let state = registry.state(name)?;
        if state != ServiceState::Failed {
            return Err(OrchestrationError::InvalidTransition {
                service: name.into(),
                from: ServiceState::Failed,
                to: ServiceState::Starting,
                actual: state,
            });
        }

        let waiting_on = self.unmet_dependencies(name)?;
        if !waiting_on.is_empty() {
            return Err(OrchestrationError::DependenciesNotReady {
                service: name.into(),
                waiting_on,
            });
        }

        registry.begin_manual_restart(name)?;
        info!(service = %name, "Manual restart requested");
        self.ensure_control_loop();

        let orchestrator = self.clone();
        let service = ServiceName::from(name);
        self.inner.tasks.spawn(async move {
            let from = ServiceState::Starting;
            orchestrator.run_launch(&service, from, Launch::Restart).await;
        });
        Ok(())
    }

    /// Stop and relaunch the running dependents of `name` after it came back
    /// from a restart. Each relaunched dependent does the same for its own
    /// dependents once it is running again.
    pub(super) fn restart_running_dependents(&self, name: &ServiceName) {
        if self.is_shutting_down() {
            return;
        }
        for dependent in self.inner.graph.dependents_of(name) {
            let Ok(state) = self.inner.registry.state(&dependent) else {
                continue;
            };
            if !matches!(state, ServiceState::Running | ServiceState::Degraded) {
                continue;
            }
            info!(service = %dependent, dependency = %name, "Restarting dependent service");

            let orchestrator = self.clone();
            self.inner.tasks.spawn(async move {
                let grace = *orchestrator.inner.abandon_after.lock();
                match orchestrator.stop_service(&dependent, grace).await {
                    Ok(StopOutcome::Stopped) => {}
                    Ok(StopOutcome::Skipped) => return,
                    Err(e) => {
                        warn!(service = %dependent, error = %e, "Stop before restart failed");
                    }
                }
                orchestrator.start_if_ready(&dependent, Launch::Restart).await;
            });
        }
    }
}
