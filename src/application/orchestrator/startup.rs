//! Layered startup and the per-service launch loop.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use super::Orchestrator;
use crate::application::descriptor::ServiceDescriptor;
use crate::domain::id::ServiceName;
use crate::domain::recovery::RetryDecision;
use crate::domain::state::ServiceState;
use crate::error::OrchestrationError;
use crate::port::outbound::service::{ServiceHandle, StartContext, StopContext};

/// Where every service ended up after [`Orchestrator::start_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StartupReport {
    pub running: Vec<ServiceName>,
    pub failed: Vec<ServiceName>,
    /// Services left `Stopped` because a dependency is not running.
    pub blocked: Vec<ServiceName>,
    /// Services still degraded or recovering when startup returned.
    pub pending: Vec<ServiceName>,
}

impl StartupReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.blocked.is_empty() && self.pending.is_empty()
    }
}

/// Why a service is being launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Launch {
    /// First start, during startup or once a blocking dependency runs.
    Initial,
    /// Manual restart, or relaunch after a dependency was restarted.
    Restart,
}

impl Orchestrator {
    /// Start every service in dependency order.
    ///
    /// Each layer starts concurrently on the orchestrator's task tracker and
    /// is awaited until every member is `Running` or `Failed`. A service
    /// whose dependencies are not all running stays `Stopped` and is
    /// reported as blocked.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::ShuttingDown`] once shutdown has begun.
    pub async fn start_all(&self) -> Result<StartupReport, OrchestrationError> {
        if self.is_shutting_down() {
            return Err(OrchestrationError::ShuttingDown);
        }
        self.ensure_control_loop();

        for (index, layer) in self.inner.layers.iter().enumerate() {
            if self.is_shutting_down() {
                warn!(layer = index, "Startup interrupted by shutdown");
                break;
            }
            debug!(layer = index, services = layer.len(), "Starting layer");
            let launches: Vec<_> = layer
                .iter()
                .map(|name| {
                    let orchestrator = self.clone();
                    let name = name.clone();
                    self.inner.tasks.spawn(async move {
                        orchestrator.start_if_ready(&name, Launch::Initial).await;
                    })
                })
                .collect();
            for outcome in join_all(launches).await {
                if let Err(e) = outcome {
                    error!(layer = index, error = %e, "Launch task failed");
                }
            }
        }

        let report = self.startup_report();
        if report.is_complete() {
            info!(running = report.running.len(), "All services running");
        } else {
            warn!(
                running = report.running.len(),
                failed = report.failed.len(),
                blocked = report.blocked.len(),
                pending = report.pending.len(),
                "Startup finished with services not running"
            );
        }
        Ok(report)
    }

    fn startup_report(&self) -> StartupReport {
        let mut report = StartupReport::default();
        for service in self.inner.registry.snapshot() {
            match service.state {
                ServiceState::Running => report.running.push(service.name),
                ServiceState::Failed => report.failed.push(service.name),
                ServiceState::Stopped if !service.blocked_on.is_empty() => {
                    report.blocked.push(service.name);
                }
                _ => report.pending.push(service.name),
            }
        }
        report
    }

    /// Start `name` if it is `Stopped` and every dependency is running;
    /// otherwise record what it waits on.
    pub(super) async fn start_if_ready(&self, name: &ServiceName, kind: Launch) {
        if self.is_shutting_down() {
            return;
        }

        match self.unmet_dependencies(name) {
            Ok(waiting) if !waiting.is_empty() => {
                let names: Vec<&str> = waiting.iter().map(ServiceName::as_str).collect();
                warn!(service = %name, waiting_on = ?names, "Service blocked on dependencies");
                if let Err(e) = self.inner.registry.set_blocked(name, waiting) {
                    error!(service = %name, error = %e, "Failed to record blocked service");
                }
                return;
            }
            Ok(_) => {}
            Err(e) => {
                error!(service = %name, error = %e, "Dependency lookup failed");
                return;
            }
        }

        if self.inner.registry.begin_start(name).is_err() {
            debug!(service = %name, "Service not stopped, skipping start");
            return;
        }
        self.run_launch(name, ServiceState::Starting, kind).await;
    }

    /// Drive a launch and log how it ended.
    pub(super) async fn run_launch(&self, name: &ServiceName, from: ServiceState, kind: Launch) {
        match self.launch(name, from, kind).await {
            Ok(state) => debug!(service = %name, state = %state, "Launch finished"),
            Err(e) if self.is_shutting_down() => {
                debug!(service = %name, error = %e, "Launch cut short by shutdown");
            }
            Err(e) => error!(service = %name, error = %e, "Launch aborted"),
        }
    }

    /// Start attempts until the service is `Running` or the retry budget is
    /// spent. `from` is the state the service is in when this is called,
    /// either `Starting` or `Restarting`.
    async fn launch(
        &self,
        name: &ServiceName,
        mut from: ServiceState,
        kind: Launch,
    ) -> Result<ServiceState, OrchestrationError> {
        let registry = &self.inner.registry;
        let descriptor = registry.descriptor(name)?;
        let mut restarted = kind == Launch::Restart;

        loop {
            let attempt = registry.get(name)?.retry_attempts();
            let error = match self.attempt_start(&descriptor, attempt).await {
                Ok(handle) => {
                    return self
                        .promote(&descriptor, from, handle, attempt, restarted)
                        .await;
                }
                Err(error) => error,
            };

            registry.record_error(name, &error.to_string())?;
            if self.is_shutting_down() {
                return Err(error);
            }
            warn!(service = %name, attempt, error = %error, "Start attempt failed");

            match descriptor.recovery().decide(attempt) {
                RetryDecision::Exhausted => {
                    registry.transition(name, from, ServiceState::Failed)?;
                    self.report_exhausted(name, attempt);
                    return Ok(ServiceState::Failed);
                }
                RetryDecision::Retry { delay } => {
                    registry.transition(name, from, ServiceState::Restarting)?;
                    let used = registry.record_attempt(name)?;
                    info!(
                        service = %name,
                        attempt = used,
                        delay_ms = delay.as_millis() as u64,
                        "Scheduling restart"
                    );
                    from = ServiceState::Restarting;
                    restarted = true;
                    if !self.backoff(delay).await {
                        return Err(OrchestrationError::ShuttingDown);
                    }
                }
            }
        }
    }

    /// Install a freshly started handle and begin monitoring it. A service
    /// that came back from a restart also restarts its running dependents.
    async fn promote(
        &self,
        descriptor: &Arc<ServiceDescriptor>,
        from: ServiceState,
        handle: ServiceHandle,
        attempt: u32,
        restarted: bool,
    ) -> Result<ServiceState, OrchestrationError> {
        let name = descriptor.name();
        let monitor = self.inner.shutdown.child_token();

        match self
            .inner
            .registry
            .mark_running(name, from, handle.clone(), monitor.clone())
        {
            Ok(generation) => {
                info!(service = %name, attempt, generation, "Service running");
                self.inner
                    .monitor
                    .watch(Arc::clone(descriptor), handle, generation, monitor);
                self.start_blocked_dependents(name);
                if restarted {
                    self.restart_running_dependents(name);
                }
                Ok(ServiceState::Running)
            }
            Err(e) => {
                warn!(service = %name, error = %e, "Started service was superseded, stopping it");
                self.release(descriptor, handle).await;
                Err(e)
            }
        }
    }

    /// One bounded call to `start`.
    ///
    /// When shutdown begins mid-start the call gets the shutdown grace
    /// period to finish before it is abandoned. An abandoned start stays in
    /// `starts_in_flight` for the shutdown report.
    async fn attempt_start(
        &self,
        descriptor: &ServiceDescriptor,
        attempt: u32,
    ) -> Result<ServiceHandle, OrchestrationError> {
        let service = descriptor.name().clone();
        let start_timeout = self.inner.settings.start_timeout;
        let ctx = StartContext {
            service: service.clone(),
            attempt,
            cancellation: self.inner.shutdown.child_token(),
        };

        debug!(service = %service, attempt, "Starting service");
        self.inner.starts_in_flight.lock().push(service.clone());
        let start = timeout(start_timeout, descriptor.service().start(ctx));
        tokio::pin!(start);

        let outcome = tokio::select! {
            outcome = &mut start => Some(outcome),
            () = self.inner.shutdown.cancelled() => {
                let grace = *self.inner.abandon_after.lock();
                timeout(grace, &mut start).await.ok()
            }
        };
        if outcome.is_some() {
            let mut in_flight = self.inner.starts_in_flight.lock();
            if let Some(index) = in_flight.iter().position(|name| *name == service) {
                in_flight.swap_remove(index);
            }
        }

        match outcome {
            Some(Ok(Ok(handle))) => Ok(handle),
            Some(Ok(Err(e))) => Err(OrchestrationError::StartFailed {
                service,
                reason: e.to_string(),
            }),
            Some(Err(_)) => Err(OrchestrationError::StartupTimeout {
                service,
                timeout: start_timeout,
            }),
            None => {
                let grace = *self.inner.abandon_after.lock();
                let grace_ms = grace.as_millis() as u64;
                warn!(service = %service, grace_ms, "Abandoned in-flight start");
                Err(OrchestrationError::StartupTimeout {
                    service,
                    timeout: grace,
                })
            }
        }
    }

    /// Sleep for `delay`; `false` if shutdown interrupted the wait.
    pub(super) async fn backoff(&self, delay: Duration) -> bool {
        tokio::select! {
            () = self.inner.shutdown.cancelled() => false,
            () = sleep(delay) => true,
        }
    }

    /// Stop a handle that is no longer tracked by the registry.
    pub(super) async fn release(&self, descriptor: &ServiceDescriptor, handle: ServiceHandle) {
        let grace = *self.inner.abandon_after.lock();
        let ctx = StopContext {
            service: descriptor.name().clone(),
            grace,
        };
        match timeout(grace, descriptor.service().stop(handle, ctx)).await {
            Ok(Ok(())) => debug!(service = %descriptor.name(), "Released stale handle"),
            Ok(Err(e)) => {
                warn!(service = %descriptor.name(), error = %e, "Failed to release handle");
            }
            Err(_) => warn!(service = %descriptor.name(), "Timed out releasing handle"),
        }
    }

    /// Start dependents that were blocked on `name` and are now unblocked.
    pub(super) fn start_blocked_dependents(&self, name: &ServiceName) {
        if self.is_shutting_down() {
            return;
        }
        for dependent in self.inner.graph.dependents_of(name) {
            let Ok(record) = self.inner.registry.get(&dependent) else {
                continue;
            };
            if record.state() != ServiceState::Stopped || record.blocked_on().is_empty() {
                continue;
            }
            info!(
                service = %dependent,
                dependency = %name,
                "Dependency running, starting blocked service"
            );
            let orchestrator = self.clone();
            self.inner.tasks.spawn(async move {
                orchestrator.start_if_ready(&dependent, Launch::Initial).await;
            });
        }
    }

    /// Operator-visible alert for a service that ran out of retries.
    pub(super) fn report_exhausted(&self, name: &ServiceName, attempts: u32) {
        let error = OrchestrationError::RecoveryExhausted {
            service: name.clone(),
            attempts,
        };
        error!(service = %name, attempts, "{error}; manual restart required");
        if let Err(e) = self.inner.registry.record_error(name, &error.to_string()) {
            debug!(service = %name, error = %e, "Could not record exhaustion");
        }
    }
}
