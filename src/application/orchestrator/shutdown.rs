//! Reverse-order shutdown.

use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::Orchestrator;
use crate::domain::id::ServiceName;
use crate::domain::state::ServiceState;
use crate::error::OrchestrationError;
use crate::port::outbound::service::StopContext;

/// Outcome of [`Orchestrator::shutdown_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Services that reached `Stopped` through a stop request, in stop order.
    pub stopped: Vec<ServiceName>,
    /// Stop calls that timed out or failed, and starts abandoned once the
    /// grace period ran out. The services still end `Stopped`.
    #[serde(serialize_with = "serialize_errors")]
    pub errors: Vec<OrchestrationError>,
    /// Background work still running when the grace period ended.
    pub abandoned_tasks: bool,
}

impl ShutdownReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && !self.abandoned_tasks
    }
}

fn serialize_errors<S>(errors: &[OrchestrationError], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_seq(errors.iter().map(ToString::to_string))
}

pub(super) enum StopOutcome {
    Stopped,
    Skipped,
}

impl Orchestrator {
    /// Stop every service in reverse dependency order.
    ///
    /// Pending probes and backoff waits are cancelled immediately. In-flight
    /// starts get `grace` to finish. Each layer is stopped concurrently and
    /// fully before the layer it depends on; a stop that exceeds `grace` is
    /// reported and the service is still marked `Stopped`.
    pub async fn shutdown_all(&self, grace: Duration) -> ShutdownReport {
        info!(grace_ms = grace.as_millis() as u64, "Shutting down services");
        *self.inner.abandon_after.lock() = grace;
        self.inner.shutdown.cancel();
        self.inner.tasks.close();

        let mut report = ShutdownReport::default();
        if timeout(grace, self.inner.tasks.wait()).await.is_err() {
            warn!(
                pending = self.inner.tasks.len(),
                "Background tasks still running after grace period"
            );
            report.abandoned_tasks = true;
        }
        let abandoned = std::mem::take(&mut *self.inner.starts_in_flight.lock());
        for service in abandoned {
            error!(service = %service, "Start abandoned at shutdown");
            report.errors.push(OrchestrationError::StartupTimeout {
                service,
                timeout: grace,
            });
        }

        for layer in self.inner.layers.iter().rev() {
            let outcomes = join_all(layer.iter().map(|name| self.stop_service(name, grace))).await;
            for (name, outcome) in layer.iter().zip(outcomes) {
                match outcome {
                    Ok(StopOutcome::Stopped) => report.stopped.push(name.clone()),
                    Ok(StopOutcome::Skipped) => {}
                    Err(e) => {
                        error!(service = %name, error = %e, "Stop failed");
                        if matches!(
                            e,
                            OrchestrationError::StopTimeout { .. }
                                | OrchestrationError::StopFailed { .. }
                        ) {
                            report.stopped.push(name.clone());
                        }
                        report.errors.push(e);
                    }
                }
            }
        }

        if report.is_clean() {
            info!(stopped = report.stopped.len(), "Shutdown complete");
        } else {
            warn!(
                stopped = report.stopped.len(),
                errors = report.errors.len(),
                abandoned_tasks = report.abandoned_tasks,
                "Shutdown completed with errors"
            );
        }
        report
    }

    pub(super) async fn stop_service(
        &self,
        name: &ServiceName,
        grace: Duration,
    ) -> Result<StopOutcome, OrchestrationError> {
        let registry = &self.inner.registry;

        let transition = loop {
            let state = registry.state(name)?;
            if !state.is_stoppable() {
                debug!(service = %name, state = %state, "Nothing to stop");
                return Ok(StopOutcome::Skipped);
            }
            match registry.transition(name, state, ServiceState::Stopping) {
                Ok(transition) => break transition,
                Err(OrchestrationError::InvalidTransition { .. }) => continue,
                Err(e) => return Err(e),
            }
        };

        let mut result = Ok(StopOutcome::Stopped);
        if let Some(handle) = transition.released {
            let descriptor = registry.descriptor(name)?;
            let ctx = StopContext {
                service: name.clone(),
                grace,
            };
            debug!(service = %name, "Stopping service");
            result = match timeout(grace, descriptor.service().stop(handle, ctx)).await {
                Ok(Ok(())) => Ok(StopOutcome::Stopped),
                Ok(Err(e)) => Err(OrchestrationError::StopFailed {
                    service: name.clone(),
                    reason: e.to_string(),
                }),
                Err(_) => Err(OrchestrationError::StopTimeout {
                    service: name.clone(),
                    timeout: grace,
                }),
            };
        }

        registry.transition(name, ServiceState::Stopping, ServiceState::Stopped)?;
        if result.is_ok() {
            info!(service = %name, "Service stopped");
        }
        result
    }
}
