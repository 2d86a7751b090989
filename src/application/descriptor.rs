//! Immutable description of a supervised service.

use std::fmt;
use std::sync::Arc;

use crate::domain::health::ProbeSettings;
use crate::domain::id::ServiceName;
use crate::domain::recovery::RecoveryPolicy;
use crate::port::outbound::service::SupervisedService;

/// Everything the orchestrator needs to know about one service.
///
/// Descriptors are supplied once when the orchestrator is built and never
/// change afterwards.
#[derive(Clone)]
pub struct ServiceDescriptor {
    name: ServiceName,
    dependencies: Vec<ServiceName>,
    service: Arc<dyn SupervisedService>,
    recovery: RecoveryPolicy,
    probe: ProbeSettings,
}

impl ServiceDescriptor {
    /// Describe `service` under `name` with default recovery and probe
    /// settings and no dependencies.
    pub fn new(name: impl Into<ServiceName>, service: Arc<dyn SupervisedService>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            service,
            recovery: RecoveryPolicy::default(),
            probe: ProbeSettings::default(),
        }
    }

    /// Add dependencies. Duplicates are dropped, first occurrence wins.
    #[must_use]
    pub fn depends_on<I, N>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<ServiceName>,
    {
        for dependency in dependencies {
            let dependency = dependency.into();
            if !self.dependencies.contains(&dependency) {
                self.dependencies.push(dependency);
            }
        }
        self
    }

    #[must_use]
    pub fn with_recovery(mut self, recovery: RecoveryPolicy) -> Self {
        self.recovery = recovery;
        self
    }

    #[must_use]
    pub fn with_probe(mut self, probe: ProbeSettings) -> Self {
        self.probe = probe;
        self
    }

    #[must_use]
    pub fn name(&self) -> &ServiceName {
        &self.name
    }

    #[must_use]
    pub fn dependencies(&self) -> &[ServiceName] {
        &self.dependencies
    }

    #[must_use]
    pub fn service(&self) -> &Arc<dyn SupervisedService> {
        &self.service
    }

    #[must_use]
    pub fn recovery(&self) -> &RecoveryPolicy {
        &self.recovery
    }

    #[must_use]
    pub fn probe(&self) -> &ProbeSettings {
        &self.probe
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("recovery", &self.recovery)
            .field("probe", &self.probe)
            .finish_non_exhaustive()
    }
}
