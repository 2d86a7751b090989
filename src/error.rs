use std::time::Duration;

use thiserror::Error;

use crate::domain::id::ServiceName;
use crate::domain::state::ServiceState;

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
}

/// Failures reported by a supervised service through its lifecycle contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("start failed: {0}")]
    Start(String),

    #[error("stop failed: {0}")]
    Stop(String),

    #[error("probe failed: {0}")]
    Probe(String),
}

/// Orchestration errors: graph construction, registry access, state machine
/// violations and per-service lifecycle failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestrationError {
    #[error("dependency cycle detected: {}", format_cycle(.cycle))]
    CyclicDependency { cycle: Vec<ServiceName> },

    #[error("service '{service}' depends on unknown service '{dependency}'")]
    UnknownDependency {
        service: ServiceName,
        dependency: ServiceName,
    },

    #[error("service '{name}' is already registered")]
    DuplicateService { name: ServiceName },

    #[error("unknown service '{name}'")]
    UnknownService { name: ServiceName },

    #[error("invalid transition for '{service}': {from} -> {to} (current state is {actual})")]
    InvalidTransition {
        service: ServiceName,
        from: ServiceState,
        to: ServiceState,
        actual: ServiceState,
    },

    #[error("service '{service}' did not start within {timeout:?}")]
    StartupTimeout {
        service: ServiceName,
        timeout: Duration,
    },

    #[error("service '{service}' failed to start: {reason}")]
    StartFailed { service: ServiceName, reason: String },

    #[error("health probe for '{service}' failed: {reason}")]
    Probe { service: ServiceName, reason: String },

    #[error("service '{service}' exhausted {attempts} recovery attempts")]
    RecoveryExhausted { service: ServiceName, attempts: u32 },

    #[error("service '{service}' did not stop within {timeout:?}")]
    StopTimeout {
        service: ServiceName,
        timeout: Duration,
    },

    #[error("service '{service}' failed to stop: {reason}")]
    StopFailed { service: ServiceName, reason: String },

    #[error("service '{service}' cannot start, dependencies not running: {}", format_names(.waiting_on))]
    DependenciesNotReady {
        service: ServiceName,
        waiting_on: Vec<ServiceName>,
    },

    #[error("orchestrator is shutting down")]
    ShuttingDown,
}

fn format_cycle(cycle: &[ServiceName]) -> String {
    cycle
        .iter()
        .map(ServiceName::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn format_names(names: &[ServiceName]) -> String {
    names
        .iter()
        .map(ServiceName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
