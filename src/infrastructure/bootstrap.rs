//! Composition root: turns a [`Config`] into a ready [`Orchestrator`].

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::adapter::outbound::process::{CommandService, CommandSpec};
use crate::application::descriptor::ServiceDescriptor;
use crate::application::orchestrator::Orchestrator;
use crate::error::Result;
use crate::infrastructure::config::service::ServiceConfig;
use crate::infrastructure::config::settings::Config;
use crate::infrastructure::config::supervisor::SupervisorConfig;

/// Build the command spec for one configured service.
#[must_use]
pub fn command_spec(service: &ServiceConfig, supervisor: &SupervisorConfig) -> CommandSpec {
    let mut spec = CommandSpec::new(service.command.clone()).args(service.args.clone());
    spec.env = service.env.clone();
    spec.workdir = service.workdir.as_ref().map(PathBuf::from);
    if let Some(addr) = &service.probe_addr {
        spec = spec.probe_addr(addr.clone(), service.probe_timeout(&supervisor.probe));
    }
    spec
}

/// Build one descriptor per configured service, in configuration order.
#[must_use]
pub fn build_descriptors(config: &Config) -> Vec<ServiceDescriptor> {
    let supervisor = &config.supervisor;
    config
        .services
        .iter()
        .map(|service| {
            let process = CommandService::new(command_spec(service, supervisor));
            debug!(
                service = %service.name,
                command = %service.command,
                depends_on = ?service.depends_on,
                "Descriptor built"
            );
            ServiceDescriptor::new(service.name.trim(), Arc::new(process))
                .depends_on(service.depends_on.iter().map(|dep| dep.trim()))
                .with_probe(service.probe_settings(&supervisor.probe))
                .with_recovery(service.recovery_policy(&supervisor.restart))
        })
        .collect()
}

/// Build the orchestrator for `config`.
///
/// # Errors
///
/// Returns an error if the dependency graph is invalid: an unknown
/// dependency, a duplicate service or a cycle.
pub fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let orchestrator = Orchestrator::new(
        build_descriptors(config),
        config.supervisor.orchestrator_settings(),
    )?;
    Ok(orchestrator)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::{Error, OrchestrationError};
    use crate::testkit::config as fixtures;

    #[test]
    fn descriptors_follow_config_order_and_overrides() {
        let config = Config::parse_toml(fixtures::toml()).unwrap();
        let descriptors = build_descriptors(&config);

        let names: Vec<&str> = descriptors.iter().map(|d| d.name().as_str()).collect();
        assert_eq!(names, vec!["state_manager", "market_data"]);
        assert_eq!(
            descriptors[1]
                .dependencies()
                .iter()
                .map(|d| d.as_str())
                .collect::<Vec<_>>(),
            vec!["state_manager"]
        );
    }

    #[test]
    fn command_spec_carries_probe_address() {
        let config = Config::parse_toml(fixtures::toml()).unwrap();
        let spec = command_spec(&config.services[1], &config.supervisor);

        assert_eq!(spec.probe_addr.as_deref(), Some("127.0.0.1:9100"));
        assert_eq!(
            spec.probe_timeout,
            Duration::from_millis(config.supervisor.probe.timeout_ms)
        );
        assert!(command_spec(&config.services[0], &config.supervisor)
            .probe_addr
            .is_none());
    }

    #[test]
    fn orchestrator_layers_follow_dependencies() {
        let config = Config::parse_toml(fixtures::toml()).unwrap();
        let orchestrator = build_orchestrator(&config).unwrap();

        let layers: Vec<Vec<&str>> = orchestrator
            .layers()
            .iter()
            .map(|layer| layer.iter().map(|n| n.as_str()).collect())
            .collect();
        assert_eq!(layers, vec![vec!["state_manager"], vec!["market_data"]]);
    }

    #[test]
    fn names_and_dependencies_are_trimmed() {
        let config = Config::parse_toml(
            r#"
            [[services]]
            name = " state_manager "
            command = "true"

            [[services]]
            name = "market_data"
            command = "true"
            depends_on = [" state_manager"]
            "#,
        )
        .unwrap();

        let orchestrator = build_orchestrator(&config).unwrap();
        let layers: Vec<Vec<&str>> = orchestrator
            .layers()
            .iter()
            .map(|layer| layer.iter().map(|n| n.as_str()).collect())
            .collect();
        assert_eq!(layers, vec![vec!["state_manager"], vec!["market_data"]]);
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let config = Config::parse_toml(
            r#"
            [[services]]
            name = "ai_brain"
            command = "true"
            depends_on = ["market_data"]
            "#,
        )
        .unwrap();

        let err = build_orchestrator(&config).err().unwrap();
        assert!(matches!(
            err,
            Error::Orchestration(OrchestrationError::UnknownDependency { .. })
        ));
    }
}
