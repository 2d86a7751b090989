//! Handler for `overseer check config`.

use std::path::Path;

use serde_json::json;

use crate::adapter::inbound::cli::output;
use crate::error::Result;
use crate::infrastructure::bootstrap;
use crate::infrastructure::config::settings::Config;

/// Validate the configuration file and its dependency graph without
/// starting anything.
pub fn execute_config<P: AsRef<Path>>(config_path: P) -> Result<()> {
    let path = config_path.as_ref();
    let config = Config::load(path)?;
    let orchestrator = bootstrap::build_orchestrator(&config)?;

    let layers: Vec<Vec<String>> = orchestrator
        .layers()
        .iter()
        .map(|layer| layer.iter().map(ToString::to_string).collect())
        .collect();

    if output::is_json() {
        output::json_output(json!({
            "command": "check.config",
            "config": path.display().to_string(),
            "valid": true,
            "services": config.services.len(),
            "layers": layers,
            "status_file": config.status.enabled.then(|| config.status.path.display().to_string()),
        }));
        return Ok(());
    }

    output::section("Configuration Check");
    output::field("Config", path.display());
    output::success("Configuration file is valid");
    output::success("Dependency graph has no cycles");

    output::section("Startup order");
    for (index, layer) in layers.iter().enumerate() {
        output::field(&format!("Layer {index}"), layer.join(", "));
    }

    output::section("Summary");
    output::field("Services", config.services.len());
    output::field(
        "Grace",
        format!("{}ms", config.supervisor.shutdown_grace_ms),
    );
    if config.status.enabled {
        output::field("Status", config.status.path.display());
    } else {
        output::field("Status", "disabled");
    }
    if config.services.is_empty() {
        output::warning("No services configured");
    }

    output::success("Configuration check complete");
    Ok(())
}
