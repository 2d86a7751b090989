//! Overseer - dependency-aware supervision of long-running services.
//!
//! Starts a set of interdependent background services in dependency order,
//! watches them with periodic health probes, restarts failed ones with
//! bounded exponential backoff and stops everything in reverse order.
//!
//! # Architecture
//!
//! The crate follows a hexagonal layout:
//!
//! - [`domain`] - Pure types: service names, the lifecycle state machine,
//!   the dependency graph, recovery policy and probe settings
//! - [`port`] - The [`SupervisedService`](port::outbound::service::SupervisedService)
//!   contract every supervised service implements
//! - [`application`] - Registry, health monitor, orchestrator and status
//!   reporting
//! - [`adapter`] - OS process services and the command-line interface
//! - [`infrastructure`] - Configuration, bootstrap and the status file
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use overseer::adapter::outbound::process::{CommandService, CommandSpec};
//! use overseer::application::descriptor::ServiceDescriptor;
//! use overseer::application::orchestrator::{Orchestrator, OrchestratorSettings};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let state = CommandService::new(CommandSpec::new("state-manager"));
//! let feed = CommandService::new(CommandSpec::new("market-data"));
//!
//! let orchestrator = Orchestrator::new(
//!     vec![
//!         ServiceDescriptor::new("state_manager", Arc::new(state)),
//!         ServiceDescriptor::new("market_data", Arc::new(feed)).depends_on(["state_manager"]),
//!     ],
//!     OrchestratorSettings::default(),
//! )?;
//!
//! let report = orchestrator.start_all().await?;
//! println!("running: {:?}", report.running);
//!
//! let shutdown = orchestrator.shutdown_all(orchestrator.settings().shutdown_grace).await;
//! assert!(shutdown.is_clean());
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod port;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
