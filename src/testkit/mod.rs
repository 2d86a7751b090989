//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`service`] - [`ScriptedService`](service::ScriptedService), a
//!   [`SupervisedService`](crate::port::outbound::service::SupervisedService)
//!   with scripted start/probe/stop outcomes and a shared call [`Journal`](service::Journal).
//! - [`config`] - Canonical fast settings for probes, recovery and the orchestrator.

pub mod config;
pub mod service;
