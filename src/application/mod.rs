//! Application services (use cases).
//!
//! The supervision core: service descriptors, the state registry, health
//! monitoring, the orchestrator that drives the lifecycle, and the status
//! view over all of it.

pub mod descriptor;
pub mod monitor;
pub mod orchestrator;
pub mod registry;
pub mod status;
