//! Outbound ports: contracts the orchestrator consumes.

pub mod service;
