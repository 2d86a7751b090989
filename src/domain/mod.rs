//! Core domain types for service supervision.
//!
//! This layer has no async runtime dependencies: identifiers, the lifecycle
//! state machine, the dependency graph and the recovery policy are plain
//! values that the application layer drives.
//!
//! # Submodules
//!
//! - [`graph`] - Dependency graph and layered topological order
//! - [`health`] - Probe settings and derived system health
//! - [`id`] - Service name newtype
//! - [`recovery`] - Bounded exponential backoff with jitter
//! - [`state`] - Service lifecycle states and legal transitions

pub mod graph;
pub mod health;
pub mod id;
pub mod recovery;
pub mod state;
