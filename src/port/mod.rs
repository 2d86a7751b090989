//! Port definitions.
//!
//! Traits at the boundary between the orchestration core and the outside
//! world.
//!
//! - [`outbound`] - Lifecycle contract implemented by supervised services

pub mod outbound;
