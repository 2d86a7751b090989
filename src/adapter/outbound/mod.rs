//! Outbound adapters (driven side).

pub mod process;
