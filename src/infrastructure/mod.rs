//! Infrastructure layer.
//!
//! Technical concerns that support the application without containing
//! orchestration logic.
//!
//! # Submodules
//!
//! - [`bootstrap`] - Composition root for runtime wiring
//! - [`config`] - Configuration loading and validation
//! - [`status_file`] - Status file for external monitoring

pub mod bootstrap;
pub mod config;
pub mod status_file;
