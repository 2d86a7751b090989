//! Infrastructure configuration modules.

pub mod logging;
pub mod service;
pub mod settings;
pub mod status;
pub mod supervisor;
