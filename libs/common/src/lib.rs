//! `VoltageEMS` basic library
//!
//! Provides basic functions shared by all services, including:
//! - logging functions
//! - configuration loading
//! - shutdown signal handling and startup helpers

pub mod config_loader;
pub mod logging;
pub mod service_bootstrap;
pub mod shutdown;

// Re-export common dependencies
pub use anyhow;
pub use tokio;
