//! Unified service bootstrap utilities
//!
//! Startup banner and logging initialization shared by VoltageEMS services.

use std::path::PathBuf;

use crate::logging::{self, LogConfig};
use tracing::info;

/// Service metadata for startup
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    /// Service name (e.g., "gwsrv")
    pub name: String,
    /// Service version, normally the caller's `CARGO_PKG_VERSION`
    pub version: String,
    /// Service description
    pub description: String,
    /// ASCII art printed above the version line
    pub banner: Option<&'static str>,
}

impl ServiceInfo {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: description.into(),
            banner: None,
        }
    }

    pub fn with_banner(mut self, banner: &'static str) -> Self {
        self.banner = Some(banner);
        self
    }
}

/// Print unified startup banner for any service
pub fn print_startup_banner(service: &ServiceInfo) {
    if let Some(banner) = service.banner {
        info!("{}", banner);
    }
    info!("");
    info!(" {} v{}", service.name.to_uppercase(), service.version);
    info!(" {}", service.description);
    info!("");
}

/// Initialize logging for a service
///
/// Log directory priority: `VOLTAGE_LOG_DIR`, then `log_dir`, then `logs/<service>`.
pub fn init_logging(
    service: &ServiceInfo,
    log_dir: Option<&str>,
    level: &str,
    ansi: bool,
    json: bool,
) -> anyhow::Result<()> {
    let log_dir = std::env::var("VOLTAGE_LOG_DIR")
        .map(PathBuf::from)
        .ok()
        .or_else(|| log_dir.map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("logs").join(&service.name));

    let config = LogConfig {
        service_name: service.name.clone(),
        log_dir,
        console_level: logging::parse_level(level),
        enable_json: json,
        ansi,
    };

    logging::init_with_config(config).map_err(|e| anyhow::anyhow!("{}", e))
}
