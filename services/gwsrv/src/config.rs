//! Service configuration
//!
//! Loaded with figment from a TOML/YAML/JSON file, then overridden by
//! `GWSRV_`-prefixed environment variables.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::core::directory::{DatapointDirectory, ItemType};
use crate::core::reference::scheme_of;
use crate::error::{GwError, Result};
use crate::protocols::modbus::{ModbusReference, RegisterKind, DEFAULT_PORT, SCHEME as MODBUS_SCHEME};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "GWSRV_";

/// Default config file location
pub const DEFAULT_CONFIG_PATH: &str = "config/gwsrv.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    /// Directory for the daily log file; `logs/<name>` when unset
    pub log_dir: Option<String>,
    /// Write the log file as JSON lines
    pub json_logs: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "gwsrv".to_string(),
            log_dir: None,
            json_logs: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Pause between two poll ticks
    pub interval_ms: u64,
    /// Upper bound for a single client's poll
    pub poll_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            poll_timeout_ms: 5000,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModbusConfig {
    pub default_port: u16,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for ModbusConfig {
    fn default() -> Self {
        Self {
            default_port: DEFAULT_PORT,
            connect_timeout_ms: 3000,
            request_timeout_ms: 1000,
        }
    }
}

impl ModbusConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Top-level gateway configuration
///
/// Each item-type table maps an IOA (as a string key) to a downstream
/// reference URI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub service: ServiceConfig,
    pub scheduler: SchedulerConfig,
    pub modbus: ModbusConfig,

    pub measuredvaluescaled: BTreeMap<String, String>,
    pub singlepointinformation: BTreeMap<String, String>,
    pub doublepointinformation: BTreeMap<String, String>,
    pub singlepointcommand: BTreeMap<String, String>,
    pub doublepointcommand: BTreeMap<String, String>,
}

impl GatewayConfig {
    pub fn load(path: impl AsRef<Path>) -> errors::VoltageResult<Self> {
        common::config_loader::load_config(path, ENV_PREFIX)
    }

    pub fn group(&self, item_type: ItemType) -> &BTreeMap<String, String> {
        match item_type {
            ItemType::MeasuredValueScaled => &self.measuredvaluescaled,
            ItemType::SinglePointInformation => &self.singlepointinformation,
            ItemType::DoublePointInformation => &self.doublepointinformation,
            ItemType::SinglePointCommand => &self.singlepointcommand,
            ItemType::DoublePointCommand => &self.doublepointcommand,
        }
    }

    pub fn directory(&self) -> Result<DatapointDirectory> {
        DatapointDirectory::build(ItemType::ALL.into_iter().map(|t| (t, self.group(t))))
    }

    /// Check IOAs and every reference without touching the network
    ///
    /// Modbus references are fully parsed and range checked; other schemes
    /// only need a well-formed URI. All problems are logged before failing.
    pub fn validate(&self) -> Result<DatapointDirectory> {
        let directory = self.directory()?;
        let mut invalid = 0usize;

        for point in directory.datapoints() {
            let checked = scheme_of(point.reference).and_then(|scheme| {
                if scheme == MODBUS_SCHEME {
                    let reference = ModbusReference::parse(point.reference, self.modbus.default_port)?;
                    if !point.item_type.is_monitoring() {
                        if reference.kind() != Some(RegisterKind::Holding) {
                            return Err(GwError::invalid_address(
                                reference.address,
                                "commands need a holding register (4xxxx)",
                            ));
                        }
                    } else {
                        reference.protocol_address()?;
                    }
                } else {
                    warn!(
                        "[{}] {}: no client is built in for scheme '{}'",
                        point.item_type, point.ioa, scheme
                    );
                }
                Ok(())
            });

            if let Err(e) = checked {
                error!("[{}] {} -> {}: {}", point.item_type, point.ioa, point.reference, e);
                invalid += 1;
            }
        }

        if invalid > 0 {
            return Err(GwError::config(format!("{} invalid datapoint(s)", invalid)));
        }
        Ok(directory)
    }
}
