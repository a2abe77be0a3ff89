//! Modbus register-map addressing
//!
//! Logical addresses are the 1-indexed numbers used in device register maps
//! (`40001`, `30005`). The 0-based protocol address is derived per range.

use crate::core::reference::DownstreamReference;
use crate::error::{GwError, Result};

// ============================================================================
// Address Range Constants
// ============================================================================

/// Holding registers: FC03 read / FC06 write
pub const HOLDING_REGISTER_MIN: u32 = 40001;
pub const HOLDING_REGISTER_MAX: u32 = 49999;

/// Input registers: FC04 read only
pub const INPUT_REGISTER_MIN: u32 = 30001;
pub const INPUT_REGISTER_MAX: u32 = 39999;

/// Default Modbus TCP port
pub const DEFAULT_PORT: u16 = 502;

/// Unit id used when the reference path has a single segment
pub const DEFAULT_DEVICE_ID: u8 = 1;

pub const SCHEME: &str = "modbus";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterKind {
    Holding,
    Input,
}

impl RegisterKind {
    /// Range an address belongs to, if any
    pub fn of(address: u32) -> Option<Self> {
        match address {
            HOLDING_REGISTER_MIN..=HOLDING_REGISTER_MAX => Some(RegisterKind::Holding),
            INPUT_REGISTER_MIN..=INPUT_REGISTER_MAX => Some(RegisterKind::Input),
            _ => None,
        }
    }

    fn base(self) -> u32 {
        match self {
            RegisterKind::Holding => HOLDING_REGISTER_MIN,
            RegisterKind::Input => INPUT_REGISTER_MIN,
        }
    }

    pub fn read_function(self) -> &'static str {
        match self {
            RegisterKind::Holding => "FC03",
            RegisterKind::Input => "FC04",
        }
    }
}

/// Convert a register-map address to the 0-based protocol address
///
/// `40001 -> 0`, `30005 -> 4`; anything outside both ranges fails.
pub fn address_to_protocol(address: u32) -> Result<u16> {
    let kind = RegisterKind::of(address).ok_or_else(|| {
        GwError::invalid_address(address, "expected 3xxxx or 4xxxx")
    })?;
    // Both ranges span fewer than 10000 registers
    Ok((address - kind.base()) as u16)
}

/// Split a reference path into `(device_id, address)`
///
/// `/1/40001 -> (1, 40001)`; `/40001 -> (1, 40001)`.
pub fn parse_path(path: &str) -> Result<(u8, u32)> {
    let parts: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    let invalid = |reason: &str| GwError::invalid_reference(path, reason);

    match parts.as_slice() {
        [device, address, ..] => {
            let device_id = device
                .parse::<u8>()
                .map_err(|_| invalid("device id must be 0-255"))?;
            let address = address
                .parse::<u32>()
                .map_err(|_| invalid("register address must be numeric"))?;
            Ok((device_id, address))
        },
        [address] => {
            let address = address
                .parse::<u32>()
                .map_err(|_| invalid("register address must be numeric"))?;
            Ok((DEFAULT_DEVICE_ID, address))
        },
        [] => Err(invalid("empty path")),
    }
}

/// Fully parsed `modbus://host[:port]/[deviceId/]address` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModbusReference {
    /// `"host:port"` connection key
    pub endpoint: String,
    pub device_id: u8,
    pub address: u32,
}

impl ModbusReference {
    pub fn parse(uri: &str, default_port: u16) -> Result<Self> {
        let reference = DownstreamReference::parse(uri)?;
        if reference.scheme != SCHEME {
            return Err(GwError::invalid_reference(
                uri,
                format!(
                    "incorrect scheme, only modbus is supported by this client, not {}",
                    reference.scheme
                ),
            ));
        }

        let (device_id, address) = parse_path(&reference.path)?;
        Ok(Self {
            endpoint: reference.host_port(default_port),
            device_id,
            address,
        })
    }

    pub fn kind(&self) -> Option<RegisterKind> {
        RegisterKind::of(self.address)
    }

    pub fn protocol_address(&self) -> Result<u16> {
        address_to_protocol(self.address)
    }
}
