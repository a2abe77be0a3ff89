//! IEC 60870-5-104 gateway service (`gwsrv`)
//!
//! Maps upstream information objects (IOAs) onto downstream device
//! references, polls downstream clients and relays upstream commands.

pub mod config;
pub mod core;
pub mod error;
pub mod protocols;

pub use crate::config::GatewayConfig;
pub use crate::core::{
    ClientRegistry, DatapointDirectory, EventSink, Gateway, ItemType, PointTable, PointValue,
    Scheduler, UpstreamHandle,
};
pub use crate::error::{GwError, Result};
