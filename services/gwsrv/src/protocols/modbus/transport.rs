//! Register transport seam
//!
//! The master talks to devices through [`RegisterTransport`] and opens them
//! through a [`TransportConnector`]. The production implementation wraps a
//! `tokio-modbus` TCP context; tests plug in scripted transports.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::timeout;
use tokio_modbus::client::{tcp, Context};
use tokio_modbus::prelude::*;
use tracing::debug;

use super::address::DEFAULT_DEVICE_ID;

/// Failure of a single register request
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection lost or unusable
    #[error("connection lost: {0}")]
    Io(#[from] io::Error),

    /// No response within the request timeout
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Malformed or mismatched response frame
    #[error("protocol failure: {0}")]
    Framing(String),

    /// Device answered with an exception response
    #[error("modbus exception: {0}")]
    Exception(String),
}

impl TransportError {
    /// Everything but an exception response leaves the connection unusable
    pub fn is_connection_lost(&self) -> bool {
        !matches!(self, TransportError::Exception(_))
    }
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Single-register access to one connected device endpoint
#[async_trait]
pub trait RegisterTransport: Send {
    /// FC03
    async fn read_holding_registers(
        &mut self,
        device_id: u8,
        address: u16,
        count: u16,
    ) -> TransportResult<Vec<u16>>;

    /// FC04
    async fn read_input_registers(
        &mut self,
        device_id: u8,
        address: u16,
        count: u16,
    ) -> TransportResult<Vec<u16>>;

    /// FC06
    async fn write_single_register(
        &mut self,
        device_id: u8,
        address: u16,
        value: u16,
    ) -> TransportResult<()>;

    fn is_connected(&self) -> bool;

    async fn close(&mut self);
}

/// Opens transports for `"host:port"` endpoints
#[async_trait]
pub trait TransportConnector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> io::Result<Box<dyn RegisterTransport>>;
}

// ============================================================================
// tokio-modbus implementation
// ============================================================================

/// Connects real Modbus TCP devices
#[derive(Debug, Clone)]
pub struct TokioModbusConnector {
    request_timeout: Duration,
}

impl TokioModbusConnector {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

#[async_trait]
impl TransportConnector for TokioModbusConnector {
    async fn connect(&self, endpoint: &str) -> io::Result<Box<dyn RegisterTransport>> {
        let socket_addr = tokio::net::lookup_host(endpoint)
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("cannot resolve {}", endpoint))
            })?;

        debug!("Connecting to Modbus TCP server at {}", socket_addr);
        let ctx = tcp::connect_slave(socket_addr, Slave(DEFAULT_DEVICE_ID)).await?;

        Ok(Box::new(TokioModbusTransport {
            ctx: Some(ctx),
            request_timeout: self.request_timeout,
        }))
    }
}

pub struct TokioModbusTransport {
    ctx: Option<Context>,
    request_timeout: Duration,
}

impl TokioModbusTransport {
    fn context(&mut self, device_id: u8) -> TransportResult<&mut Context> {
        let ctx = self.ctx.as_mut().ok_or_else(|| {
            TransportError::Io(io::Error::new(io::ErrorKind::NotConnected, "transport closed"))
        })?;
        ctx.set_slave(Slave(device_id));
        Ok(ctx)
    }
}

/// Split tokio-modbus' nested result into transport and exception failures
fn flatten<T>(response: tokio_modbus::Result<T>) -> TransportResult<T> {
    match response {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(exception)) => Err(TransportError::Exception(format!("{:?}", exception))),
        Err(tokio_modbus::Error::Transport(e)) => Err(TransportError::Io(e)),
        Err(e) => Err(TransportError::Framing(e.to_string())),
    }
}

#[async_trait]
impl RegisterTransport for TokioModbusTransport {
    async fn read_holding_registers(
        &mut self,
        device_id: u8,
        address: u16,
        count: u16,
    ) -> TransportResult<Vec<u16>> {
        let limit = self.request_timeout;
        let ctx = self.context(device_id)?;
        let response = timeout(limit, ctx.read_holding_registers(address, count))
            .await
            .map_err(|_| TransportError::Timeout(limit))?;
        flatten(response)
    }

    async fn read_input_registers(
        &mut self,
        device_id: u8,
        address: u16,
        count: u16,
    ) -> TransportResult<Vec<u16>> {
        let limit = self.request_timeout;
        let ctx = self.context(device_id)?;
        let response = timeout(limit, ctx.read_input_registers(address, count))
            .await
            .map_err(|_| TransportError::Timeout(limit))?;
        flatten(response)
    }

    async fn write_single_register(
        &mut self,
        device_id: u8,
        address: u16,
        value: u16,
    ) -> TransportResult<()> {
        let limit = self.request_timeout;
        let ctx = self.context(device_id)?;
        let response = timeout(limit, ctx.write_single_register(address, value))
            .await
            .map_err(|_| TransportError::Timeout(limit))?;
        flatten(response)
    }

    fn is_connected(&self) -> bool {
        self.ctx.is_some()
    }

    async fn close(&mut self) {
        // Dropping the context closes the socket
        self.ctx = None;
    }
}
