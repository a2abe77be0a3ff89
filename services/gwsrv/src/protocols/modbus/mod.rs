//! Modbus TCP downstream client

pub mod address;
pub mod master;
pub mod pool;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use address::{ModbusReference, RegisterKind, DEFAULT_PORT, SCHEME};
pub use master::{factory, factory_with_connector, ModbusMaster};
pub use pool::ConnectionPool;
pub use transport::{
    RegisterTransport, TokioModbusConnector, TransportConnector, TransportError, TransportResult,
};
