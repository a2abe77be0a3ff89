//! Downstream protocol clients
//!
//! Each client is registered with the [`ClientRegistry`](crate::core::ClientRegistry)
//! under its URI scheme.

pub mod modbus;
