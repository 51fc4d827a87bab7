//! Modbus Bridge Module
//!
//! Provides the protocol client seam used by the fan controller and its
//! RTU implementation over a serial port.

mod client;
mod connection;
#[cfg(test)]
pub mod mock;

pub use client::{ExceptionResponse, ProtocolClient};
#[cfg(test)]
pub use connection::Parity;
pub use connection::{ConnectionConfig, RtuClient};
