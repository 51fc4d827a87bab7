//! Protocol client abstraction for pluggable Modbus backends

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;

/// A Modbus exception response from the slave
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionResponse {
    pub message: String,
}

impl ExceptionResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ExceptionResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exception response: {}", self.message)
    }
}

/// Outcome of a request that reached the slave.
///
/// The outer `anyhow::Result` of each [`ProtocolClient`] call carries transport
/// faults (timeouts, I/O errors); `Reply` carries what the slave answered.
pub type Reply<T> = std::result::Result<T, ExceptionResponse>;

/// Register/coil primitives the fan controller needs from a Modbus session
#[async_trait]
pub trait ProtocolClient: Send {
    /// Open the session
    async fn connect(&mut self) -> Result<()>;

    /// Read `count` holding registers starting at `address`
    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
        unit: u8,
    ) -> Result<Reply<Vec<u16>>>;

    /// Write a single holding register
    async fn write_register(&mut self, address: u16, value: u16, unit: u8) -> Result<Reply<()>>;

    /// Write a single coil
    async fn write_coil(&mut self, address: u16, value: bool, unit: u8) -> Result<Reply<()>>;

    /// Release the session. Calling it on a closed session does nothing.
    async fn close(&mut self);

    /// Human-readable name for this client
    fn name(&self) -> &'static str;
}
