//! Modbus RTU Connection
//!
//! Manages the serial session to the fan controller board.

use super::client::{ExceptionResponse, ProtocolClient, Reply};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_modbus::client::{rtu, Context};
use tokio_modbus::prelude::*;
use tokio_serial::{DataBits, SerialStream, StopBits};
use tracing::{debug, info, warn};
use voice_fan_shared::defaults;

/// Serial parity, written as `N`, `E` or `O` in config files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Parity {
    #[serde(rename = "N")]
    None,
    #[default]
    #[serde(rename = "E")]
    Even,
    #[serde(rename = "O")]
    Odd,
}

impl From<Parity> for tokio_serial::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Even => tokio_serial::Parity::Even,
            Parity::Odd => tokio_serial::Parity::Odd,
        }
    }
}

/// Serial session parameters and device addressing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionConfig {
    /// Serial port (e.g., "/dev/ttyUSB0" or "COM3")
    pub port: String,
    pub baudrate: u32,
    /// Data bits per character, 5 to 8
    pub bytesize: u8,
    pub parity: Parity,
    /// 1 or 2
    pub stopbits: u8,
    /// Upper bound on a single request/response exchange, in seconds
    #[serde(with = "crate::config::seconds")]
    pub timeout: Duration,
    /// Modbus slave address of the fan board
    pub unit_address: u8,
    /// Register and coil address that switches the fan
    pub register_address: u16,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        let port = if cfg!(windows) { "COM3" } else { "/dev/ttyUSB0" };
        Self {
            port: port.into(),
            baudrate: defaults::BAUD_RATE,
            bytesize: 8,
            parity: Parity::Even,
            stopbits: 1,
            timeout: Duration::from_millis(defaults::SERIAL_TIMEOUT_MS),
            unit_address: defaults::UNIT_ADDRESS,
            register_address: defaults::REGISTER_ADDRESS,
        }
    }
}

impl ConnectionConfig {
    pub fn data_bits(&self) -> Result<DataBits> {
        match self.bytesize {
            5 => Ok(DataBits::Five),
            6 => Ok(DataBits::Six),
            7 => Ok(DataBits::Seven),
            8 => Ok(DataBits::Eight),
            other => bail!("unsupported bytesize {} (expected 5-8)", other),
        }
    }

    pub fn stop_bits(&self) -> Result<StopBits> {
        match self.stopbits {
            1 => Ok(StopBits::One),
            2 => Ok(StopBits::Two),
            other => bail!("unsupported stopbits {} (expected 1 or 2)", other),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.port.is_empty() {
            bail!("serial port must not be empty");
        }
        if self.baudrate == 0 {
            bail!("baudrate must be positive");
        }
        self.data_bits()?;
        self.stop_bits()?;
        Ok(())
    }
}

/// Modbus RTU client over a serial port
pub struct RtuClient {
    config: ConnectionConfig,
    context: Option<Context>,
}

impl RtuClient {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            context: None,
        }
    }

    fn open_serial(&self) -> Result<SerialStream> {
        let builder = tokio_serial::new(&self.config.port, self.config.baudrate)
            .data_bits(self.config.data_bits()?)
            .parity(self.config.parity.into())
            .stop_bits(self.config.stop_bits()?)
            .timeout(self.config.timeout);

        Ok(SerialStream::open(&builder)?)
    }

    fn context_mut(&mut self) -> Result<&mut Context> {
        self.context
            .as_mut()
            .ok_or_else(|| anyhow!("Modbus session is not open"))
    }
}

/// Bound a request by the session timeout and split transport faults from
/// exception responses
async fn exchange<T, F>(timeout: Duration, request: F) -> Result<Reply<T>>
where
    F: Future<Output = tokio_modbus::Result<T>>,
{
    match tokio::time::timeout(timeout, request).await {
        Ok(Ok(Ok(value))) => Ok(Ok(value)),
        Ok(Ok(Err(code))) => Ok(Err(ExceptionResponse::new(format!("{:?}", code)))),
        Ok(Err(e)) => Err(anyhow!("Modbus transport error: {}", e)),
        Err(_) => Err(anyhow!("no response within {:?}", timeout)),
    }
}

#[async_trait]
impl ProtocolClient for RtuClient {
    async fn connect(&mut self) -> Result<()> {
        if self.context.is_some() {
            return Ok(());
        }

        info!(
            "[MODBUS] Opening {} ({} baud, {}{:?}{})",
            self.config.port,
            self.config.baudrate,
            self.config.bytesize,
            self.config.parity,
            self.config.stopbits
        );

        let serial = self.open_serial()?;
        self.context = Some(rtu::attach_slave(serial, Slave(self.config.unit_address)));
        Ok(())
    }

    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
        unit: u8,
    ) -> Result<Reply<Vec<u16>>> {
        let timeout = self.config.timeout;
        let ctx = self.context_mut()?;
        ctx.set_slave(Slave(unit));
        debug!("[MODBUS] read_holding_registers addr={} count={} unit={}", address, count, unit);
        exchange(timeout, ctx.read_holding_registers(address, count)).await
    }

    async fn write_register(&mut self, address: u16, value: u16, unit: u8) -> Result<Reply<()>> {
        let timeout = self.config.timeout;
        let ctx = self.context_mut()?;
        ctx.set_slave(Slave(unit));
        debug!("[MODBUS] write_single_register addr={} value={} unit={}", address, value, unit);
        exchange(timeout, ctx.write_single_register(address, value)).await
    }

    async fn write_coil(&mut self, address: u16, value: bool, unit: u8) -> Result<Reply<()>> {
        let timeout = self.config.timeout;
        let ctx = self.context_mut()?;
        ctx.set_slave(Slave(unit));
        debug!("[MODBUS] write_single_coil addr={} value={} unit={}", address, value, unit);
        exchange(timeout, ctx.write_single_coil(address, value)).await
    }

    async fn close(&mut self) {
        if let Some(mut ctx) = self.context.take() {
            if let Err(e) = ctx.disconnect().await {
                warn!("[MODBUS] Error while closing {}: {}", self.config.port, e);
            }
            info!("[MODBUS] Closed {}", self.config.port);
        }
    }

    fn name(&self) -> &'static str {
        "Modbus RTU"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.baudrate, 9600);
        assert_eq!(config.bytesize, 8);
        assert_eq!(config.parity, Parity::Even);
        assert_eq!(config.unit_address, 2);
        assert_eq!(config.register_address, 0);
        assert_eq!(config.timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_serial_parameter_validation() {
        let mut config = ConnectionConfig::default();
        assert!(config.validate().is_ok());

        config.bytesize = 9;
        assert!(config.validate().is_err());

        config.bytesize = 7;
        config.stopbits = 3;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_requests_fail_without_session() {
        let mut client = RtuClient::new(ConnectionConfig::default());
        let result = client.write_register(0, 1, 2).await;
        assert!(result.is_err());

        // closing a never-opened session is a no-op
        client.close().await;
        client.close().await;
    }
}
