//! Fan controller - owns the device session and the confirmed fan state

use crate::modbus::{ConnectionConfig, ExceptionResponse, ProtocolClient};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use voice_fan_shared::{defaults, ConnectionError, ControlError};

/// Write retry policy. `max_retries + 1` attempts are always made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Pause between failed attempts, in seconds
    #[serde(with = "crate::config::seconds")]
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: defaults::MAX_RETRIES,
            retry_delay: Duration::from_millis(defaults::RETRY_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Which addressing path accepted a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePath {
    HoldingRegister,
    Coil,
}

/// Successful result of [`FanController::set_state`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    /// Fan was already in the requested state; nothing was sent
    Unchanged,
    /// A write was confirmed on the given attempt (1-based)
    Applied { attempt: u32, path: WritePath },
}

/// What the read probe after opening the session found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Registers(Vec<u16>),
    /// Slave answered the probe with an exception
    Rejected(String),
    /// Probe never got an answer
    Failed(String),
}

/// Result of a successful [`FanController::connect`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionReport {
    pub probe: ProbeOutcome,
}

impl ConnectionReport {
    /// Human-readable probe result
    pub fn diagnostic(&self) -> String {
        match &self.probe {
            ProbeOutcome::Registers(values) => format!("probe read registers {:?}", values),
            ProbeOutcome::Rejected(msg) => format!("probe rejected ({}), device may be write-only", msg),
            ProbeOutcome::Failed(msg) => format!("probe failed ({}), device may be write-only", msg),
        }
    }
}

/// Why a single write attempt failed. Retried locally, never surfaced alone.
#[derive(Debug, Error)]
enum TransientWriteError {
    #[error("register write rejected ({register}), coil write rejected ({coil})")]
    Rejected {
        register: ExceptionResponse,
        coil: ExceptionResponse,
    },

    #[error("transport fault: {0}")]
    Transport(String),

    #[error("client panicked: {0}")]
    Panicked(String),
}

fn transport(err: anyhow::Error) -> TransientWriteError {
    TransientWriteError::Transport(format!("{:#}", err))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}

/// Controls a single on/off fan through a protocol client
pub struct FanController {
    client: Box<dyn ProtocolClient>,
    config: ConnectionConfig,
    retry: RetryPolicy,
    fan_on: bool,
    connected: bool,
}

impl FanController {
    pub fn new(client: Box<dyn ProtocolClient>, config: ConnectionConfig, retry: RetryPolicy) -> Self {
        Self {
            client,
            config,
            retry,
            fan_on: false,
            connected: false,
        }
    }

    /// Last confirmed fan state
    pub fn is_on(&self) -> bool {
        self.fan_on
    }

    #[cfg(test)]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Open the session and probe the fan register.
    ///
    /// Only failing to open the session is fatal. A probe that errors is
    /// logged and the connection is still considered established.
    pub async fn connect(&mut self) -> Result<ConnectionReport, ConnectionError> {
        info!("[FAN] Connecting to Modbus device via {}...", self.client.name());

        if let Err(e) = self.client.connect().await {
            error!("[FAN] Connection failed: {:#}", e);
            error!("[FAN] Check: 1. serial cable 2. port parameters 3. unit address");
            return Err(ConnectionError::SessionOpen {
                port: self.config.port.clone(),
                reason: format!("{:#}", e),
            });
        }
        self.connected = true;

        let probe = match self
            .client
            .read_holding_registers(self.config.register_address, 1, self.config.unit_address)
            .await
        {
            Ok(Ok(values)) => {
                info!("[FAN] Probe read succeeded, register value: {:?}", values);
                ProbeOutcome::Registers(values)
            }
            Ok(Err(exception)) => {
                warn!("[FAN] Probe read rejected ({}), will try writing anyway", exception);
                ProbeOutcome::Rejected(exception.message)
            }
            Err(e) => {
                warn!("[FAN] Probe read failed ({:#}), will try writing anyway", e);
                ProbeOutcome::Failed(format!("{:#}", e))
            }
        };

        info!("[FAN] Modbus connection established");
        Ok(ConnectionReport { probe })
    }

    /// Switch the fan on or off.
    ///
    /// Does nothing when the fan is already in the requested state. Otherwise
    /// each attempt writes the holding register and, on an exception
    /// response, the coil at the same address. The confirmed state is only
    /// updated after a write succeeds.
    pub async fn set_state(&mut self, desired: bool) -> Result<StateChange, ControlError> {
        if desired == self.fan_on {
            debug!("[FAN] Already {}, skipping write", on_off(desired));
            return Ok(StateChange::Unchanged);
        }
        if !self.connected {
            return Err(ControlError::NotConnected);
        }

        info!("[FAN] Switching fan {}...", on_off(desired));

        let attempts = self.retry.attempts();
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let outcome = AssertUnwindSafe(self.write_once(desired))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(TransientWriteError::Panicked(panic_message(payload))));

            match outcome {
                Ok(path) => {
                    self.fan_on = desired;
                    info!(
                        "[FAN] Fan is now {} (attempt {}, via {:?})",
                        on_off(desired),
                        attempt,
                        path
                    );
                    return Ok(StateChange::Applied { attempt, path });
                }
                Err(e) => {
                    warn!("[FAN] Attempt {}/{} failed: {}", attempt, attempts, e);
                    last_error = e.to_string();
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.retry.retry_delay).await;
            }
        }

        error!("[FAN] Control failed: retries exhausted");
        Err(ControlError::Exhausted {
            attempts,
            last_error,
        })
    }

    /// One attempt: holding register first, coil as fallback
    async fn write_once(&mut self, on: bool) -> Result<WritePath, TransientWriteError> {
        let address = self.config.register_address;
        let unit = self.config.unit_address;

        let register = match self
            .client
            .write_register(address, u16::from(on), unit)
            .await
            .map_err(transport)?
        {
            Ok(()) => return Ok(WritePath::HoldingRegister),
            Err(exception) => exception,
        };

        debug!("[FAN] Holding register rejected ({}), trying coil", register);

        match self
            .client
            .write_coil(address, on, unit)
            .await
            .map_err(transport)?
        {
            Ok(()) => Ok(WritePath::Coil),
            Err(coil) => Err(TransientWriteError::Rejected { register, coil }),
        }
    }

    /// Release the session. Safe to call more than once.
    pub async fn close(&mut self) {
        if !self.connected {
            return;
        }
        self.client.close().await;
        self.connected = false;
        info!("[FAN] Modbus session closed");
    }
}

fn on_off(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}
