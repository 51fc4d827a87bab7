//! Error taxonomy for device control

use thiserror::Error;

/// The serial session could not be established. Fatal to startup.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to open serial port {port}: {reason}")]
    SessionOpen { port: String, reason: String },
}

/// A state change could not be applied. Never fatal to the process.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Every attempt, register and coil path alike, failed
    #[error("control failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    #[error("device session is not open")]
    NotConnected,
}

impl ControlError {
    /// Number of write attempts made before giving up
    pub fn attempts(&self) -> u32 {
        match self {
            ControlError::Exhausted { attempts, .. } => *attempts,
            ControlError::NotConnected => 0,
        }
    }
}
