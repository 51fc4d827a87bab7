//! Voice Fan Shared Types
//!
//! This crate provides the lifecycle state machine, the shared running flag
//! and the error taxonomy used by the voice fan controller.

pub mod error;
pub mod running;
pub mod state_machine;

pub use error::{ConnectionError, ControlError};
pub use running::RunningFlag;
pub use state_machine::{LifecycleEvent, LifecycleState, LifecycleStateMachine, TransitionResult};

/// Default parameters for the system
pub mod defaults {
    /// Serial baud rate
    pub const BAUD_RATE: u32 = 9600;

    /// Serial read/write timeout in milliseconds
    pub const SERIAL_TIMEOUT_MS: u64 = 3000;

    /// Modbus slave address of the fan controller board
    pub const UNIT_ADDRESS: u8 = 2;

    /// Register (and coil) address that switches the fan
    pub const REGISTER_ADDRESS: u16 = 0;

    /// Retries after the first write attempt
    pub const MAX_RETRIES: u32 = 2;

    /// Delay between failed write attempts in milliseconds
    pub const RETRY_DELAY_MS: u64 = 500;

    /// Capture sample rate expected by the recognizer
    pub const SAMPLE_RATE: u32 = 16000;

    /// Capture buffer size in frames
    pub const FRAMES_PER_BUFFER: u32 = 8192;

    /// Samples pulled from the capture source per loop iteration
    pub const FRAME_SIZE: usize = 4096;

    /// Upper bound on a single frame read in milliseconds
    pub const FRAME_READ_TIMEOUT_MS: u64 = 200;

    /// Supervisor running-flag poll period in milliseconds
    pub const SUPERVISOR_POLL_MS: u64 = 100;

    /// How long stop waits for the recognition loop to exit
    pub const JOIN_TIMEOUT_MS: u64 = 1000;
}
