//! Control loop supervision
//!
//! This module handles:
//! - Lifecycle: connect, run, stop
//! - The recognition loop consuming captured audio
//! - Dispatching classified intents to the fan controller

mod dispatcher;
mod recognition;
mod runner;

pub use runner::{Supervisor, SupervisorConfig};

/// Stop reason when the Shutdown intent is heard
pub const USER_REQUESTED: &str = "user requested";
/// Stop reason for an external interrupt (Ctrl+C)
pub const INTERRUPTED: &str = "interrupted";
/// Stop reason when the capture stream fails
pub const AUDIO_FAILED: &str = "audio source failed";
/// Stop reason when the speech engine crashes
pub const ENGINE_FAILED: &str = "speech engine failed";
