//! Fan device control
//!
//! This module handles:
//! - Opening and probing the Modbus session
//! - Switching the fan with bounded retry and holding-register/coil fallback
//! - Tracking the last confirmed on/off state

mod controller;

pub use controller::{FanController, RetryPolicy, StateChange, WritePath};
