//! Audio capture
//!
//! Provides the capture seam the recognition loop reads frames from:
//! - Console: stdin lines as frames (development simulation)
//! - Microphone: live capture through cpal (`audio` feature)

mod console;
#[cfg(feature = "audio")]
mod microphone;
#[cfg(test)]
pub mod mock;

pub use console::ConsoleSource;
#[cfg(feature = "audio")]
pub use microphone::MicrophoneSource;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use voice_fan_shared::defaults;

/// Sample encoding of captured frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Signed 16-bit little-endian PCM
    Int16,
}

/// Stream parameters requested from a capture source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_format: SampleFormat,
    pub channels: u16,
    pub sample_rate: u32,
    pub frames_per_buffer: u32,
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoding = match self.sample_format {
            SampleFormat::Int16 => "s16le",
        };
        write!(
            f,
            "{} {}Hz x{}, {} frames/buffer",
            encoding, self.sample_rate, self.channels, self.frames_per_buffer
        )
    }
}

/// A capture device or simulation that can open frame streams
#[async_trait]
pub trait AudioSource: Send {
    /// Open a capture stream
    async fn open(&mut self, format: &AudioFormat) -> Result<Box<dyn AudioStream>>;

    /// Release the device. Streams still open stop delivering frames.
    fn terminate(&mut self);

    /// Human-readable name for this source
    fn name(&self) -> &'static str;
}

/// An open capture stream
#[async_trait]
pub trait AudioStream: Send {
    /// Read up to `frame_size` samples. Returns an empty frame when nothing
    /// arrived within the read timeout or captured audio overflowed; errors
    /// mean the stream is unusable.
    async fn read(&mut self, frame_size: usize) -> Result<Bytes>;

    /// Stop capturing. Safe to call more than once.
    async fn close(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioBackend {
    /// Typed lines on stdin stand in for utterances
    #[default]
    Console,
    /// Default input device through cpal
    Microphone,
}

/// Capture configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AudioConfig {
    pub backend: AudioBackend,
    pub sample_rate: u32,
    pub channels: u16,
    pub frames_per_buffer: u32,
    /// Samples read per loop iteration
    pub frame_size: usize,
    /// Upper bound on a single frame read
    pub read_timeout_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            backend: AudioBackend::Console,
            sample_rate: defaults::SAMPLE_RATE,
            channels: 1,
            frames_per_buffer: defaults::FRAMES_PER_BUFFER,
            frame_size: defaults::FRAME_SIZE,
            read_timeout_ms: defaults::FRAME_READ_TIMEOUT_MS,
        }
    }
}

impl AudioConfig {
    pub fn format(&self) -> AudioFormat {
        AudioFormat {
            sample_format: SampleFormat::Int16,
            channels: self.channels,
            sample_rate: self.sample_rate,
            frames_per_buffer: self.frames_per_buffer,
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 {
            anyhow::bail!("audio channels must be at least 1");
        }
        if self.frame_size == 0 {
            anyhow::bail!("audio frame_size must be at least 1");
        }
        if self.sample_rate == 0 {
            anyhow::bail!("audio sample_rate must be positive");
        }
        Ok(())
    }
}

/// Factory to create the configured capture source
pub fn create_audio_source(config: &AudioConfig) -> Result<Box<dyn AudioSource>> {
    match config.backend {
        AudioBackend::Console => Ok(Box::new(ConsoleSource::new(config.read_timeout()))),
        AudioBackend::Microphone => microphone_source(config),
    }
}

#[cfg(feature = "audio")]
fn microphone_source(config: &AudioConfig) -> Result<Box<dyn AudioSource>> {
    Ok(Box::new(MicrophoneSource::new(config.read_timeout())))
}

#[cfg(not(feature = "audio"))]
fn microphone_source(_config: &AudioConfig) -> Result<Box<dyn AudioSource>> {
    anyhow::bail!("microphone capture requires building with the `audio` feature")
}
