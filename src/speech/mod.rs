//! Speech recognition
//!
//! Provides the recognizer seam fed by the recognition loop:
//! - Transcript: frames already carry finalized text (pairs with console capture)
//! - Vosk: offline recognition on 16-bit PCM frames (`vosk` feature)

mod transcript;
#[cfg(feature = "vosk")]
mod vosk;

pub use transcript::TranscriptEngine;
#[cfg(feature = "vosk")]
pub use self::vosk::VoskEngine;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Finalized recognition result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recognition {
    pub text: Option<String>,
}

/// Trait for speech recognition engines
pub trait SpeechEngine: Send {
    /// Feed one captured frame. Returns true when an utterance was finalized
    /// and [`SpeechEngine::result`] has text to fetch.
    fn accept_frame(&mut self, frame: &[u8]) -> Result<bool>;

    /// Take the finalized utterance
    fn result(&mut self) -> Recognition;

    /// Human-readable name for this engine
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechBackend {
    #[default]
    Transcript,
    Vosk,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpeechConfig {
    pub engine: SpeechBackend,
    /// Vosk model directory
    pub model_path: PathBuf,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            engine: SpeechBackend::Transcript,
            model_path: PathBuf::from("models/vosk-model-small-cn-0.22"),
        }
    }
}

/// Factory to create the configured speech engine
pub fn create_speech_engine(config: &SpeechConfig, sample_rate: u32) -> Result<Box<dyn SpeechEngine>> {
    match config.engine {
        SpeechBackend::Transcript => Ok(Box::new(TranscriptEngine::new())),
        SpeechBackend::Vosk => vosk_engine(config, sample_rate),
    }
}

#[cfg(feature = "vosk")]
fn vosk_engine(config: &SpeechConfig, sample_rate: u32) -> Result<Box<dyn SpeechEngine>> {
    Ok(Box::new(VoskEngine::new(&config.model_path, sample_rate)?))
}

#[cfg(not(feature = "vosk"))]
fn vosk_engine(config: &SpeechConfig, _sample_rate: u32) -> Result<Box<dyn SpeechEngine>> {
    anyhow::bail!(
        "Vosk recognition (model {}) requires building with the `vosk` feature",
        config.model_path.display()
    )
}
