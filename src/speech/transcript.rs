//! Transcript engine - treats every non-empty frame as a finalized utterance

use super::{Recognition, SpeechEngine};
use anyhow::Result;

#[derive(Debug, Default)]
pub struct TranscriptEngine {
    finalized: Option<String>,
}

impl TranscriptEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SpeechEngine for TranscriptEngine {
    fn accept_frame(&mut self, frame: &[u8]) -> Result<bool> {
        let text = String::from_utf8_lossy(frame).trim().to_string();
        if text.is_empty() {
            return Ok(false);
        }
        self.finalized = Some(text);
        Ok(true)
    }

    fn result(&mut self) -> Recognition {
        Recognition {
            text: self.finalized.take(),
        }
    }

    fn name(&self) -> &'static str {
        "transcript"
    }
}
