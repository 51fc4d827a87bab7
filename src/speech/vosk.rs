//! Vosk offline recognition

use super::{Recognition, SpeechEngine};
use anyhow::{anyhow, Result};
use std::path::Path;
use tracing::info;
use vosk::{DecodingState, Model, Recognizer};

pub struct VoskEngine {
    // the recognizer holds a reference into the model on the C side
    _model: Model,
    recognizer: Recognizer,
    samples: Vec<i16>,
}

impl VoskEngine {
    /// Load the model and create a recognizer for `sample_rate` Hz mono audio
    pub fn new(model_path: &Path, sample_rate: u32) -> Result<Self> {
        let path = model_path
            .to_str()
            .ok_or_else(|| anyhow!("model path {:?} is not valid UTF-8", model_path))?;

        info!("[VOICE] Loading Vosk model from {}", path);
        let model = Model::new(path).ok_or_else(|| anyhow!("failed to load Vosk model from {}", path))?;
        let recognizer = Recognizer::new(&model, sample_rate as f32)
            .ok_or_else(|| anyhow!("failed to create Vosk recognizer at {} Hz", sample_rate))?;

        Ok(Self {
            _model: model,
            recognizer,
            samples: Vec::new(),
        })
    }
}

impl SpeechEngine for VoskEngine {
    fn accept_frame(&mut self, frame: &[u8]) -> Result<bool> {
        self.samples.clear();
        self.samples.extend(
            frame
                .chunks_exact(2)
                .map(|pair| i16::from_le_bytes([pair[0], pair[1]])),
        );

        match self.recognizer.accept_waveform(&self.samples) {
            Ok(DecodingState::Finalized) => Ok(true),
            Ok(_) => Ok(false),
            Err(e) => Err(anyhow!("Vosk rejected waveform: {:?}", e)),
        }
    }

    fn result(&mut self) -> Recognition {
        let text = self
            .recognizer
            .result()
            .single()
            .map(|r| r.text.trim().to_string())
            .filter(|t| !t.is_empty());
        Recognition { text }
    }

    fn name(&self) -> &'static str {
        "vosk"
    }
}
