//! Recognition loop - pulls frames, finalizes utterances, dispatches commands

use super::dispatcher::CommandDispatcher;
use super::{AUDIO_FAILED, ENGINE_FAILED};
use crate::audio::AudioStream;
use crate::speech::SpeechEngine;
use anyhow::{anyhow, Result};
use bytes::Bytes;
use tracing::{debug, error, info, warn};
use voice_fan_shared::RunningFlag;

/// Counters reported when the loop exits
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub frames: u64,
    /// Empty or overflowed frames that were skipped
    pub skipped: u64,
    pub utterances: u64,
}

pub struct RecognitionLoop {
    stream: Box<dyn AudioStream>,
    /// Lent to a blocking thread for each frame; None once it panicked
    engine: Option<Box<dyn SpeechEngine>>,
    dispatcher: CommandDispatcher,
    running: RunningFlag,
    frame_size: usize,
}

impl RecognitionLoop {
    pub fn new(
        stream: Box<dyn AudioStream>,
        engine: Box<dyn SpeechEngine>,
        dispatcher: CommandDispatcher,
        running: RunningFlag,
        frame_size: usize,
    ) -> Self {
        Self {
            stream,
            engine: Some(engine),
            dispatcher,
            running,
            frame_size,
        }
    }

    /// Run until the running flag is cleared.
    ///
    /// The flag is checked between frames, so a clear is observed once the
    /// current read or dispatch returns. A partially heard utterance is
    /// dropped.
    pub async fn run(mut self) -> LoopStats {
        let mut stats = LoopStats::default();

        info!("[VOICE] Voice control ready, say:");
        info!("[VOICE]   {}", self.dispatcher.guidance());

        while self.running.is_set() {
            let frame = match self.stream.read(self.frame_size).await {
                Ok(frame) => frame,
                Err(e) => {
                    error!("[VOICE] Audio read failed: {:#}", e);
                    self.running.clear(AUDIO_FAILED);
                    break;
                }
            };
            stats.frames += 1;

            if frame.is_empty() {
                stats.skipped += 1;
                continue;
            }

            let text = match self.recognize(frame).await {
                Ok(Some(text)) if !text.trim().is_empty() => text,
                Ok(_) => continue,
                Err(e) if self.engine.is_some() => {
                    warn!("[VOICE] Speech engine rejected frame: {:#}", e);
                    continue;
                }
                Err(e) => {
                    error!("[VOICE] {:#}", e);
                    self.running.clear(ENGINE_FAILED);
                    break;
                }
            };
            stats.utterances += 1;

            let result = self.dispatcher.dispatch(&text).await;
            debug!("[VOICE] Dispatch result: {:?}", result);
        }

        self.stream.close().await;
        info!("[VOICE] Recognition stopped");
        stats
    }

    /// Feed one frame to the engine on a blocking thread and fetch the
    /// finalized text, if any
    async fn recognize(&mut self, frame: Bytes) -> Result<Option<String>> {
        let mut engine = self
            .engine
            .take()
            .ok_or_else(|| anyhow!("speech engine is gone"))?;

        let (engine, outcome) = tokio::task::spawn_blocking(move || {
            let outcome = engine
                .accept_frame(&frame)
                .map(|finalized| finalized.then(|| engine.result().text).flatten());
            (engine, outcome)
        })
        .await
        .map_err(|e| anyhow!("speech engine failed: {}", e))?;

        self.engine = Some(engine);
        outcome
    }
}
