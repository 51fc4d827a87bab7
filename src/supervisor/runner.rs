//! Supervisor - owns the lifecycle and every resource of one run

use super::dispatcher::{CommandDispatcher, SharedController};
use super::recognition::{LoopStats, RecognitionLoop};
use super::INTERRUPTED;
use crate::audio::{AudioFormat, AudioSource};
use crate::config::AppConfig;
use crate::device::FanController;
use crate::intent::CommandVocabulary;
use crate::modbus::ProtocolClient;
use crate::speech::SpeechEngine;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{error, info, warn};
use voice_fan_shared::{
    defaults, ConnectionError, LifecycleEvent, LifecycleState, LifecycleStateMachine, RunningFlag,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupervisorConfig {
    /// Period of the running-flag check while blocked in start()
    pub poll_interval_ms: u64,
    /// How long stop() waits for the recognition loop
    pub join_timeout_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::SUPERVISOR_POLL_MS,
            join_timeout_ms: defaults::JOIN_TIMEOUT_MS,
        }
    }
}

impl SupervisorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("failed to open audio source: {0}")]
    Audio(String),

    #[error("supervisor cannot start from state {0}")]
    InvalidState(LifecycleState),
}

/// Requests a stop from outside the supervisory context
#[derive(Debug, Clone)]
pub struct StopHandle {
    running: RunningFlag,
}

impl StopHandle {
    /// Clear the running flag. Returns false if a stop was already requested.
    pub fn request_stop(&self, reason: &str) -> bool {
        self.running.clear(reason)
    }
}

/// Runs one connect -> run -> stop cycle
pub struct Supervisor {
    config: SupervisorConfig,
    audio_format: AudioFormat,
    frame_size: usize,
    vocabulary: CommandVocabulary,
    controller: SharedController,
    audio: Box<dyn AudioSource>,
    engine: Option<Box<dyn SpeechEngine>>,
    running: RunningFlag,
    fsm: LifecycleStateMachine,
    recognition: Option<JoinHandle<LoopStats>>,
}

impl Supervisor {
    pub fn new(
        config: &AppConfig,
        client: Box<dyn ProtocolClient>,
        audio: Box<dyn AudioSource>,
        engine: Box<dyn SpeechEngine>,
    ) -> Self {
        let controller = FanController::new(client, config.serial.clone(), config.retry);

        Self {
            config: config.supervisor,
            audio_format: config.audio.format(),
            frame_size: config.audio.frame_size,
            vocabulary: config.vocabulary.clone(),
            controller: Arc::new(Mutex::new(controller)),
            audio,
            engine: Some(engine),
            running: RunningFlag::new(),
            fsm: LifecycleStateMachine::new(),
            recognition: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.fsm.state()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: self.running.clone(),
        }
    }

    #[cfg(test)]
    pub fn controller(&self) -> SharedController {
        self.controller.clone()
    }

    /// Connect, launch the recognition loop and block until the running flag
    /// is cleared or `interrupt` resolves. Returns the stop reason.
    ///
    /// A connection failure ends the run before any audio is opened.
    pub async fn start<F>(&mut self, interrupt: F) -> Result<String, SupervisorError>
    where
        F: Future<Output = ()>,
    {
        if !self.fsm.process_event(LifecycleEvent::StartRequested).is_success() {
            return Err(SupervisorError::InvalidState(self.fsm.state()));
        }
        info!("[SUPERVISOR] {}", self.fsm.state());

        let report = match self.controller.lock().await.connect().await {
            Ok(report) => report,
            Err(e) => {
                self.fsm.process_event(LifecycleEvent::StartFailed);
                self.audio.terminate();
                error!("[SUPERVISOR] Startup aborted: {}", e);
                return Err(e.into());
            }
        };
        info!("[SUPERVISOR] {}", report.diagnostic());

        let stream = match self.audio.open(&self.audio_format).await {
            Ok(stream) => stream,
            Err(e) => {
                self.controller.lock().await.close().await;
                self.audio.terminate();
                self.fsm.process_event(LifecycleEvent::StartFailed);
                error!("[SUPERVISOR] Startup aborted: {:#}", e);
                return Err(SupervisorError::Audio(format!("{:#}", e)));
            }
        };
        info!("[SUPERVISOR] Audio source: {} ({})", self.audio.name(), self.audio_format);

        let Some(engine) = self.engine.take() else {
            return Err(SupervisorError::InvalidState(self.fsm.state()));
        };

        self.running.set();
        let dispatcher = CommandDispatcher::new(
            self.controller.clone(),
            self.running.clone(),
            self.vocabulary.clone(),
        );
        let recognition = RecognitionLoop::new(
            stream,
            engine,
            dispatcher,
            self.running.clone(),
            self.frame_size,
        );
        self.recognition = Some(tokio::spawn(recognition.run()));
        self.fsm.process_event(LifecycleEvent::Connected);
        info!("[SUPERVISOR] {}", self.fsm.state());

        self.wait(interrupt).await;

        let reason = self.running.reason().unwrap_or(INTERRUPTED).to_string();
        self.stop(&reason).await;
        Ok(reason)
    }

    /// Coarse poll of the running flag, raced against the interrupt
    async fn wait<F>(&self, interrupt: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(interrupt);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !self.running.is_set() {
                        break;
                    }
                }
                _ = &mut interrupt => {
                    info!("[SUPERVISOR] Interrupt received, stopping system...");
                    self.running.clear(INTERRUPTED);
                    break;
                }
            }
        }
    }

    /// Clear the running flag, join the recognition loop with a bounded
    /// timeout, then release the fan session and the audio source. Safe to
    /// call more than once.
    pub async fn stop(&mut self, reason: &str) {
        match self.fsm.state() {
            LifecycleState::Stopping | LifecycleState::Terminated => return,
            LifecycleState::Idle => {
                self.running.clear(reason);
                self.fsm.process_event(LifecycleEvent::StopRequested);
                self.audio.terminate();
                return;
            }
            LifecycleState::Connecting | LifecycleState::Running => {}
        }

        self.running.clear(reason);
        self.fsm.process_event(LifecycleEvent::StopRequested);
        info!(
            "[SUPERVISOR] Stopping: {}",
            self.running.reason().unwrap_or(reason)
        );

        if let Some(mut handle) = self.recognition.take() {
            match timeout(self.config.join_timeout(), &mut handle).await {
                Ok(Ok(stats)) => info!(
                    "[SUPERVISOR] Recognition loop joined ({} frames, {} skipped, {} utterances)",
                    stats.frames, stats.skipped, stats.utterances
                ),
                Ok(Err(e)) => error!("[SUPERVISOR] Recognition loop failed: {}", e),
                Err(_) => {
                    warn!(
                        "[SUPERVISOR] Recognition loop still busy after {:?}, releasing resources anyway",
                        self.config.join_timeout()
                    );
                    handle.abort();
                }
            }
        }

        {
            let mut controller = self.controller.lock().await;
            controller.close().await;
            info!(
                "[SUPERVISOR] Fan left {}",
                if controller.is_on() { "on" } else { "off" }
            );
        }
        self.audio.terminate();
        self.fsm.process_event(LifecycleEvent::Released);
        info!("[SUPERVISOR] System closed");
    }
}
