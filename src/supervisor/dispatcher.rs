//! Command dispatcher - classifies utterances and drives the fan controller

use super::USER_REQUESTED;
use crate::device::{FanController, StateChange, WritePath};
use crate::intent::{normalize, CommandVocabulary, Intent};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};
use voice_fan_shared::RunningFlag;

/// Fan controller shared between the supervisor and the recognition loop
pub type SharedController = Arc<Mutex<FanController>>;

/// Result of dispatching one utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    /// Fan was switched
    Switched { on: bool, attempt: u32, path: WritePath },
    /// Fan was already in the requested state, nothing sent
    AlreadyInState { on: bool },
    /// Every write attempt failed; the loop keeps running
    Failed { on: bool, message: String },
    /// Shutdown was requested and the running flag cleared
    ShutdownRequested,
    /// No command phrase matched
    Unrecognized { guidance: String },
    /// Utterance was empty after normalization
    Ignored,
}

/// Routes recognized text to the fan controller
pub struct CommandDispatcher {
    controller: SharedController,
    running: RunningFlag,
    vocabulary: CommandVocabulary,
}

impl CommandDispatcher {
    pub fn new(controller: SharedController, running: RunningFlag, vocabulary: CommandVocabulary) -> Self {
        Self {
            controller,
            running,
            vocabulary,
        }
    }

    pub fn guidance(&self) -> String {
        self.vocabulary.guidance()
    }

    /// Normalize, classify and execute one utterance
    pub async fn dispatch(&self, text: &str) -> DispatchResult {
        let cleaned = normalize(text);
        if cleaned.is_empty() {
            return DispatchResult::Ignored;
        }

        info!("[VOICE] Recognized command: {}", cleaned);
        let intent = self.vocabulary.classify(&cleaned);

        let result = match intent.target_state() {
            Some(on) => self.switch(on).await,
            None if intent == Intent::Shutdown => {
                // first half of stop: the supervisor sees the cleared flag
                // and does the join and release
                self.running.clear(USER_REQUESTED);
                DispatchResult::ShutdownRequested
            }
            None => DispatchResult::Unrecognized {
                guidance: self.vocabulary.guidance(),
            },
        };

        match &result {
            DispatchResult::Switched { on, attempt, path } => {
                info!(
                    "[VOICE] Fan turned {} (attempt {}, {:?})",
                    if *on { "on" } else { "off" },
                    attempt,
                    path
                );
            }
            DispatchResult::AlreadyInState { on } => {
                info!("[VOICE] Fan is already {}", if *on { "on" } else { "off" });
            }
            DispatchResult::Failed { on, message } => {
                error!(
                    "[VOICE] Failed to turn fan {}: {}",
                    if *on { "on" } else { "off" },
                    message
                );
            }
            DispatchResult::ShutdownRequested => {
                info!("[VOICE] Exiting...");
            }
            DispatchResult::Unrecognized { guidance } => {
                info!("[VOICE] Unrecognized command. {}", guidance);
            }
            DispatchResult::Ignored => {}
        }

        result
    }

    async fn switch(&self, on: bool) -> DispatchResult {
        let mut controller = self.controller.lock().await;
        match controller.set_state(on).await {
            Ok(StateChange::Unchanged) => DispatchResult::AlreadyInState { on },
            Ok(StateChange::Applied { attempt, path }) => DispatchResult::Switched { on, attempt, path },
            Err(e) => DispatchResult::Failed {
                on,
                message: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::RetryPolicy;
    use crate::modbus::mock::{ScriptedClient, Step};
    use crate::modbus::ConnectionConfig;

    async fn dispatcher(client: &ScriptedClient) -> (CommandDispatcher, RunningFlag, SharedController) {
        let mut fan = FanController::new(
            Box::new(client.clone()),
            ConnectionConfig::default(),
            RetryPolicy {
                max_retries: 1,
                retry_delay: std::time::Duration::ZERO,
            },
        );
        fan.connect().await.unwrap();
        let controller = Arc::new(Mutex::new(fan));
        let running = RunningFlag::new();
        running.set();
        let dispatcher = CommandDispatcher::new(controller.clone(), running.clone(), CommandVocabulary::default());
        (dispatcher, running, controller)
    }

    #[tokio::test]
    async fn test_turn_on_then_already_on() {
        let client = ScriptedClient::new();
        let (dispatcher, _, controller) = dispatcher(&client).await;

        let result = dispatcher.dispatch("打 开 风 扇").await;
        assert_eq!(
            result,
            DispatchResult::Switched {
                on: true,
                attempt: 1,
                path: WritePath::HoldingRegister
            }
        );
        assert!(controller.lock().await.is_on());

        let before = client.transport_calls();
        assert_eq!(
            dispatcher.dispatch("开启风扇").await,
            DispatchResult::AlreadyInState { on: true }
        );
        assert_eq!(client.transport_calls(), before);
    }

    #[tokio::test]
    async fn test_turn_off_when_already_off() {
        let client = ScriptedClient::new();
        let (dispatcher, _, _) = dispatcher(&client).await;

        assert_eq!(
            dispatcher.dispatch("关闭风扇。").await,
            DispatchResult::AlreadyInState { on: false }
        );
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_running() {
        let client = ScriptedClient::new()
            .registers([Step::Fault, Step::Fault]);
        let (dispatcher, running, controller) = dispatcher(&client).await;

        let result = dispatcher.dispatch("打开风扇").await;
        assert!(matches!(result, DispatchResult::Failed { on: true, .. }));
        assert!(running.is_set());
        assert!(!controller.lock().await.is_on());
    }

    #[tokio::test]
    async fn test_shutdown_clears_running_flag() {
        let client = ScriptedClient::new();
        let (dispatcher, running, _) = dispatcher(&client).await;

        assert_eq!(dispatcher.dispatch("退出系统").await, DispatchResult::ShutdownRequested);
        assert!(!running.is_set());
        assert_eq!(running.reason(), Some(USER_REQUESTED));
    }

    #[tokio::test]
    async fn test_unknown_gives_guidance() {
        let client = ScriptedClient::new();
        let (dispatcher, running, _) = dispatcher(&client).await;
        let before = client.transport_calls();

        let result = dispatcher.dispatch("随便说点什么").await;
        match result {
            DispatchResult::Unrecognized { guidance } => {
                assert!(guidance.contains("打开风扇"));
                assert!(guidance.contains("关闭风扇"));
                assert!(guidance.contains("退出系统"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(running.is_set());
        assert_eq!(client.transport_calls(), before);
    }

    #[derive(Clone, Default)]
    struct LogCapture(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_unknown_is_logged_as_info() {
        let capture = LogCapture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::TRACE)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let client = ScriptedClient::new();
        let (dispatcher, _, _) = dispatcher(&client).await;
        dispatcher.dispatch("随便说点什么").await;

        let logs = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        let line = logs
            .lines()
            .find(|l| l.contains("Available commands"))
            .expect("guidance was logged");
        assert!(line.contains("INFO"), "unexpected level: {}", line);
        assert!(!logs.contains("WARN"));
        assert!(!logs.contains("ERROR"));
    }

    #[tokio::test]
    async fn test_punctuation_only_is_ignored() {
        let client = ScriptedClient::new();
        let (dispatcher, _, _) = dispatcher(&client).await;
        assert_eq!(dispatcher.dispatch(" ，。 ").await, DispatchResult::Ignored);
    }
}
