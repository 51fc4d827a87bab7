//! Fixed-phrase intent classification

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Punctuation the recognizer may insert between words
const PUNCTUATION: &[char] = &['，', '。', ',', '.', '！', '!', '？', '?', '、'];

/// What an utterance asks the system to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    TurnOn,
    TurnOff,
    Shutdown,
    Unknown,
}

impl Intent {
    /// Fan state the intent asks for, if it is a switching intent
    pub fn target_state(self) -> Option<bool> {
        match self {
            Intent::TurnOn => Some(true),
            Intent::TurnOff => Some(false),
            Intent::Shutdown | Intent::Unknown => None,
        }
    }
}

/// Strip whitespace and punctuation so phrases match regardless of how the
/// recognizer segmented them
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace() && !PUNCTUATION.contains(c))
        .collect()
}

/// Accepted phrases per intent. Matching is substring containment, checked in
/// the order turn_on, turn_off, shutdown; the first category with a match wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommandVocabulary {
    pub turn_on: Vec<String>,
    pub turn_off: Vec<String>,
    pub shutdown: Vec<String>,
}

impl Default for CommandVocabulary {
    fn default() -> Self {
        Self {
            turn_on: vec!["打开风扇".into(), "开启风扇".into(), "启动风扇".into()],
            turn_off: vec!["关闭风扇".into(), "关掉风扇".into(), "停止风扇".into()],
            shutdown: vec!["退出系统".into()],
        }
    }
}

impl CommandVocabulary {
    fn in_priority_order(&self) -> [(Intent, &[String]); 3] {
        [
            (Intent::TurnOn, self.turn_on.as_slice()),
            (Intent::TurnOff, self.turn_off.as_slice()),
            (Intent::Shutdown, self.shutdown.as_slice()),
        ]
    }

    pub fn classify(&self, cleaned: &str) -> Intent {
        for (intent, phrases) in self.in_priority_order() {
            if phrases.iter().any(|phrase| cleaned.contains(phrase.as_str())) {
                return intent;
            }
        }
        Intent::Unknown
    }

    /// Hint listing one phrase per command
    pub fn guidance(&self) -> String {
        let commands: Vec<&str> = self
            .in_priority_order()
            .into_iter()
            .filter_map(|(_, phrases)| phrases.first().map(String::as_str))
            .collect();
        format!("Available commands: {}", commands.join(", "))
    }

    /// Every category needs at least one phrase, and phrases must already be
    /// in normalized form or they could never match.
    pub fn validate(&self) -> Result<()> {
        for (intent, phrases) in self.in_priority_order() {
            if phrases.is_empty() {
                bail!("vocabulary for {:?} is empty", intent);
            }
            for phrase in phrases {
                if phrase.is_empty() || normalize(phrase) != *phrase {
                    bail!("vocabulary phrase {:?} for {:?} is not normalized", phrase, intent);
                }
            }
        }
        Ok(())
    }
}
