//! Application configuration
//!
//! Loaded from TOML. Every section and field is optional; missing values take
//! the defaults in `voice_fan_shared::defaults`.

use crate::audio::AudioConfig;
use crate::device::RetryPolicy;
use crate::intent::CommandVocabulary;
use crate::modbus::ConnectionConfig;
use crate::speech::SpeechConfig;
use crate::supervisor::SupervisorConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "VOICE_FAN_CONFIG";
/// Config file picked up from the working directory
pub const DEFAULT_CONFIG_FILE: &str = "voice-fan.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub serial: ConnectionConfig,
    pub retry: RetryPolicy,
    pub audio: AudioConfig,
    pub speech: SpeechConfig,
    pub supervisor: SupervisorConfig,
    pub vocabulary: CommandVocabulary,
}

impl AppConfig {
    /// Load from `$VOICE_FAN_CONFIG`, else `./voice-fan.toml`, else defaults
    pub fn load() -> Result<Self> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::load_from_file(PathBuf::from(path));
        }

        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return Self::load_from_file(local);
        }

        info!("[CONFIG] No config file, using defaults");
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        info!("[CONFIG] Loaded {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.serial.validate().context("[serial]")?;
        self.audio.validate().context("[audio]")?;
        self.vocabulary.validate().context("[vocabulary]")?;
        Ok(())
    }
}

/// Durations written as (fractional) seconds, e.g. `timeout = 3` or
/// `retry_delay = 0.5`
pub mod seconds {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|_| D::Error::custom(format!("expected a non-negative number of seconds, got {}", secs)))
    }
}
