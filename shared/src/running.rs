//! Shared running flag
//!
//! A one-shot Set -> Clear signal shared between the supervisor and the
//! recognition loop. Once cleared it can never be set again, so a flag is
//! good for exactly one run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct RunningFlag {
    started: Arc<AtomicBool>,
    token: CancellationToken,
    reason: Arc<OnceLock<String>>,
}

impl RunningFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag. Returns false if it was already set or has been cleared.
    pub fn set(&self) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        !self.started.swap(true, Ordering::SeqCst)
    }

    /// True between `set` and `clear`
    pub fn is_set(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.token.is_cancelled()
    }

    /// Clear the flag, recording why. Only the first call wins; later calls
    /// return false and leave the recorded reason untouched.
    pub fn clear(&self, reason: impl Into<String>) -> bool {
        if self.reason.set(reason.into()).is_err() {
            return false;
        }
        self.token.cancel();
        true
    }

    pub fn is_cleared(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Reason passed to the winning `clear` call
    pub fn reason(&self) -> Option<&str> {
        self.reason.get().map(String::as_str)
    }

    /// Resolves once the flag is cleared
    pub async fn cleared(&self) {
        self.token.cancelled().await
    }
}
