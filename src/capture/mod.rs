//! Speech capture collaborator
//!
//! A capture session listens in one language and ends with exactly one
//! terminal outcome: a final transcript or a [`CaptureError`]. Interim
//! transcripts may be reported along the way for live display only.

pub mod typed;

pub use typed::{TypedCapture, TypedInput};

use crate::language::Language;
use async_trait::async_trait;
use std::sync::Arc;

/// Why a capture session ended without a transcript
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    /// Nothing was said before the recogniser gave up
    #[error("No speech detected")]
    Silence,

    /// Microphone access was refused
    #[error("Microphone permission denied")]
    PermissionDenied,

    /// The session was stopped programmatically
    #[error("Capture aborted")]
    Aborted,

    /// Any other recogniser failure
    #[error("Speech recognition failed: {0}")]
    Other(String),
}

/// Receives interim transcripts of the running session
pub type InterimCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Speech-to-text capture service
#[async_trait]
pub trait SpeechCapture: Send + Sync {
    /// Run one listening session in `language`
    ///
    /// Resolves with the final transcript or the reason the session ended.
    /// Interim transcripts are passed to `interim` as they arrive.
    async fn listen(
        &self,
        language: Language,
        interim: InterimCallback,
    ) -> Result<String, CaptureError>;

    /// Ask the running session, if any, to stop
    ///
    /// Must be a no-op when no session is running.
    fn stop(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(CaptureError::Silence.to_string(), "No speech detected");
        assert_eq!(
            CaptureError::Other("network".to_string()).to_string(),
            "Speech recognition failed: network"
        );
    }
}
