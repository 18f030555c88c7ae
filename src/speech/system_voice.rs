//! Local synthetic voice fallback
//!
//! Runs a system speech synthesiser (`espeak-ng` by default) as a child
//! process. The text goes in on stdin so it is never parsed as an option.
//! Cancelling kills every utterance currently being spoken.

use super::{PlaybackError, SyntheticVoice};
use crate::language::Language;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Notify;

/// Words per minute espeak-ng uses at rate 1.0
const BASE_WORDS_PER_MINUTE: f32 = 175.0;

/// Default speaking rate relative to normal
pub const DEFAULT_FALLBACK_RATE: f32 = 0.9;

/// Synthetic voice backed by a system command
pub struct SystemVoice {
    program: String,
    rate: f32,
    cancel: Notify,
}

impl SystemVoice {
    /// Create a voice using `program` at `rate` times normal speed
    pub fn new(program: impl Into<String>, rate: f32) -> Self {
        Self {
            program: program.into(),
            rate,
            cancel: Notify::new(),
        }
    }

    /// Command-line arguments for one utterance; the text itself is piped
    pub fn args(&self, language: Language) -> Vec<String> {
        let words_per_minute = (BASE_WORDS_PER_MINUTE * self.rate).round().max(80.0) as u32;
        vec![
            "-v".to_string(),
            language.voice_name().to_string(),
            "-s".to_string(),
            words_per_minute.to_string(),
            "--stdin".to_string(),
        ]
    }
}

impl Default for SystemVoice {
    fn default() -> Self {
        Self::new("espeak-ng", DEFAULT_FALLBACK_RATE)
    }
}

#[async_trait]
impl SyntheticVoice for SystemVoice {
    async fn speak(&self, text: &str, language: Language) -> Result<(), PlaybackError> {
        tracing::info!(
            "Speaking with synthetic voice ({}, {} characters)",
            language.voice_name(),
            text.chars().count()
        );

        let mut child = Command::new(&self.program)
            .args(self.args(language))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PlaybackError::Rejected(format!("failed to run {}: {}", self.program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|e| PlaybackError::Rejected(format!("failed to send text: {}", e)))?;
            // Closing stdin ends the utterance
            drop(stdin);
        }

        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|e| PlaybackError::Rejected(e.to_string()))?;
                if status.success() {
                    Ok(())
                } else {
                    Err(PlaybackError::Rejected(format!(
                        "{} exited with status: {}",
                        self.program, status
                    )))
                }
            }
            _ = self.cancel.notified() => {
                if let Err(e) = child.kill().await {
                    tracing::debug!("Failed to kill synthetic voice: {}", e);
                }
                Err(PlaybackError::Cancelled)
            }
        }
    }

    fn cancel(&self) {
        self.cancel.notify_waiters();
    }
}
