//! Line-fed capture
//!
//! Stands in for a microphone in the console front-end: every line pushed
//! through [`TypedInput`] becomes the final transcript of the session that
//! is listening at the time. Lines are stamped when typed. A session drops
//! lines typed before its turn was requested, so leftovers cannot leak into
//! a later turn while a line typed right after `/vi` still counts.

use super::{CaptureError, InterimCallback, SpeechCapture};
use crate::language::Language;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::time::Instant;

/// Default time to wait for a line before reporting silence
pub const DEFAULT_SILENCE_TIMEOUT: Duration = Duration::from_secs(8);

/// Sending half of a [`TypedCapture`]
#[derive(Debug, Clone)]
pub struct TypedInput {
    tx: mpsc::UnboundedSender<(Instant, String)>,
}

impl TypedInput {
    /// Queue a typed line. Fails once the capture is gone.
    pub fn send(&self, line: impl Into<String>) -> Result<(), String> {
        self.tx
            .send((Instant::now(), line.into()))
            .map_err(|_| "capture closed".to_string())
    }
}

/// Capture collaborator fed by text lines
pub struct TypedCapture {
    lines: Mutex<mpsc::UnboundedReceiver<(Instant, String)>>,
    requested_at: parking_lot::Mutex<Option<Instant>>,
    stop: Notify,
    silence_timeout: Duration,
}

impl TypedCapture {
    /// Creates a capture and the input used to feed it lines
    pub fn new(silence_timeout: Duration) -> (Self, TypedInput) {
        let (tx, rx) = mpsc::unbounded_channel();
        let capture = Self {
            lines: Mutex::new(rx),
            requested_at: parking_lot::Mutex::new(None),
            stop: Notify::new(),
            silence_timeout,
        };
        (capture, TypedInput { tx })
    }

    /// Configured silence timeout
    pub fn silence_timeout(&self) -> Duration {
        self.silence_timeout
    }

    /// Note that a turn was just requested.
    ///
    /// The next session keeps lines typed from now on, even those queued
    /// before it starts listening. Without a mark, the cutoff is the
    /// moment `listen` is called.
    pub fn mark_request(&self) {
        let mut requested_at = self.requested_at.lock();
        if requested_at.is_none() {
            *requested_at = Some(Instant::now());
        }
    }
}

fn transcript(line: Option<String>) -> Result<String, CaptureError> {
    match line {
        Some(line) if line.trim().is_empty() => Err(CaptureError::Silence),
        Some(line) => Ok(line.trim().to_string()),
        None => Err(CaptureError::Other("input closed".to_string())),
    }
}

#[async_trait]
impl SpeechCapture for TypedCapture {
    async fn listen(
        &self,
        language: Language,
        _interim: InterimCallback,
    ) -> Result<String, CaptureError> {
        let cutoff = self.requested_at.lock().take().unwrap_or_else(Instant::now);
        let mut lines = self.lines.lock().await;

        while let Ok((typed_at, line)) = lines.try_recv() {
            if typed_at >= cutoff {
                return transcript(Some(line));
            }
            tracing::debug!("Dropping line typed before the session");
        }

        tracing::debug!("Typed capture listening ({})", language.capture_tag());

        tokio::select! {
            line = lines.recv() => transcript(line.map(|(_, line)| line)),
            _ = tokio::time::sleep(self.silence_timeout) => Err(CaptureError::Silence),
            _ = self.stop.notified() => Err(CaptureError::Aborted),
        }
    }

    fn stop(&self) {
        self.stop.notify_waiters();
    }
}
