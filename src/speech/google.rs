//! Networked speech via the Google Translate TTS endpoint
//!
//! Audio is fetched as MP3 from `translate_tts` and handed to an external
//! command-line player (`mpg123` by default). The player process and the
//! temp audio file both go away if the playing future is dropped, so
//! aborting a speech task silences it and leaves nothing behind.

use super::{AudioClip, AudioPlayback, PlaybackError};
use crate::language::Language;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Default TTS endpoint base
pub const DEFAULT_TTS_BASE_URL: &str = "https://translate.google.com";

/// Default timeout for fetching audio in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// External audio player invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerCommand {
    /// Program to run
    pub program: String,
    /// Arguments placed before the audio file path
    pub args: Vec<String>,
}

impl Default for PlayerCommand {
    fn default() -> Self {
        Self {
            program: "mpg123".to_string(),
            args: vec!["-q".to_string()],
        }
    }
}

/// Google TTS playback collaborator
#[derive(Debug, Clone)]
pub struct GoogleTtsPlayback {
    base_url: String,
    client: reqwest::Client,
    player: PlayerCommand,
    temp_dir: PathBuf,
}

impl Default for GoogleTtsPlayback {
    fn default() -> Self {
        Self::new(DEFAULT_TTS_BASE_URL, PlayerCommand::default())
    }
}

impl GoogleTtsPlayback {
    /// Create a playback collaborator for the given endpoint and player
    pub fn new(base_url: &str, player: PlayerCommand) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                tracing::error!("Failed to build HTTP client, using defaults: {}", e);
                reqwest::Client::new()
            });

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            player,
            temp_dir: std::env::temp_dir(),
        }
    }

    /// Write temp audio files under `dir` instead of the system temp dir
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    /// URL of the audio resource for one chunk
    pub fn audio_url(&self, text: &str, language: Language) -> Result<url::Url, PlaybackError> {
        url::Url::parse_with_params(
            &format!("{}/translate_tts", self.base_url),
            &[
                ("ie", "UTF-8"),
                ("q", text),
                ("tl", language.speech_tag()),
                ("client", "tw-ob"),
            ],
        )
        .map_err(|e| PlaybackError::Resource(format!("invalid URL: {}", e)))
    }

    /// Temp file for one clip, removed when the returned handle drops
    fn temp_file(&self, extension: &str) -> Result<tempfile::NamedTempFile, PlaybackError> {
        tempfile::Builder::new()
            .prefix("tandem_tts_")
            .suffix(&format!(".{}", extension))
            .tempfile_in(&self.temp_dir)
            .map_err(|e| PlaybackError::Resource(format!("failed to create temp audio: {}", e)))
    }
}

#[async_trait]
impl AudioPlayback for GoogleTtsPlayback {
    async fn load(&self, text: &str, language: Language) -> Result<AudioClip, PlaybackError> {
        let url = self.audio_url(text, language)?;

        let response = self
            .client
            .get(url)
            .header(
                "User-Agent",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36",
            )
            .send()
            .await
            .map_err(|e| PlaybackError::Resource(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PlaybackError::Resource(format!(
                "TTS endpoint returned {}",
                response.status()
            )));
        }

        let data = response
            .bytes()
            .await
            .map_err(|e| PlaybackError::Resource(e.to_string()))?;

        if data.is_empty() {
            return Err(PlaybackError::Resource("empty audio response".to_string()));
        }

        tracing::debug!("Fetched {} bytes of audio", data.len());

        Ok(AudioClip {
            data: data.to_vec(),
            extension: "mp3".to_string(),
        })
    }

    async fn play(&self, clip: &AudioClip) -> Result<(), PlaybackError> {
        // Owns the file; dropping it (including on abort) deletes it
        let file = self.temp_file(&clip.extension)?;
        let path = file.path().to_path_buf();

        tokio::fs::write(&path, &clip.data)
            .await
            .map_err(|e| PlaybackError::Resource(format!("failed to write temp audio: {}", e)))?;

        tracing::debug!(
            player = %self.player.program,
            path = %path.display(),
            "playing audio"
        );

        let status = Command::new(&self.player.program)
            .args(&self.player.args)
            .arg(&path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await;

        if let Err(e) = file.close() {
            tracing::debug!("Failed to remove temp audio {}: {}", path.display(), e);
        }

        let status = status.map_err(|e| {
            PlaybackError::Rejected(format!("failed to run {}: {}", self.player.program, e))
        })?;

        if !status.success() {
            return Err(PlaybackError::Rejected(format!(
                "{} exited with status: {}",
                self.player.program, status
            )));
        }

        Ok(())
    }
}
