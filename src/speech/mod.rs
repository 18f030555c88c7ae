//! Speech output
//!
//! Speaks translated text through the networked playback collaborator,
//! chunk by chunk, and falls back to a local synthetic voice for the whole
//! text as soon as any chunk fails. A single-slot preload cache lets the
//! first (and only) chunk start downloading while the turn is still being
//! set up.

pub mod chunk;
pub mod google;
pub mod system_voice;

pub use chunk::{split_chunks, DEFAULT_MAX_CHUNK_CHARS};
pub use google::GoogleTtsPlayback;
pub use system_voice::SystemVoice;

use crate::language::Language;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;

/// Error types for speech playback
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaybackError {
    /// The audio resource could not be fetched or decoded
    #[error("Audio resource error: {0}")]
    Resource(String),

    /// The player refused or failed to play the resource
    #[error("Playback rejected: {0}")]
    Rejected(String),

    /// Playback was cancelled
    #[error("Playback cancelled")]
    Cancelled,
}

/// A fetched, playable audio resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    /// Encoded audio bytes
    pub data: Vec<u8>,
    /// File extension of the encoding (e.g. "mp3")
    pub extension: String,
}

/// Networked text-to-speech playback
#[async_trait]
pub trait AudioPlayback: Send + Sync {
    /// Resolve `text` in `language` to a playable resource
    async fn load(&self, text: &str, language: Language) -> Result<AudioClip, PlaybackError>;

    /// Play a resource to the end
    async fn play(&self, clip: &AudioClip) -> Result<(), PlaybackError>;
}

/// Local synthetic voice used when networked playback fails
#[async_trait]
pub trait SyntheticVoice: Send + Sync {
    /// Speak `text` to the end
    async fn speak(&self, text: &str, language: Language) -> Result<(), PlaybackError>;

    /// Cancel any in-flight or queued utterance
    fn cancel(&self);
}

/// How a `speak` call finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechOutcome {
    /// Every chunk played through the networked voice
    Completed,
    /// Networked playback failed and the synthetic voice spoke the text
    FellBack,
    /// The synthetic fallback failed as well
    FallbackFailed,
}

type PreloadCell = Arc<OnceCell<Result<AudioClip, PlaybackError>>>;

/// Lookahead audio for a single-chunk text
struct Preloaded {
    text: String,
    language: Language,
    cell: PreloadCell,
}

/// Speech output orchestrator
pub struct SpeechOutput {
    playback: Arc<dyn AudioPlayback>,
    fallback: Arc<dyn SyntheticVoice>,
    max_chunk_chars: usize,
    preloaded: Mutex<Option<Preloaded>>,
}

impl SpeechOutput {
    /// Creates an orchestrator over the given collaborators
    pub fn new(
        playback: Arc<dyn AudioPlayback>,
        fallback: Arc<dyn SyntheticVoice>,
        max_chunk_chars: usize,
    ) -> Self {
        Self {
            playback,
            fallback,
            max_chunk_chars,
            preloaded: Mutex::new(None),
        }
    }

    /// Start fetching audio for `text` ahead of `speak`
    ///
    /// Only single-chunk texts are preloaded. Replaces whatever the cache
    /// held before. Must be called from within a tokio runtime.
    pub fn preload(&self, text: &str, language: Language) -> Option<JoinHandle<()>> {
        let chunks = split_chunks(text, self.max_chunk_chars);
        if chunks.len() != 1 {
            *self.preloaded.lock() = None;
            return None;
        }

        let cell: PreloadCell = Arc::new(OnceCell::new());
        *self.preloaded.lock() = Some(Preloaded {
            text: text.to_string(),
            language,
            cell: cell.clone(),
        });

        tracing::debug!("Preloading audio ({} characters)", text.chars().count());

        let playback = self.playback.clone();
        let chunk = chunks.into_iter().next().unwrap_or_default();
        Some(tokio::spawn(async move {
            let result = cell
                .get_or_init(|| async { playback.load(&chunk, language).await })
                .await;
            if let Err(e) = result {
                tracing::debug!("Preload failed: {}", e);
            }
        }))
    }

    /// Speak `text` in `language`
    ///
    /// Chunks play strictly one after another. The first playback error
    /// abandons networked playback and hands the entire original text to
    /// the synthetic voice; that path is terminal. The returned future
    /// resolves exactly once on every path.
    pub async fn speak(&self, text: &str, language: Language) -> SpeechOutcome {
        let chunks = split_chunks(text, self.max_chunk_chars);

        // Consume the cache; it is only good for this exact text
        let preloaded = self
            .preloaded
            .lock()
            .take()
            .filter(|p| chunks.len() == 1 && p.text == text && p.language == language);

        tracing::info!(
            "Speaking {} characters in {} chunk(s) ({})",
            text.chars().count(),
            chunks.len(),
            language.speech_tag()
        );

        for (index, chunk) in chunks.iter().enumerate() {
            let clip = match &preloaded {
                Some(p) if index == 0 => {
                    let playback = self.playback.clone();
                    p.cell
                        .get_or_init(|| async move { playback.load(chunk, language).await })
                        .await
                        .clone()
                }
                _ => self.playback.load(chunk, language).await,
            };

            let played = match clip {
                Ok(clip) => self.playback.play(&clip).await,
                Err(e) => Err(e),
            };

            if let Err(e) = played {
                tracing::warn!(
                    "Playback of chunk {}/{} failed, switching to synthetic voice: {}",
                    index + 1,
                    chunks.len(),
                    e
                );
                return self.fall_back(text, language).await;
            }
        }

        SpeechOutcome::Completed
    }

    /// Cancel synthetic speech and drop any preloaded audio
    pub fn cancel(&self) {
        self.fallback.cancel();
        *self.preloaded.lock() = None;
    }

    /// Whether audio for `text` is currently cached
    pub fn is_preloaded(&self, text: &str, language: Language) -> bool {
        self.preloaded
            .lock()
            .as_ref()
            .map(|p| p.text == text && p.language == language)
            .unwrap_or(false)
    }

    async fn fall_back(&self, text: &str, language: Language) -> SpeechOutcome {
        match self.fallback.speak(text, language).await {
            Ok(()) => SpeechOutcome::FellBack,
            Err(e) => {
                tracing::warn!("Synthetic voice failed: {}", e);
                SpeechOutcome::FallbackFailed
            }
        }
    }
}
