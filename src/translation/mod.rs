//! Translation and romanization
//!
//! Wraps the translation and romanization collaborators into a single call
//! that yields the translated text plus, for Chinese output, a pinyin
//! annotation. Romanization is best-effort: its failure only empties the
//! annotation.

pub mod google;

pub use google::GoogleTranslateClient;

use crate::language::Language;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Error types for translation service requests
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("All {attempts} retry attempts failed: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

/// The translation step of a turn failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranslationError {
    #[error("Could not translate text: {0}")]
    Failed(#[source] ServiceError),
}

/// One fragment of romanized text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RomanizedFragment {
    /// Source fragment
    pub fragment: String,
    /// Phonetic annotation, absent when the service has none
    pub phonetic: Option<String>,
}

/// Output of one translation turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationResult {
    /// Translated text
    pub translated_text: String,
    /// Space-separated phonetic annotation, possibly empty
    pub annotation: String,
}

/// Text translation service
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text`, returning the translated fragments in service order
    async fn translate(
        &self,
        text: &str,
        source: Language,
        target: Language,
    ) -> Result<Vec<String>, ServiceError>;
}

/// Transliteration service
#[async_trait]
pub trait Romanizer: Send + Sync {
    /// Phonetic annotation for each fragment of `text`
    async fn romanize(
        &self,
        text: &str,
        language: Language,
    ) -> Result<Vec<RomanizedFragment>, ServiceError>;
}

/// Translation plus annotation adapter
#[derive(Clone)]
pub struct TranslationService {
    translator: Arc<dyn Translator>,
    romanizer: Arc<dyn Romanizer>,
}

impl TranslationService {
    /// Creates the adapter over the given collaborators
    pub fn new(translator: Arc<dyn Translator>, romanizer: Arc<dyn Romanizer>) -> Self {
        Self {
            translator,
            romanizer,
        }
    }

    /// Translate `text` and, for Chinese output, annotate it with pinyin
    pub async fn translate(
        &self,
        text: &str,
        source: Language,
        target: Language,
    ) -> Result<TranslationResult, TranslationError> {
        tracing::info!(
            "Translating {} -> {} ({} characters)",
            source.translate_tag(),
            target.translate_tag(),
            text.chars().count()
        );

        let fragments = self
            .translator
            .translate(text, source, target)
            .await
            .map_err(|e| {
                tracing::error!("Translation failed: {}", e);
                TranslationError::Failed(e)
            })?;

        let translated_text = fragments.concat();

        let annotation = if target == Language::Chinese && !translated_text.is_empty() {
            self.annotate(&translated_text, target).await
        } else {
            String::new()
        };

        Ok(TranslationResult {
            translated_text,
            annotation,
        })
    }

    async fn annotate(&self, text: &str, language: Language) -> String {
        match self.romanizer.romanize(text, language).await {
            Ok(fragments) => join_phonetics(&fragments),
            Err(e) => {
                tracing::warn!("Romanization failed, continuing without annotation: {}", e);
                String::new()
            }
        }
    }
}

/// Join the non-empty phonetic annotations with single spaces
fn join_phonetics(fragments: &[RomanizedFragment]) -> String {
    fragments
        .iter()
        .filter_map(|f| f.phonetic.as_deref())
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
