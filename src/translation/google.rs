//! HTTP client for the public Google Translate endpoint
//!
//! Uses the keyless `translate_a/single` endpoint. Translation asks for
//! `dt=t` and reads `data[0][i][0]`; romanization translates the text into
//! its own language with `dt=rm` and reads `data[0][i][3]`.
//! Supports retry with exponential backoff and configurable timeout.

use super::{RomanizedFragment, Romanizer, ServiceError, Translator};
use crate::language::Language;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;

/// Default translate endpoint base
pub const DEFAULT_TRANSLATE_BASE_URL: &str = "https://translate.googleapis.com";

/// Default timeout for API requests in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Maximum number of retry attempts
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff in milliseconds
const BASE_RETRY_DELAY_MS: u64 = 100;

/// Google Translate HTTP client
///
/// Implements both [`Translator`] and [`Romanizer`].
#[derive(Debug, Clone)]
pub struct GoogleTranslateClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl Default for GoogleTranslateClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GoogleTranslateClient {
    /// Create a client with default settings
    pub fn new() -> Self {
        Self::with_config(DEFAULT_TRANSLATE_BASE_URL, DEFAULT_TIMEOUT_SECS)
    }

    /// Create a client with a custom base URL and timeout
    ///
    /// Falls back to a client without a timeout if the builder fails.
    pub fn with_config(base_url: &str, timeout_secs: u64) -> Self {
        let timeout = Duration::from_secs(timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::error!("Failed to build HTTP client, using defaults: {}", e);
                reqwest::Client::new()
            });

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout,
        }
    }

    /// Get the configured timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Build the request URL for a single query
    fn request_url(
        &self,
        text: &str,
        source: &str,
        target: &str,
        data_type: &str,
    ) -> Result<url::Url, ServiceError> {
        url::Url::parse_with_params(
            &format!("{}/translate_a/single", self.base_url),
            &[
                ("client", "gtx"),
                ("sl", source),
                ("tl", target),
                ("dt", data_type),
                ("q", text),
            ],
        )
        .map_err(|e| ServiceError::ConnectionFailed(format!("invalid URL: {}", e)))
    }

    /// Send a single request and decode the JSON body (internal helper)
    async fn send_request(&self, url: &url::Url) -> Result<Value, ServiceError> {
        let response = self
            .client
            .get(url.clone())
            .header("User-Agent", "Mozilla/5.0")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ServiceError::Timeout(self.timeout.as_secs())
                } else {
                    ServiceError::ConnectionFailed(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ServiceError::ServerError { status, message });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ServiceError::ParseError(e.to_string()))
    }

    /// Send a request with retry logic
    ///
    /// Retries up to 3 times with exponential backoff (100ms, 200ms, 400ms)
    /// on connection failures, timeouts and 5xx responses.
    async fn get_json(&self, url: &url::Url) -> Result<Value, ServiceError> {
        let mut last_error: Option<ServiceError> = None;

        for attempt in 0..MAX_RETRY_ATTEMPTS {
            match self.send_request(url).await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::debug!("Request succeeded on attempt {}", attempt + 1);
                    }
                    return Ok(value);
                }
                Err(e) => {
                    if !is_retryable(&e) {
                        return Err(e);
                    }

                    if attempt == MAX_RETRY_ATTEMPTS - 1 {
                        tracing::error!(
                            "Translate request failed (attempt {}): {}",
                            attempt + 1,
                            e
                        );
                        last_error = Some(e);
                        break;
                    }

                    let delay_ms = BASE_RETRY_DELAY_MS * 2u64.pow(attempt);
                    tracing::warn!(
                        "Translate request failed (attempt {}), retrying in {}ms: {}",
                        attempt + 1,
                        delay_ms,
                        e
                    );
                    last_error = Some(e);
                    sleep(Duration::from_millis(delay_ms)).await;
                }
            }
        }

        Err(ServiceError::RetriesExhausted {
            attempts: MAX_RETRY_ATTEMPTS,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

fn is_retryable(error: &ServiceError) -> bool {
    match error {
        ServiceError::ConnectionFailed(_) | ServiceError::Timeout(_) => true,
        ServiceError::ServerError { status, .. } => *status >= 500,
        _ => false,
    }
}

/// Rows of `data[0]`, or nothing when the service returned no sentences
fn sentence_rows(data: &Value) -> Result<&[Value], ServiceError> {
    let top = data
        .as_array()
        .ok_or_else(|| ServiceError::ParseError("expected a JSON array".to_string()))?;

    Ok(top
        .first()
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]))
}

/// Extract translated fragments (`data[0][i][0]`) in response order
pub fn parse_translation(data: &Value) -> Result<Vec<String>, ServiceError> {
    Ok(sentence_rows(data)?
        .iter()
        .filter_map(|row| row.get(0).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect())
}

/// Extract romanization rows (`data[0][i][3]` is the phonetic annotation)
pub fn parse_romanization(data: &Value) -> Result<Vec<RomanizedFragment>, ServiceError> {
    Ok(sentence_rows(data)?
        .iter()
        .filter(|row| row.is_array())
        .map(|row| RomanizedFragment {
            fragment: row
                .get(0)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            phonetic: row
                .get(3)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        })
        .collect())
}

#[async_trait]
impl Translator for GoogleTranslateClient {
    async fn translate(
        &self,
        text: &str,
        source: Language,
        target: Language,
    ) -> Result<Vec<String>, ServiceError> {
        let url = self.request_url(text, source.translate_tag(), target.translate_tag(), "t")?;
        let data = self.get_json(&url).await?;
        let fragments = parse_translation(&data)?;
        tracing::debug!("Received {} translated fragments", fragments.len());
        Ok(fragments)
    }
}

#[async_trait]
impl Romanizer for GoogleTranslateClient {
    async fn romanize(
        &self,
        text: &str,
        language: Language,
    ) -> Result<Vec<RomanizedFragment>, ServiceError> {
        let tag = language.translate_tag();
        let url = self.request_url(text, tag, tag, "rm")?;
        let data = self.get_json(&url).await?;
        parse_romanization(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_creation() {
        let client = GoogleTranslateClient::new();
        assert_eq!(client.base_url, DEFAULT_TRANSLATE_BASE_URL);
        assert_eq!(client.timeout().as_secs(), DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let client = GoogleTranslateClient::with_config("http://localhost:8080/", 5);
        assert_eq!(client.base_url, "http://localhost:8080");
        assert_eq!(client.timeout().as_secs(), 5);
    }

    #[test]
    fn test_request_url_encodes_query() {
        let client = GoogleTranslateClient::new();
        let url = client
            .request_url("xin chào & bạn", "vi", "zh-CN", "t")
            .unwrap();

        assert_eq!(url.path(), "/translate_a/single");
        let params: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(params.contains(&("client".to_string(), "gtx".to_string())));
        assert!(params.contains(&("sl".to_string(), "vi".to_string())));
        assert!(params.contains(&("tl".to_string(), "zh-CN".to_string())));
        assert!(params.contains(&("dt".to_string(), "t".to_string())));
        assert!(params.contains(&("q".to_string(), "xin chào & bạn".to_string())));
    }

    #[test]
    fn test_parse_translation_preserves_order() {
        let data = json!([
            [
                ["你好，", "xin chào, ", null, null, 10],
                ["朋友。", "bạn.", null, null, 10],
                ["你好，", "xin chào, ", null, null, 10]
            ],
            null,
            "vi"
        ]);

        let fragments = parse_translation(&data).unwrap();
        assert_eq!(fragments, vec!["你好，", "朋友。", "你好，"]);
    }

    #[test]
    fn test_parse_translation_null_sentences_is_empty() {
        let data = json!([null, null, "vi"]);
        assert!(parse_translation(&data).unwrap().is_empty());
    }

    #[test]
    fn test_parse_translation_rejects_non_array() {
        let data = json!({"error": "bad request"});
        assert!(matches!(
            parse_translation(&data),
            Err(ServiceError::ParseError(_))
        ));
    }

    #[test]
    fn test_parse_romanization() {
        let data = json!([
            [
                [null, null, null, "Nǐ hǎo"],
                [null, null, null, ""],
                [null, null, null, "péngyǒu"]
            ],
            null,
            "zh-CN"
        ]);

        let rows = parse_romanization(&data).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].phonetic.as_deref(), Some("Nǐ hǎo"));
        assert_eq!(rows[1].phonetic, None);
        assert_eq!(rows[2].phonetic.as_deref(), Some("péngyǒu"));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(is_retryable(&ServiceError::Timeout(10)));
        assert!(is_retryable(&ServiceError::ConnectionFailed("x".into())));
        assert!(is_retryable(&ServiceError::ServerError {
            status: 503,
            message: String::new()
        }));
        assert!(!is_retryable(&ServiceError::ServerError {
            status: 429,
            message: String::new()
        }));
        assert!(!is_retryable(&ServiceError::ParseError("x".into())));
    }

    #[test]
    fn test_error_display() {
        let err = ServiceError::ServerError {
            status: 500,
            message: "Internal error".to_string(),
        };
        assert_eq!(err.to_string(), "Server error (500): Internal error");

        let err = ServiceError::RetriesExhausted {
            attempts: 3,
            last_error: "timeout".to_string(),
        };
        assert_eq!(err.to_string(), "All 3 retry attempts failed: timeout");
    }
}
