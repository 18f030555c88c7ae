//! Tandem - Two-way voice interpreter
//!
//! Listens in one language, translates, speaks the result in the other and,
//! in automatic mode, listens again without picking up its own voice.

use std::sync::Arc;

pub mod capture;
pub mod config;
pub mod echo;
pub mod language;
pub mod speech;
pub mod translation;
pub mod turn;

use capture::SpeechCapture;
use speech::{GoogleTtsPlayback, SpeechOutput, SystemVoice};
use translation::{GoogleTranslateClient, TranslationService};
use turn::{Collaborators, TurnController, TurnHandle, TurnMachine};

/// Set up logging to `~/.tandem/logs/tandem-debug.log` and stderr
///
/// Falls back to stderr only when the log file cannot be opened. The filter
/// defaults to `info` and can be overridden with `RUST_LOG`.
pub fn init_logging() {
    use tracing_subscriber::prelude::*;

    /// Format timestamps using the system's local time via chrono
    struct LocalTimer;
    impl tracing_subscriber::fmt::time::FormatTime for LocalTimer {
        fn format_time(
            &self,
            w: &mut tracing_subscriber::fmt::format::Writer<'_>,
        ) -> std::fmt::Result {
            write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
        }
    }

    let log_dir = config::get_config_dir().join("logs");
    let _ = std::fs::create_dir_all(&log_dir);
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("tandem-debug.log"))
        .ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if let Some(file) = log_file {
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::sync::Mutex::new(file))
            .with_timer(LocalTimer)
            .with_ansi(false);
        let stderr_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_timer(LocalTimer);
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_timer(LocalTimer)
            .init();
    }
}

/// Wire the networked collaborators described by `config` around `capture`
pub fn build_controller(
    config: &config::Config,
    capture: Arc<dyn SpeechCapture>,
) -> (TurnController, TurnHandle) {
    let client = Arc::new(GoogleTranslateClient::with_config(
        &config.translation.base_url,
        config.translation.timeout_secs,
    ));
    let translation = TranslationService::new(client.clone(), client);

    let playback = Arc::new(GoogleTtsPlayback::new(
        &config.speech.tts_base_url,
        config.speech.player(),
    ));
    let fallback = Arc::new(SystemVoice::new(
        config.speech.fallback_command.clone(),
        config.speech.fallback_rate,
    ));
    let speech = Arc::new(SpeechOutput::new(
        playback,
        fallback,
        config.speech.max_chunk_chars,
    ));

    let machine = TurnMachine::new(config.turn_timings(), config.echo.similarity_threshold)
        .with_source_detection(config.turn.detect_source_language);

    tracing::info!(
        "Translation endpoint {}, speech endpoint {}",
        config.translation.base_url,
        config.speech.tts_base_url
    );

    TurnController::new(
        machine,
        Collaborators {
            capture,
            translation,
            speech,
        },
    )
}
