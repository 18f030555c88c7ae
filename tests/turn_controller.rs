//! Turn controller integration tests.
//!
//! Drives a real `TurnController` with scripted collaborators on a paused
//! tokio clock, so cooldowns and echo windows elapse deterministically.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tandem_lib::capture::{CaptureError, InterimCallback, SpeechCapture};
use tandem_lib::language::{Direction, Language};
use tandem_lib::speech::{
    AudioClip, AudioPlayback, PlaybackError, SpeechOutput, SyntheticVoice,
};
use tandem_lib::translation::{
    RomanizedFragment, Romanizer, ServiceError, TranslationService, Translator,
};
use tandem_lib::turn::{
    Collaborators, StatusKind, TurnController, TurnHandle, TurnMachine, TurnState,
};

// =============================================================================
// Scripted collaborators
// =============================================================================

/// Capture that replays `(delay, outcome)` pairs, then listens until stopped
#[derive(Default)]
struct ScriptedCapture {
    script: Mutex<VecDeque<(Duration, Result<String, CaptureError>)>>,
    languages: Mutex<Vec<Language>>,
    stop: tokio::sync::Notify,
    stops: AtomicUsize,
}

impl ScriptedCapture {
    fn new(script: Vec<(Duration, Result<String, CaptureError>)>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        }
    }

    fn languages(&self) -> Vec<Language> {
        self.languages.lock().clone()
    }
}

#[async_trait]
impl SpeechCapture for ScriptedCapture {
    async fn listen(
        &self,
        language: Language,
        interim: InterimCallback,
    ) -> Result<String, CaptureError> {
        self.languages.lock().push(language);
        let next = self.script.lock().pop_front();

        match next {
            Some((delay, outcome)) => {
                if let Ok(text) = &outcome {
                    interim(text);
                }
                tokio::select! {
                    _ = tokio::time::sleep(delay) => outcome,
                    _ = self.stop.notified() => Err(CaptureError::Aborted),
                }
            }
            None => {
                self.stop.notified().await;
                Err(CaptureError::Aborted)
            }
        }
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.stop.notify_waiters();
    }
}

/// Translator answering from a phrase table
#[derive(Default)]
struct PhraseTranslator {
    phrases: HashMap<String, String>,
    delay: Duration,
    calls: Mutex<Vec<(String, Language, Language)>>,
}

impl PhraseTranslator {
    fn new(phrases: &[(&str, &str)]) -> Self {
        Self {
            phrases: phrases
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<(String, Language, Language)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Translator for PhraseTranslator {
    async fn translate(
        &self,
        text: &str,
        source: Language,
        target: Language,
    ) -> Result<Vec<String>, ServiceError> {
        self.calls.lock().push((text.to_string(), source, target));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(vec![self
            .phrases
            .get(text)
            .cloned()
            .unwrap_or_else(|| format!("<{}>", text))])
    }
}

struct NoRomanizer;

#[async_trait]
impl Romanizer for NoRomanizer {
    async fn romanize(
        &self,
        _text: &str,
        _language: Language,
    ) -> Result<Vec<RomanizedFragment>, ServiceError> {
        Ok(Vec::new())
    }
}

/// Playback whose loads fail from a given load index onwards
#[derive(Default)]
struct FakePlayback {
    fail_from_load: Option<usize>,
    loads: AtomicUsize,
    played: Mutex<Vec<String>>,
}

#[async_trait]
impl AudioPlayback for FakePlayback {
    async fn load(&self, text: &str, _language: Language) -> Result<AudioClip, PlaybackError> {
        let index = self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_from_load.is_some_and(|n| index >= n) {
            return Err(PlaybackError::Resource("offline".to_string()));
        }
        Ok(AudioClip {
            data: text.as_bytes().to_vec(),
            extension: "mp3".to_string(),
        })
    }

    async fn play(&self, clip: &AudioClip) -> Result<(), PlaybackError> {
        self.played
            .lock()
            .push(String::from_utf8_lossy(&clip.data).into_owned());
        Ok(())
    }
}

#[derive(Default)]
struct FakeVoice {
    spoken: Mutex<Vec<(String, Language)>>,
}

#[async_trait]
impl SyntheticVoice for FakeVoice {
    async fn speak(&self, text: &str, language: Language) -> Result<(), PlaybackError> {
        self.spoken.lock().push((text.to_string(), language));
        Ok(())
    }

    fn cancel(&self) {}
}

struct Harness {
    handle: TurnHandle,
    capture: Arc<ScriptedCapture>,
    translator: Arc<PhraseTranslator>,
    playback: Arc<FakePlayback>,
    voice: Arc<FakeVoice>,
}

fn start(capture: ScriptedCapture, translator: PhraseTranslator, playback: FakePlayback) -> Harness {
    let capture = Arc::new(capture);
    let translator = Arc::new(translator);
    let playback = Arc::new(playback);
    let voice = Arc::new(FakeVoice::default());

    let translation = TranslationService::new(translator.clone(), Arc::new(NoRomanizer));
    let speech = Arc::new(SpeechOutput::new(playback.clone(), voice.clone(), 200));

    let (controller, handle) = TurnController::new(
        TurnMachine::default(),
        Collaborators {
            capture: capture.clone(),
            translation,
            speech,
        },
    );
    controller.spawn();

    Harness {
        handle,
        capture,
        translator,
        playback,
        voice,
    }
}

fn said(text: &str) -> (Duration, Result<String, CaptureError>) {
    (Duration::ZERO, Ok(text.to_string()))
}

async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

// =============================================================================
// Manual turns
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_manual_turn_translates_and_speaks() {
    let h = start(
        ScriptedCapture::new(vec![said("xin chào")]),
        PhraseTranslator::new(&[("xin chào", "你好")]),
        FakePlayback::default(),
    );

    h.handle.manual(Direction::ViToZh);
    advance(100).await;

    assert_eq!(
        h.translator.calls(),
        vec![(
            "xin chào".to_string(),
            Language::Vietnamese,
            Language::Chinese
        )]
    );
    let p = h.handle.presentation();
    assert_eq!(p.state, TurnState::Speaking);
    assert_eq!(p.source_text, "xin chào");
    assert_eq!(
        p.translation.map(|t| t.translated_text),
        Some("你好".to_string())
    );
    assert_eq!(*h.playback.played.lock(), vec!["你好".to_string()]);

    // Post-speech cooldown, then idle without re-arming
    advance(1000).await;
    let p = h.handle.presentation();
    assert_eq!(p.state, TurnState::Idle);
    assert_eq!(h.capture.languages(), vec![Language::Vietnamese]);
}

#[tokio::test(start_paused = true)]
async fn test_manual_silence_is_reported() {
    let h = start(
        ScriptedCapture::new(vec![(Duration::from_secs(8), Err(CaptureError::Silence))]),
        PhraseTranslator::default(),
        FakePlayback::default(),
    );

    h.handle.manual(Direction::ZhToVi);
    advance(9000).await;

    let p = h.handle.presentation();
    assert_eq!(p.state, TurnState::Idle);
    assert_eq!(p.status.message, "No speech detected. Please try again.");
    assert!(h.translator.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_replay_speaks_last_translation_again() {
    let h = start(
        ScriptedCapture::new(vec![said("cảm ơn")]),
        PhraseTranslator::new(&[("cảm ơn", "谢谢")]),
        FakePlayback::default(),
    );

    h.handle.manual(Direction::ViToZh);
    advance(1000).await;
    h.handle.replay();
    advance(1000).await;

    assert_eq!(
        *h.playback.played.lock(),
        vec!["谢谢".to_string(), "谢谢".to_string()]
    );
    assert_eq!(h.translator.calls().len(), 1);
    assert_eq!(h.handle.presentation().state, TurnState::Idle);
}

// =============================================================================
// Automatic mode
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_automatic_mode_skips_echo_and_rearms() {
    let h = start(
        ScriptedCapture::new(vec![said("xin chào"), said("你好")]),
        PhraseTranslator::new(&[("xin chào", "你好")]),
        FakePlayback::default(),
    );

    h.handle.toggle_automatic(Direction::ViToZh);

    // First turn speaks, second capture (after 800 ms) hears our own output
    advance(900).await;
    assert_eq!(h.translator.calls().len(), 1);
    let p = h.handle.presentation();
    assert_eq!(p.state, TurnState::Idle);
    assert_eq!(p.status.message, "Ignoring echo");
    assert_eq!(p.automatic_mode, Some(Direction::ViToZh));

    // Echo cooldown elapses and listening resumes
    advance(1000).await;
    let p = h.handle.presentation();
    assert_eq!(p.state, TurnState::AutoCapturing);
    assert_eq!(p.auto_listening, Some(Direction::ViToZh));
    assert_eq!(h.capture.languages().len(), 3);
    assert_eq!(h.translator.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_echo_records_expire_after_window() {
    let h = start(
        ScriptedCapture::new(vec![
            said("xin chào"),
            (Duration::from_secs(11), Ok("你好".to_string())),
        ]),
        PhraseTranslator::new(&[("xin chào", "你好")]),
        FakePlayback::default(),
    );

    h.handle.toggle_automatic(Direction::ViToZh);
    advance(13_000).await;

    let calls = h.translator.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].0, "你好");
}

#[tokio::test(start_paused = true)]
async fn test_permission_denied_stops_automatic_mode() {
    let h = start(
        ScriptedCapture::new(vec![(Duration::ZERO, Err(CaptureError::PermissionDenied))]),
        PhraseTranslator::default(),
        FakePlayback::default(),
    );

    h.handle.toggle_automatic(Direction::ZhToVi);
    advance(5000).await;

    let p = h.handle.presentation();
    assert_eq!(p.automatic_mode, None);
    assert_eq!(p.state, TurnState::Idle);
    assert_eq!(p.status.kind, StatusKind::Error);
    assert_eq!(p.status.message, "Please allow microphone access.");
    assert_eq!(h.capture.languages(), vec![Language::Chinese]);
}

#[tokio::test(start_paused = true)]
async fn test_recognition_error_retries_after_cooldown() {
    let h = start(
        ScriptedCapture::new(vec![(
            Duration::ZERO,
            Err(CaptureError::Other("network".to_string())),
        )]),
        PhraseTranslator::default(),
        FakePlayback::default(),
    );

    h.handle.toggle_automatic(Direction::ViToZh);
    advance(100).await;
    assert_eq!(h.handle.presentation().status.message, "Speech recognition error");
    assert_eq!(h.capture.languages().len(), 1);

    advance(500).await;
    assert_eq!(h.handle.presentation().state, TurnState::AutoCapturing);
    assert_eq!(h.capture.languages().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_manual_request_leaves_automatic_mode() {
    let h = start(
        ScriptedCapture::new(Vec::new()),
        PhraseTranslator::default(),
        FakePlayback::default(),
    );

    h.handle.toggle_automatic(Direction::ViToZh);
    advance(100).await;
    h.handle.manual(Direction::ZhToVi);
    advance(100).await;

    let p = h.handle.presentation();
    assert_eq!(p.automatic_mode, None);
    assert_eq!(p.state, TurnState::ManualCapturing);
    assert_eq!(p.manual_recording, Some(Direction::ZhToVi));
    assert!(h.capture.stops.load(Ordering::SeqCst) >= 1);
    assert_eq!(
        h.capture.languages(),
        vec![Language::Vietnamese, Language::Chinese]
    );
}

#[tokio::test(start_paused = true)]
async fn test_stop_discards_in_flight_translation() {
    let mut translator = PhraseTranslator::new(&[("xin chào", "你好")]);
    translator.delay = Duration::from_secs(2);
    let h = start(
        ScriptedCapture::new(vec![said("xin chào")]),
        translator,
        FakePlayback::default(),
    );

    h.handle.toggle_automatic(Direction::ViToZh);
    advance(100).await;
    assert_eq!(h.handle.presentation().state, TurnState::Translating);

    h.handle.stop();
    advance(3000).await;

    let p = h.handle.presentation();
    assert_eq!(p.state, TurnState::Idle);
    assert_eq!(p.automatic_mode, None);
    assert!(p.translation.is_none());
    assert!(h.playback.played.lock().is_empty());
}

// =============================================================================
// Speech fallback
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_playback_failure_falls_back_once() {
    let h = start(
        ScriptedCapture::new(vec![said("xin chào")]),
        PhraseTranslator::new(&[("xin chào", "你好")]),
        FakePlayback {
            fail_from_load: Some(0),
            ..Default::default()
        },
    );

    h.handle.manual(Direction::ViToZh);
    advance(1000).await;

    assert_eq!(
        *h.voice.spoken.lock(),
        vec![("你好".to_string(), Language::Chinese)]
    );
    assert!(h.playback.played.lock().is_empty());
    assert_eq!(h.handle.presentation().state, TurnState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_failure_mid_sequence_hands_whole_text_to_fallback() {
    let long = "好".repeat(450);
    let h = start(
        ScriptedCapture::new(vec![said("nói dài")]),
        PhraseTranslator::new(&[("nói dài", long.as_str())]),
        FakePlayback {
            fail_from_load: Some(1),
            ..Default::default()
        },
    );

    h.handle.manual(Direction::ViToZh);
    advance(1000).await;

    assert_eq!(*h.playback.played.lock(), vec!["好".repeat(200)]);
    assert_eq!(*h.voice.spoken.lock(), vec![(long, Language::Chinese)]);
    assert_eq!(h.handle.presentation().state, TurnState::Idle);
}
