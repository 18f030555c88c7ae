//! Turn-taking state machine
//!
//! Coordinates capture, translation and speech for one loop. The machine is
//! pure: it consumes [`TurnEvent`]s and returns the [`Effect`]s the driver
//! must carry out (start a capture, call the translator, schedule a timer).
//! Nothing here sleeps or performs I/O, which keeps every transition
//! testable with literal events.
//!
//! Every capture, translation and speech session carries a monotonically
//! increasing id, and every mode change bumps a mode epoch. Callbacks and
//! timers carrying an old id or epoch are discarded, so a late result from
//! an abandoned session can never drive the loop.

use super::presentation::{Presentation, Status};
use crate::capture::CaptureError;
use crate::echo::{EchoGuard, DEFAULT_ECHO_WINDOW, DEFAULT_SIMILARITY_THRESHOLD};
use crate::language::{self, Direction, Language};
use crate::speech::SpeechOutcome;
use crate::translation::{TranslationError, TranslationResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Observable phase of the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    /// Nothing in flight
    #[default]
    Idle,
    /// Single-shot capture requested by the user
    ManualCapturing,
    /// Capture armed by automatic mode
    AutoCapturing,
    /// Waiting for the translation service
    Translating,
    /// Speaking the translation (including the post-speech cooldown)
    Speaking,
}

impl TurnState {
    /// Returns a human-readable description of the state
    pub fn description(&self) -> &'static str {
        match self {
            TurnState::Idle => "Idle",
            TurnState::ManualCapturing => "Listening (manual)",
            TurnState::AutoCapturing => "Listening (automatic)",
            TurnState::Translating => "Translating",
            TurnState::Speaking => "Speaking",
        }
    }

    /// Returns whether the microphone is open in this state
    pub fn is_capturing(&self) -> bool {
        matches!(self, TurnState::ManualCapturing | TurnState::AutoCapturing)
    }
}

/// Session state owned by the machine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Direction used for replay and automatic continuation
    pub active_direction: Option<Direction>,
    /// Automatic mode direction, `None` when off
    pub automatic_mode: Option<Direction>,
    pub is_capturing: bool,
    pub is_translating: bool,
    pub is_speaking: bool,
}

impl SessionState {
    /// Derive the observable phase from the flags
    pub fn turn_state(&self) -> TurnState {
        if self.is_capturing {
            if self.automatic_mode.is_some() {
                TurnState::AutoCapturing
            } else {
                TurnState::ManualCapturing
            }
        } else if self.is_translating {
            TurnState::Translating
        } else if self.is_speaking {
            TurnState::Speaking
        } else {
            TurnState::Idle
        }
    }

    /// Whether any of capture, translation or speech is in flight
    pub fn is_busy(&self) -> bool {
        self.is_capturing || self.is_translating || self.is_speaking
    }

    /// At most one of the three activity flags may be set
    pub fn flags_consistent(&self) -> bool {
        [self.is_capturing, self.is_translating, self.is_speaking]
            .iter()
            .filter(|f| **f)
            .count()
            <= 1
    }
}

/// Delays used by the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnTimings {
    /// Wait before listening again after dropping an echo
    pub echo_cooldown: Duration,
    /// Wait before listening again after a failed turn
    pub error_cooldown: Duration,
    /// Wait after speech ends before the microphone reopens
    pub post_speech_cooldown: Duration,
    /// How long heard/spoken text stays eligible for echo matching
    pub echo_window: Duration,
}

impl Default for TurnTimings {
    fn default() -> Self {
        Self {
            echo_cooldown: Duration::from_millis(1000),
            error_cooldown: Duration::from_millis(500),
            post_speech_cooldown: Duration::from_millis(800),
            echo_window: DEFAULT_ECHO_WINDOW,
        }
    }
}

/// Named timer slots; scheduling into a slot replaces its previous timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerSlot {
    /// Cooldown before automatic capture is re-armed
    Rearm,
    /// Cooldown between the end of speech and the next turn
    PostSpeech,
    /// Expiry of the echo records
    EchoExpiry,
}

/// Inputs to the machine
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// User asked for a single capture in `Direction`
    ManualRequested(Direction),
    /// User pressed the automatic button for `Direction`
    AutomaticToggled(Direction),
    /// User asked to stop everything
    StopRequested,
    /// User asked to hear the last translation again
    ReplayRequested,
    /// Interim transcript from a capture session
    Interim { session: u64, text: String },
    /// Terminal outcome of a capture session
    CaptureEnded {
        session: u64,
        outcome: Result<String, CaptureError>,
    },
    /// Translation service answered
    TranslationFinished {
        session: u64,
        result: Result<TranslationResult, TranslationError>,
    },
    /// Speech output finished (on any path)
    SpeechFinished { session: u64, outcome: SpeechOutcome },
    /// Re-arm cooldown elapsed
    RearmElapsed { epoch: u64 },
    /// Post-speech cooldown elapsed
    PostSpeechElapsed { session: u64 },
    /// Echo window elapsed
    EchoExpired { generation: u64 },
}

/// Work the driver must perform
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    StartCapture { session: u64, language: Language },
    StopCapture,
    Translate {
        session: u64,
        text: String,
        source: Language,
        target: Language,
    },
    CancelTranslation,
    Preload { text: String, language: Language },
    Speak {
        session: u64,
        text: String,
        language: Language,
    },
    CancelSpeech,
    Schedule {
        slot: TimerSlot,
        delay: Duration,
        event: TurnEvent,
    },
    CancelTimer(TimerSlot),
}

/// The turn controller state machine
#[derive(Debug, Clone)]
pub struct TurnMachine {
    session: SessionState,
    echo: EchoGuard,
    timings: TurnTimings,
    detect_source_language: bool,
    capture_session: u64,
    translate_session: u64,
    speech_session: u64,
    mode_epoch: u64,
    /// Direction of the turn being translated (may differ from the active
    /// direction when source detection reversed it)
    turn_direction: Option<Direction>,
    status: Status,
    source_text: String,
    translation: Option<TranslationResult>,
    output_language: Option<Language>,
}

impl TurnMachine {
    /// Creates a machine in the Idle state
    pub fn new(timings: TurnTimings, similarity_threshold: f64) -> Self {
        Self {
            session: SessionState::default(),
            echo: EchoGuard::new(similarity_threshold),
            timings,
            detect_source_language: false,
            capture_session: 0,
            translate_session: 0,
            speech_session: 0,
            mode_epoch: 0,
            turn_direction: None,
            status: Status::idle(),
            source_text: String::new(),
            translation: None,
            output_language: None,
        }
    }

    /// Enable reversing a turn when the transcript is in the target language
    pub fn with_source_detection(mut self, enabled: bool) -> Self {
        self.detect_source_language = enabled;
        self
    }

    /// Returns the session flags
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Returns the current phase
    pub fn state(&self) -> TurnState {
        self.session.turn_state()
    }

    /// Returns the current status message
    pub fn status(&self) -> &Status {
        &self.status
    }

    /// Returns the echo guard
    pub fn echo(&self) -> &EchoGuard {
        &self.echo
    }

    /// Id of the most recent capture session
    pub fn capture_session(&self) -> u64 {
        self.capture_session
    }

    /// Id of the most recent translation request
    pub fn translate_session(&self) -> u64 {
        self.translate_session
    }

    /// Id of the most recent speech session
    pub fn speech_session(&self) -> u64 {
        self.speech_session
    }

    /// Current mode epoch
    pub fn mode_epoch(&self) -> u64 {
        self.mode_epoch
    }

    /// Last translation produced, if any
    pub fn translation(&self) -> Option<&TranslationResult> {
        self.translation.as_ref()
    }

    /// Snapshot for the presentation layer
    pub fn presentation(&self) -> Presentation {
        Presentation::project(
            &self.session,
            &self.status,
            &self.source_text,
            self.translation.as_ref(),
        )
    }

    /// Process an event and return the effects to execute
    pub fn handle(&mut self, event: TurnEvent) -> Vec<Effect> {
        let mut effects = Vec::new();

        match event {
            TurnEvent::ManualRequested(direction) => self.request_manual(direction, &mut effects),
            TurnEvent::AutomaticToggled(direction) => {
                self.toggle_automatic(direction, &mut effects)
            }
            TurnEvent::StopRequested => {
                tracing::info!("Stop requested");
                self.stop_all(&mut effects);
            }
            TurnEvent::ReplayRequested => self.replay(&mut effects),
            TurnEvent::Interim { session, text } => {
                if session == self.capture_session && self.session.is_capturing {
                    self.source_text = text;
                }
            }
            TurnEvent::CaptureEnded { session, outcome } => {
                self.on_capture_ended(session, outcome, &mut effects)
            }
            TurnEvent::TranslationFinished { session, result } => {
                self.on_translation_finished(session, result, &mut effects)
            }
            TurnEvent::SpeechFinished { session, outcome } => {
                self.on_speech_finished(session, outcome, &mut effects)
            }
            TurnEvent::RearmElapsed { epoch } => {
                if epoch == self.mode_epoch {
                    self.try_rearm(&mut effects);
                } else {
                    tracing::debug!("Discarding stale re-arm (epoch {})", epoch);
                }
            }
            TurnEvent::PostSpeechElapsed { session } => {
                self.on_post_speech(session, &mut effects)
            }
            TurnEvent::EchoExpired { generation } => {
                self.echo.expire(generation);
            }
        }

        debug_assert!(
            self.session.flags_consistent(),
            "more than one activity flag set: {:?}",
            self.session
        );

        effects
    }

    fn request_manual(&mut self, direction: Direction, effects: &mut Vec<Effect>) {
        if self.session.automatic_mode.is_some() {
            tracing::info!("Manual capture requested, leaving automatic mode");
            self.stop_all(effects);
        } else if self.session.is_busy() {
            tracing::debug!(
                "Manual capture ignored while {}",
                self.state().description()
            );
            return;
        }

        self.session.active_direction = Some(direction);
        self.begin_capture(direction, effects);
    }

    fn toggle_automatic(&mut self, direction: Direction, effects: &mut Vec<Effect>) {
        if self.session.automatic_mode == Some(direction) {
            tracing::info!("Automatic mode {} off", direction);
            self.stop_all(effects);
            return;
        }

        self.stop_all(effects);
        self.session.automatic_mode = Some(direction);
        self.session.active_direction = Some(direction);
        self.status = Status::ready(direction.source());
        tracing::info!("Automatic mode {} on", direction);

        self.try_rearm(effects);
    }

    /// Leave automatic mode and abandon everything in flight
    ///
    /// Does not wait for the collaborators to acknowledge: the sessions are
    /// invalidated immediately and any late callback is discarded as stale.
    fn stop_all(&mut self, effects: &mut Vec<Effect>) {
        if self.session.is_capturing {
            effects.push(Effect::StopCapture);
        }
        if self.session.is_translating {
            effects.push(Effect::CancelTranslation);
        }
        effects.push(Effect::CancelSpeech);
        effects.push(Effect::CancelTimer(TimerSlot::Rearm));
        effects.push(Effect::CancelTimer(TimerSlot::PostSpeech));

        self.session.automatic_mode = None;
        self.session.is_capturing = false;
        self.session.is_translating = false;
        self.session.is_speaking = false;
        self.mode_epoch += 1;
        self.capture_session += 1;
        self.translate_session += 1;
        self.speech_session += 1;
        self.status = Status::idle();
    }

    /// Re-enter capture for the automatic direction, unless anything is in flight
    fn try_rearm(&mut self, effects: &mut Vec<Effect>) {
        let Some(direction) = self.session.automatic_mode else {
            return;
        };

        if self.session.is_busy() {
            tracing::debug!(
                "Re-arm suppressed: capturing={}, translating={}, speaking={}",
                self.session.is_capturing,
                self.session.is_translating,
                self.session.is_speaking
            );
            return;
        }

        self.session.active_direction = Some(direction);
        self.begin_capture(direction, effects);
    }

    fn begin_capture(&mut self, direction: Direction, effects: &mut Vec<Effect>) {
        self.capture_session += 1;
        self.session.is_capturing = true;
        self.status = Status::listening(direction.source());
        effects.push(Effect::StartCapture {
            session: self.capture_session,
            language: direction.source(),
        });
    }

    fn schedule_rearm(&self, delay: Duration, effects: &mut Vec<Effect>) {
        effects.push(Effect::Schedule {
            slot: TimerSlot::Rearm,
            delay,
            event: TurnEvent::RearmElapsed {
                epoch: self.mode_epoch,
            },
        });
    }

    fn schedule_echo_expiry(&self, generation: u64, effects: &mut Vec<Effect>) {
        effects.push(Effect::Schedule {
            slot: TimerSlot::EchoExpiry,
            delay: self.timings.echo_window,
            event: TurnEvent::EchoExpired { generation },
        });
    }

    fn on_capture_ended(
        &mut self,
        session: u64,
        outcome: Result<String, CaptureError>,
        effects: &mut Vec<Effect>,
    ) {
        if session != self.capture_session || !self.session.is_capturing {
            tracing::debug!("Discarding stale capture result (session {})", session);
            return;
        }

        self.session.is_capturing = false;

        match outcome {
            Ok(transcript) if !transcript.trim().is_empty() => {
                self.on_transcript(transcript, effects)
            }
            Ok(_) => self.on_capture_error(CaptureError::Silence, effects),
            Err(e) => self.on_capture_error(e, effects),
        }
    }

    fn on_transcript(&mut self, transcript: String, effects: &mut Vec<Effect>) {
        self.source_text = transcript.clone();

        let automatic = self.session.automatic_mode.is_some();
        if self.echo.is_echo(&transcript, automatic) {
            tracing::info!("Ignoring echo: {:?}", transcript);
            self.status = Status::echo_ignored();
            self.schedule_rearm(self.timings.echo_cooldown, effects);
            return;
        }

        let Some(mut direction) = self.session.active_direction else {
            tracing::warn!("Transcript received without an active direction");
            self.status = Status::idle();
            return;
        };

        if self.detect_source_language {
            let detected = language::detect(&transcript, direction.source());
            if detected == Some(direction.target()) {
                tracing::info!(
                    "Transcript looks like {}, translating this turn as {}",
                    direction.target(),
                    direction.reversed()
                );
                direction = direction.reversed();
            }
        }

        let generation = self.echo.record_heard(&transcript);
        self.schedule_echo_expiry(generation, effects);

        self.translate_session += 1;
        self.session.is_translating = true;
        self.turn_direction = Some(direction);
        self.status = Status::translating();

        effects.push(Effect::Translate {
            session: self.translate_session,
            text: transcript,
            source: direction.source(),
            target: direction.target(),
        });
    }

    fn on_capture_error(&mut self, error: CaptureError, effects: &mut Vec<Effect>) {
        let automatic = self.session.automatic_mode;

        match error {
            CaptureError::Silence => match automatic {
                Some(direction) => {
                    self.try_rearm(effects);
                    // Quiet retry: keep the waiting message over the listening one
                    self.status = Status::waiting(direction.source());
                }
                None => {
                    self.status = Status::error("No speech detected. Please try again.");
                }
            },
            CaptureError::PermissionDenied => {
                tracing::warn!("Microphone permission denied");
                if automatic.is_some() {
                    self.stop_all(effects);
                }
                self.status = Status::error("Please allow microphone access.");
            }
            CaptureError::Aborted => {
                tracing::debug!("Capture aborted");
                if automatic.is_some() {
                    self.schedule_rearm(self.timings.error_cooldown, effects);
                }
            }
            CaptureError::Other(message) => {
                tracing::warn!("Speech recognition error: {}", message);
                self.status = Status::error("Speech recognition error");
                if automatic.is_some() {
                    self.schedule_rearm(self.timings.error_cooldown, effects);
                }
            }
        }
    }

    fn on_translation_finished(
        &mut self,
        session: u64,
        result: Result<TranslationResult, TranslationError>,
        effects: &mut Vec<Effect>,
    ) {
        if session != self.translate_session || !self.session.is_translating {
            tracing::debug!("Discarding stale translation (session {})", session);
            return;
        }

        self.session.is_translating = false;

        match result {
            Ok(result) => {
                let Some(language) = self.turn_direction.map(|d| d.target()) else {
                    tracing::warn!("Translation finished without a turn direction");
                    self.status = Status::idle();
                    return;
                };

                let generation = self.echo.record_spoken(&result.translated_text);
                self.schedule_echo_expiry(generation, effects);

                let text = result.translated_text.clone();
                self.translation = Some(result);
                self.output_language = Some(language);
                self.begin_speaking(text, language, true, effects);
            }
            Err(e) => {
                self.status = Status::error(format!("Error: {}", e));
                if self.session.automatic_mode.is_some() {
                    self.schedule_rearm(self.timings.error_cooldown, effects);
                }
            }
        }
    }

    fn begin_speaking(
        &mut self,
        text: String,
        language: Language,
        preload: bool,
        effects: &mut Vec<Effect>,
    ) {
        self.speech_session += 1;
        self.session.is_speaking = true;
        self.status = Status::speaking();

        if preload {
            effects.push(Effect::Preload {
                text: text.clone(),
                language,
            });
        }
        effects.push(Effect::Speak {
            session: self.speech_session,
            text,
            language,
        });
    }

    fn on_speech_finished(
        &mut self,
        session: u64,
        outcome: SpeechOutcome,
        effects: &mut Vec<Effect>,
    ) {
        if session != self.speech_session || !self.session.is_speaking {
            tracing::debug!("Discarding stale speech completion (session {})", session);
            return;
        }

        tracing::debug!("Speech finished: {:?}", outcome);

        // Stay in Speaking until the tail of our own voice has died away
        effects.push(Effect::Schedule {
            slot: TimerSlot::PostSpeech,
            delay: self.timings.post_speech_cooldown,
            event: TurnEvent::PostSpeechElapsed { session },
        });
    }

    fn on_post_speech(&mut self, session: u64, effects: &mut Vec<Effect>) {
        if session != self.speech_session || !self.session.is_speaking {
            tracing::debug!("Discarding stale post-speech cooldown (session {})", session);
            return;
        }

        self.session.is_speaking = false;

        match self.session.automatic_mode {
            Some(direction) => {
                self.status = Status::ready(direction.source());
                self.try_rearm(effects);
            }
            None => self.status = Status::idle(),
        }
    }

    fn replay(&mut self, effects: &mut Vec<Effect>) {
        let (Some(translation), Some(language)) = (&self.translation, self.output_language)
        else {
            tracing::debug!("Nothing to replay");
            return;
        };

        if translation.translated_text.is_empty() || self.session.is_busy() {
            tracing::debug!("Replay ignored while {}", self.state().description());
            return;
        }

        let text = translation.translated_text.clone();
        self.begin_speaking(text, language, false, effects);
    }
}

impl Default for TurnMachine {
    fn default() -> Self {
        Self::new(TurnTimings::default(), DEFAULT_SIMILARITY_THRESHOLD)
    }
}
