//! Presentation projection
//!
//! What a front-end shows is a pure function of the session state plus the
//! last status, transcript and translation. Front-ends subscribe to these
//! snapshots and never read the machine directly.

use super::state::{SessionState, TurnState};
use crate::language::{Direction, Language};
use crate::translation::TranslationResult;
use serde::{Deserialize, Serialize};

/// Styling hint for the status line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    #[default]
    Neutral,
    Listening,
    Translating,
    Speaking,
    Error,
}

/// Status line shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Status {
    pub message: String,
    pub kind: StatusKind,
}

impl Status {
    fn new(message: impl Into<String>, kind: StatusKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    pub fn idle() -> Self {
        Self::default()
    }

    pub fn listening(language: Language) -> Self {
        Self::new(
            format!("Listening for {}...", language.display_name()),
            StatusKind::Listening,
        )
    }

    /// Automatic mode is armed but heard nothing yet
    pub fn waiting(language: Language) -> Self {
        Self::new(
            format!("Waiting for {}...", language.display_name()),
            StatusKind::Listening,
        )
    }

    pub fn ready(language: Language) -> Self {
        Self::new(
            format!("Ready to listen ({})", language.display_name()),
            StatusKind::Neutral,
        )
    }

    pub fn echo_ignored() -> Self {
        Self::new("Ignoring echo", StatusKind::Neutral)
    }

    pub fn translating() -> Self {
        Self::new("Translating...", StatusKind::Translating)
    }

    pub fn speaking() -> Self {
        Self::new("Speaking...", StatusKind::Speaking)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(message, StatusKind::Error)
    }
}

/// Snapshot of everything a front-end displays
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Presentation {
    pub state: TurnState,
    pub status: Status,
    /// Automatic direction, shown as the active automatic button
    pub automatic_mode: Option<Direction>,
    /// Direction whose automatic listening indicator is lit
    pub auto_listening: Option<Direction>,
    /// Direction whose manual recording indicator is lit
    pub manual_recording: Option<Direction>,
    /// Interim or final transcript of the current turn
    pub source_text: String,
    pub translation: Option<TranslationResult>,
}

impl Presentation {
    /// Project the session state onto what the user sees
    pub fn project(
        session: &SessionState,
        status: &Status,
        source_text: &str,
        translation: Option<&TranslationResult>,
    ) -> Self {
        let state = session.turn_state();

        let auto_listening = match state {
            TurnState::AutoCapturing => session.automatic_mode,
            _ => None,
        };
        let manual_recording = match state {
            TurnState::ManualCapturing => session.active_direction,
            _ => None,
        };

        Self {
            state,
            status: status.clone(),
            automatic_mode: session.automatic_mode,
            auto_listening,
            manual_recording,
            source_text: source_text.to_string(),
            translation: translation.cloned(),
        }
    }
}
