//! Turn controller
//!
//! Decides when the microphone is open, when a transcript is translated and
//! spoken, and when automatic mode re-arms. Split into a pure state machine
//! ([`state`]), the projection front-ends render ([`presentation`]) and the
//! async driver that executes effects ([`controller`]).

pub mod controller;
pub mod presentation;
pub mod state;

pub use controller::{Collaborators, TurnController, TurnHandle};
pub use presentation::{Presentation, Status, StatusKind};
pub use state::{
    Effect, SessionState, TimerSlot, TurnEvent, TurnMachine, TurnState, TurnTimings,
};
