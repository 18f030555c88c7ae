//! Echo suppression
//!
//! In automatic mode the microphone stays open between turns and will happily
//! pick up the loop's own speech. These pieces decide whether a finished
//! transcript is really new speech.

pub mod guard;
pub mod similarity;

pub use guard::{EchoGuard, DEFAULT_ECHO_WINDOW, DEFAULT_SIMILARITY_THRESHOLD};
pub use similarity::{normalise, similarity};
