//! Echo guard
//!
//! Remembers the most recent heard input and spoken output so that a
//! transcript of our own voice coming back through the microphone can be
//! recognised and dropped. Both records share one expiry window: recording
//! either value restarts the clock for both.
//!
//! The guard itself never sleeps. Each record bumps a generation number and
//! the owner schedules an expiry for that generation; an expiry carrying an
//! older generation is ignored, so only the latest window can clear the
//! records.

use super::similarity::similarity;
use std::time::Duration;

/// Default quiet window after which the records are forgotten
pub const DEFAULT_ECHO_WINDOW: Duration = Duration::from_secs(10);

/// Default score above which a transcript counts as echo
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.6;

/// Recent heard/spoken text used for echo suppression
#[derive(Debug, Clone)]
pub struct EchoGuard {
    last_heard: Option<String>,
    last_spoken: Option<String>,
    generation: u64,
    threshold: f64,
}

impl EchoGuard {
    /// Creates an empty guard with the given similarity threshold
    pub fn new(threshold: f64) -> Self {
        Self {
            last_heard: None,
            last_spoken: None,
            generation: 0,
            threshold,
        }
    }

    /// Most recently accepted input transcript
    pub fn last_heard(&self) -> Option<&str> {
        self.last_heard.as_deref()
    }

    /// Most recently spoken translation
    pub fn last_spoken(&self) -> Option<&str> {
        self.last_spoken.as_deref()
    }

    /// Current expiry generation
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether `candidate` looks like our own recent input or output
    ///
    /// Only applies while automatic mode is active; manual captures are
    /// always accepted.
    pub fn is_echo(&self, candidate: &str, automatic_active: bool) -> bool {
        if !automatic_active {
            return false;
        }

        let matches = |record: &Option<String>| {
            record
                .as_deref()
                .map(|text| similarity(candidate, text) > self.threshold)
                .unwrap_or(false)
        };

        matches(&self.last_spoken) || matches(&self.last_heard)
    }

    /// Record an accepted input transcript
    ///
    /// Returns the generation the caller must schedule an expiry for.
    pub fn record_heard(&mut self, text: &str) -> u64 {
        self.last_heard = Some(text.to_string());
        self.bump()
    }

    /// Record a translation that is about to be spoken
    ///
    /// Returns the generation the caller must schedule an expiry for.
    pub fn record_spoken(&mut self, text: &str) -> u64 {
        self.last_spoken = Some(text.to_string());
        self.bump()
    }

    /// Clear both records if `generation` is still the latest
    ///
    /// Returns whether anything was cleared.
    pub fn expire(&mut self, generation: u64) -> bool {
        if generation != self.generation {
            tracing::debug!(
                "Ignoring stale echo expiry (generation {} != {})",
                generation,
                self.generation
            );
            return false;
        }

        self.last_heard = None;
        self.last_spoken = None;
        tracing::debug!("Echo records expired");
        true
    }

    fn bump(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }
}

impl Default for EchoGuard {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}
