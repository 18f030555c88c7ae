//! Turn controller driver
//!
//! Runs the [`TurnMachine`] on a single task. User commands and
//! collaborator callbacks arrive on one channel and are processed strictly
//! one at a time, so the machine never sees interleaved transitions. Effects
//! are executed by spawning collaborator calls that report back on the same
//! channel. Presentation snapshots are published on a watch channel after
//! every event.

use super::presentation::Presentation;
use super::state::{Effect, TimerSlot, TurnEvent, TurnMachine, TurnState};
use crate::capture::{InterimCallback, SpeechCapture};
use crate::language::Direction;
use crate::speech::SpeechOutput;
use crate::translation::TranslationService;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Messages accepted by the driver loop
#[derive(Debug)]
enum Message {
    Event(TurnEvent),
    Shutdown,
}

/// Services the controller drives
#[derive(Clone)]
pub struct Collaborators {
    pub capture: Arc<dyn SpeechCapture>,
    pub translation: TranslationService,
    pub speech: Arc<SpeechOutput>,
}

/// Cloneable handle for sending commands to a running controller
#[derive(Clone)]
pub struct TurnHandle {
    tx: mpsc::UnboundedSender<Message>,
    presentation: watch::Receiver<Presentation>,
}

impl TurnHandle {
    /// Request a single manual capture
    pub fn manual(&self, direction: Direction) {
        self.send(TurnEvent::ManualRequested(direction));
    }

    /// Press the automatic button for `direction`
    pub fn toggle_automatic(&self, direction: Direction) {
        self.send(TurnEvent::AutomaticToggled(direction));
    }

    /// Stop automatic mode and everything in flight
    pub fn stop(&self) {
        self.send(TurnEvent::StopRequested);
    }

    /// Speak the last translation again
    pub fn replay(&self) {
        self.send(TurnEvent::ReplayRequested);
    }

    /// Stop the driver loop
    pub fn shutdown(&self) {
        if self.tx.send(Message::Shutdown).is_err() {
            tracing::debug!("Turn controller already stopped");
        }
    }

    /// Latest presentation snapshot
    pub fn presentation(&self) -> Presentation {
        self.presentation.borrow().clone()
    }

    /// Subscribe to presentation updates
    pub fn subscribe(&self) -> watch::Receiver<Presentation> {
        self.presentation.clone()
    }

    fn send(&self, event: TurnEvent) {
        if self.tx.send(Message::Event(event)).is_err() {
            tracing::warn!("Turn controller is not running, command dropped");
        }
    }
}

/// Async driver owning the machine and its in-flight tasks
pub struct TurnController {
    machine: TurnMachine,
    collaborators: Collaborators,
    tx: mpsc::UnboundedSender<Message>,
    rx: mpsc::UnboundedReceiver<Message>,
    presentation: watch::Sender<Presentation>,
    timers: HashMap<TimerSlot, JoinHandle<()>>,
    capture_task: Option<JoinHandle<()>>,
    translate_task: Option<JoinHandle<()>>,
    speech_task: Option<JoinHandle<()>>,
}

impl TurnController {
    /// Creates a controller and the handle used to drive it
    pub fn new(machine: TurnMachine, collaborators: Collaborators) -> (Self, TurnHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (presentation, presentation_rx) = watch::channel(machine.presentation());

        let handle = TurnHandle {
            tx: tx.clone(),
            presentation: presentation_rx,
        };

        let controller = Self {
            machine,
            collaborators,
            tx,
            rx,
            presentation,
            timers: HashMap::new(),
            capture_task: None,
            translate_task: None,
            speech_task: None,
        };

        (controller, handle)
    }

    /// Start the driver loop on the current runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Process messages until shutdown
    pub async fn run(mut self) {
        tracing::info!("Turn controller started");

        while let Some(message) = self.rx.recv().await {
            match message {
                Message::Event(event) => self.dispatch(event),
                Message::Shutdown => break,
            }
        }

        self.abort_all();
        tracing::info!("Turn controller stopped");
    }

    fn dispatch(&mut self, event: TurnEvent) {
        let previous = self.machine.state();
        let effects = self.machine.handle(event);

        for effect in effects {
            self.execute(effect);
        }

        let current = self.machine.state();
        if previous != current {
            tracing::info!(
                "Turn state transition: {:?} -> {:?}",
                previous,
                current
            );
        }

        self.presentation.send_replace(self.machine.presentation());
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::StartCapture { session, language } => {
                abort(&mut self.capture_task);

                let capture = self.collaborators.capture.clone();
                let tx = self.tx.clone();
                let interim_tx = self.tx.clone();
                let interim: InterimCallback = Arc::new(move |text: &str| {
                    let _ = interim_tx.send(Message::Event(TurnEvent::Interim {
                        session,
                        text: text.to_string(),
                    }));
                });

                tracing::debug!("Starting capture session {} ({})", session, language);
                self.capture_task = Some(tokio::spawn(async move {
                    let outcome = capture.listen(language, interim).await;
                    let _ = tx.send(Message::Event(TurnEvent::CaptureEnded { session, outcome }));
                }));
            }
            Effect::StopCapture => {
                self.collaborators.capture.stop();
                abort(&mut self.capture_task);
            }
            Effect::Translate {
                session,
                text,
                source,
                target,
            } => {
                abort(&mut self.translate_task);

                let translation = self.collaborators.translation.clone();
                let tx = self.tx.clone();
                self.translate_task = Some(tokio::spawn(async move {
                    let result = translation.translate(&text, source, target).await;
                    let _ = tx.send(Message::Event(TurnEvent::TranslationFinished {
                        session,
                        result,
                    }));
                }));
            }
            Effect::CancelTranslation => abort(&mut self.translate_task),
            Effect::Preload { text, language } => {
                // Fire and forget; speak picks the clip up if it matches
                let _ = self.collaborators.speech.preload(&text, language);
            }
            Effect::Speak {
                session,
                text,
                language,
            } => {
                abort(&mut self.speech_task);

                let speech = self.collaborators.speech.clone();
                let tx = self.tx.clone();
                self.speech_task = Some(tokio::spawn(async move {
                    let outcome = speech.speak(&text, language).await;
                    let _ = tx.send(Message::Event(TurnEvent::SpeechFinished { session, outcome }));
                }));
            }
            Effect::CancelSpeech => {
                self.collaborators.speech.cancel();
                abort(&mut self.speech_task);
            }
            Effect::Schedule { slot, delay, event } => {
                let tx = self.tx.clone();
                let timer = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(Message::Event(event));
                });
                if let Some(previous) = self.timers.insert(slot, timer) {
                    previous.abort();
                }
            }
            Effect::CancelTimer(slot) => {
                if let Some(timer) = self.timers.remove(&slot) {
                    timer.abort();
                }
            }
        }
    }

    fn abort_all(&mut self) {
        if self.machine.state() != TurnState::Idle {
            self.collaborators.capture.stop();
            self.collaborators.speech.cancel();
        }
        abort(&mut self.capture_task);
        abort(&mut self.translate_task);
        abort(&mut self.speech_task);
        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
    }
}

fn abort(task: &mut Option<JoinHandle<()>>) {
    if let Some(task) = task.take() {
        task.abort();
    }
}
