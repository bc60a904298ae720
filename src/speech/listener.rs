//! Speech-to-text listener
//!
//! Wraps a `Transcriber` for one capture at a time. Recognized segments are
//! accumulated into a `LiveCapture` and forwarded to the state loop as
//! snapshots.
//!
//! # Restart policy
//!
//! Continuous recognizers end their session on their own after a stretch of
//! silence. While a capture is active, an `Ended` event that was not caused
//! by `stop()` restarts the engine. Restarts and `stop()` both run under
//! the capture slot lock, and a restart only happens while its capture is
//! still the active one, so the pump never reopens the recognizer after an
//! intentional stop or once a newer capture owns it.

use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{ListenerFault, RecognitionEvent, SpeechError, Transcriber};
use crate::state_machine::Event;

/// Running transcript for the current question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveCapture {
    /// Committed text from final segments
    pub final_text: String,
    /// Latest not-yet-final segment
    pub interim_text: String,
}

impl LiveCapture {
    /// Apply a recognized segment.
    ///
    /// Final segments are appended to the committed text and clear the
    /// interim tail; interim segments replace the tail.
    pub fn push(&mut self, text: &str, is_final: bool) {
        let text = text.trim();
        if is_final {
            if !text.is_empty() {
                if !self.final_text.is_empty() {
                    self.final_text.push(' ');
                }
                self.final_text.push_str(text);
            }
            self.interim_text.clear();
        } else {
            self.interim_text = text.to_string();
        }
    }

    /// Best available answer text: committed text plus any interim tail.
    pub fn answer(&self) -> String {
        match (self.final_text.is_empty(), self.interim_text.is_empty()) {
            (true, true) => String::new(),
            (false, true) => self.final_text.clone(),
            (true, false) => self.interim_text.clone(),
            (false, false) => format!("{} {}", self.final_text, self.interim_text),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.final_text.is_empty() && self.interim_text.is_empty()
    }
}

struct ActiveCapture {
    id: Uuid,
    token: CancellationToken,
}

type CaptureSlot = Arc<Mutex<Option<ActiveCapture>>>;

/// Outcome of a pump's restart attempt.
#[derive(Debug)]
enum Restart {
    Restarted,
    /// The capture was stopped or replaced.
    Inactive,
    Failed(SpeechError),
}

/// Restart the engine for capture `id` if it is still active. Runs under the
/// slot lock so it cannot interleave with `Listener::stop`.
fn restart_if_active(
    slot: &Mutex<Option<ActiveCapture>>,
    id: Uuid,
    transcriber: &dyn Transcriber,
    language: &str,
    events: &mpsc::UnboundedSender<RecognitionEvent>,
) -> Restart {
    let active = slot.lock().unwrap_or_else(|e| e.into_inner());
    match active.as_ref() {
        Some(capture) if capture.id == id && !capture.token.is_cancelled() => {
            match transcriber.start(language, events.clone()) {
                Ok(()) => Restart::Restarted,
                Err(e) => Restart::Failed(e),
            }
        }
        _ => Restart::Inactive,
    }
}

/// Single-capture wrapper around a platform `Transcriber`.
pub struct Listener {
    transcriber: Arc<dyn Transcriber>,
    language: String,
    max_restarts: u32,
    active: CaptureSlot,
}

impl Listener {
    pub fn new(transcriber: Arc<dyn Transcriber>, language: &str, max_restarts: u32) -> Self {
        Self {
            transcriber,
            language: language.to_string(),
            max_restarts,
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Start capture `id`. Any stale capture is stopped first and the
    /// buffer starts empty.
    pub fn start(&self, id: Uuid, tx: mpsc::Sender<Event>) -> Result<(), SpeechError> {
        self.stop();

        let token = CancellationToken::new();
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();
        {
            let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            self.transcriber.start(&self.language, engine_tx.clone())?;
            *active = Some(ActiveCapture {
                id,
                token: token.clone(),
            });
        }
        log::debug!("Listener: capture {} started ({})", id, self.language);

        let pump = Pump {
            id,
            token,
            slot: self.active.clone(),
            transcriber: self.transcriber.clone(),
            language: self.language.clone(),
            max_restarts: self.max_restarts,
            engine_tx,
        };
        tokio::spawn(pump.run(engine_rx, tx));
        Ok(())
    }

    /// Intentionally stop the active capture. Returns false if nothing was
    /// listening.
    pub fn stop(&self) -> bool {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        match active.take() {
            Some(capture) => {
                capture.token.cancel();
                self.transcriber.stop();
                log::debug!("Listener: capture {} stopped", capture.id);
                true
            }
            None => false,
        }
    }

    pub fn active_capture(&self) -> Option<Uuid> {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|c| c.id)
    }
}

struct Pump {
    id: Uuid,
    token: CancellationToken,
    slot: CaptureSlot,
    transcriber: Arc<dyn Transcriber>,
    language: String,
    max_restarts: u32,
    engine_tx: mpsc::UnboundedSender<RecognitionEvent>,
}

impl Pump {
    async fn run(
        self,
        mut engine_rx: mpsc::UnboundedReceiver<RecognitionEvent>,
        tx: mpsc::Sender<Event>,
    ) {
        let mut capture = LiveCapture::default();
        let mut idle_restarts: u32 = 0;

        loop {
            let event = tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                event = engine_rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            match event {
                RecognitionEvent::Segment { text, is_final } => {
                    idle_restarts = 0;
                    capture.push(&text, is_final);
                    let update = Event::TranscriptUpdate {
                        id: self.id,
                        capture: capture.clone(),
                    };
                    if tx.send(update).await.is_err() {
                        break;
                    }
                }
                RecognitionEvent::Error(fault) => {
                    log::warn!("Listener: capture {}: {}", self.id, fault);
                    if tx
                        .send(Event::CaptureFault { id: self.id, fault })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                RecognitionEvent::Ended => {
                    if self.token.is_cancelled() {
                        break;
                    }
                    if idle_restarts >= self.max_restarts {
                        log::warn!(
                            "Listener: capture {} ended {} times without speech, giving up",
                            self.id,
                            idle_restarts
                        );
                        let fault = ListenerFault::NoSpeech;
                        let _ = tx.send(Event::CaptureFault { id: self.id, fault }).await;
                        break;
                    }

                    idle_restarts += 1;
                    let restart = restart_if_active(
                        &self.slot,
                        self.id,
                        self.transcriber.as_ref(),
                        &self.language,
                        &self.engine_tx,
                    );
                    match restart {
                        Restart::Restarted => log::debug!(
                            "Listener: capture {} ended unexpectedly, restarted (attempt {})",
                            self.id,
                            idle_restarts
                        ),
                        Restart::Inactive => break,
                        Restart::Failed(SpeechError::Unsupported(reason)) => {
                            log::error!("Listener: recognition unsupported: {}", reason);
                            let _ = tx.send(Event::SpeechUnsupported { reason }).await;
                            break;
                        }
                        Restart::Failed(e) => {
                            log::warn!("Listener: restart failed: {}", e);
                            let fault = ListenerFault::Engine(e.to_string());
                            let _ = tx.send(Event::CaptureFault { id: self.id, fault }).await;
                            break;
                        }
                    }
                }
            }
        }

        log::debug!("Listener: pump for capture {} exiting", self.id);
    }
}
