//! Effect runner for the Swapers interview
//!
//! This module handles executing effects produced by the state machine.
//! Completion of every asynchronous effect is reported back to the state
//! loop as an `Event`; stale completions are filtered by the reducer.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

use crate::media::{MediaGate, MediaStream, TrackKind};
use crate::settings::InterviewSettings;
use crate::speech::{
    Listener, ListenerFault, Narrator, SpeechError, Transcriber, VoiceNarrator,
};
use crate::state_machine::{Effect, Event};
use crate::validation::{AnswerValidator, ValidationError};

/// Platform capabilities a session runs on.
#[derive(Clone)]
pub struct Capabilities {
    pub media: Arc<dyn MediaGate>,
    pub transcriber: Arc<dyn Transcriber>,
    pub narrator: Arc<dyn Narrator>,
    pub validator: Arc<dyn AnswerValidator>,
}

/// Trait for running effects asynchronously.
/// Completion events are sent back via the provided channel.
#[async_trait]
pub trait EffectRunner: Send + Sync + 'static {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>);

    /// Stop recognition, cancel synthesis and release media, in that order.
    /// Safe to call more than once.
    async fn teardown(&self);
}

/// Media stream slot shared with the acquisition task.
struct MediaSlot {
    stream: Option<MediaStream>,
    disposed: bool,
    audio_enabled: bool,
    video_enabled: bool,
}

/// Effect runner backed by real (or fake) platform capabilities.
pub struct InterviewEffectRunner {
    media_gate: Arc<dyn MediaGate>,
    media: Arc<Mutex<MediaSlot>>,
    listener: Listener,
    narrator: VoiceNarrator,
    validator: Arc<dyn AnswerValidator>,
    validator_timeout: Duration,
}

impl InterviewEffectRunner {
    pub fn new(capabilities: Capabilities, settings: &InterviewSettings) -> Arc<Self> {
        Arc::new(Self {
            media_gate: capabilities.media,
            media: Arc::new(Mutex::new(MediaSlot {
                stream: None,
                disposed: false,
                audio_enabled: true,
                video_enabled: true,
            })),
            listener: Listener::new(
                capabilities.transcriber,
                &settings.language,
                settings.max_listener_restarts,
            ),
            narrator: VoiceNarrator::new(
                capabilities.narrator,
                &settings.language,
                settings.speech_rate,
                settings.speech_pitch,
            ),
            validator: capabilities.validator,
            validator_timeout: Duration::from_secs(settings.validator_timeout_secs),
        })
    }
}

#[async_trait]
impl EffectRunner for InterviewEffectRunner {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>) {
        match effect {
            Effect::AcquireMedia => {
                let gate = self.media_gate.clone();
                let media = self.media.clone();

                tokio::spawn(async move {
                    let result = gate.acquire().await;

                    let event = {
                        let mut slot = media.lock().await;
                        match result {
                            Ok(stream) if slot.disposed => {
                                log::info!("Media granted after session ended, releasing");
                                stream.stop_all();
                                return;
                            }
                            Ok(stream) => {
                                log::info!("Media granted: {} track(s)", stream.track_count());
                                stream.set_enabled(TrackKind::Audio, slot.audio_enabled);
                                stream.set_enabled(TrackKind::Video, slot.video_enabled);
                                slot.stream = Some(stream);
                                Event::MediaGranted
                            }
                            Err(e) => {
                                log::error!("Media acquisition failed: {}", e);
                                Event::MediaDenied {
                                    reason: e.to_string(),
                                }
                            }
                        }
                    }; // slot guard dropped before sending

                    let _ = tx.send(event).await;
                });
            }

            Effect::Speak { id, text } => {
                log::debug!("Speak {}: {}", id, text);
                self.narrator.speak(&text, move |result| {
                    let event = match result {
                        Err(SpeechError::Unsupported(reason)) => {
                            log::error!("Narration unsupported: {}", reason);
                            Event::SpeechUnsupported { reason }
                        }
                        Err(e) => {
                            log::debug!("Narration {} finished early: {}", id, e);
                            Event::SpeechDone { id }
                        }
                        Ok(()) => Event::SpeechDone { id },
                    };
                    tokio::spawn(async move {
                        let _ = tx.send(event).await;
                    });
                });
            }

            Effect::StartListening { id } => {
                if let Err(e) = self.listener.start(id, tx.clone()) {
                    log::error!("Failed to start listening: {}", e);
                    let event = match e {
                        SpeechError::Unsupported(reason) => Event::SpeechUnsupported { reason },
                        other => Event::CaptureFault {
                            id,
                            fault: ListenerFault::Engine(other.to_string()),
                        },
                    };
                    tokio::spawn(async move {
                        let _ = tx.send(event).await;
                    });
                }
            }

            Effect::StopListening { id } => {
                if self.listener.active_capture() == Some(id) {
                    self.listener.stop();
                } else {
                    log::debug!("StopListening: capture {} is not active", id);
                }
            }

            Effect::Validate { id, request } => {
                let validator = self.validator.clone();
                let timeout = self.validator_timeout;

                tokio::spawn(async move {
                    let result = tokio::time::timeout(timeout, validator.validate(&request))
                        .await
                        .unwrap_or(Err(ValidationError::Timeout(timeout.as_secs())));

                    let event = match result {
                        Ok(verdict) => Event::ValidationOk { id, verdict },
                        Err(e) => {
                            log::warn!("Validation failed: {}", e);
                            Event::ValidationFail {
                                id,
                                err: e.to_string(),
                            }
                        }
                    };
                    let _ = tx.send(event).await;
                });
            }

            Effect::SetTrackEnabled { kind, enabled } => {
                let media = self.media.clone();
                tokio::spawn(async move {
                    let mut slot = media.lock().await;
                    match kind {
                        TrackKind::Audio => slot.audio_enabled = enabled,
                        TrackKind::Video => slot.video_enabled = enabled,
                    }
                    if let Some(stream) = slot.stream.as_ref() {
                        stream.set_enabled(kind, enabled);
                    }
                    log::debug!("{} track enabled={}", kind.as_str(), enabled);
                });
            }

            Effect::Deliver { .. } | Effect::Teardown | Effect::EmitUi => {
                // Handled in the state loop, not here
                log::warn!("Effect {:?} reached the runner; ignoring", effect);
            }
        }
    }

    async fn teardown(&self) {
        if self.listener.stop() {
            log::debug!("Teardown: recognition stopped");
        }
        self.narrator.cancel();

        let mut slot = self.media.lock().await;
        slot.disposed = true;
        if let Some(stream) = slot.stream.take() {
            stream.stop_all();
        }
    }
}
