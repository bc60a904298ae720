//! Speech capabilities for the interview
//!
//! Platform recognizers and synthesizers sit behind two small traits,
//! `Transcriber` and `Narrator`. The wrappers in this module (`Listener`,
//! `VoiceNarrator`) add the session policies on top: capture buffering,
//! auto-restart, voice selection and single-utterance playback.

pub mod listener;
pub mod narrator;

pub use listener::{LiveCapture, Listener};
pub use narrator::VoiceNarrator;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors raised by speech engines.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SpeechError {
    #[error("Speech engine not supported: {0}")]
    Unsupported(String),
    #[error("Speech engine busy")]
    Busy,
    #[error("Utterance cancelled")]
    Cancelled,
    #[error("Speech engine error: {0}")]
    Engine(String),
}

/// Low-value recognition problems reported to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "camelCase")]
pub enum ListenerFault {
    /// The engine heard nothing before giving up.
    NoSpeech,
    /// Any other engine problem (audio capture, network, aborted).
    Engine(String),
}

impl std::fmt::Display for ListenerFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerFault::NoSpeech => write!(f, "no speech detected"),
            ListenerFault::Engine(msg) => write!(f, "recognition error: {}", msg),
        }
    }
}

/// Events produced by a running recognizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// A recognized segment. Interim segments replace each other; final
    /// segments are committed to the capture.
    Segment { text: String, is_final: bool },
    Error(ListenerFault),
    /// The engine ended its session (intentionally or on its own).
    Ended,
}

/// Continuous, interim-result speech recognition.
pub trait Transcriber: Send + Sync {
    /// Begin a recognition session. Events are pushed into `events` until
    /// the session ends, which is always signalled with `Ended`.
    fn start(
        &self,
        language: &str,
        events: mpsc::UnboundedSender<RecognitionEvent>,
    ) -> Result<(), SpeechError>;

    fn stop(&self);
}

/// A synthesis voice exposed by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    pub name: String,
    /// BCP-47 tag, e.g. `id-ID`.
    pub lang: String,
}

impl Voice {
    pub fn new(name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lang: lang.into(),
        }
    }
}

/// One utterance handed to the synthesizer.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub lang: String,
    pub voice: Option<Voice>,
    pub rate: f32,
    pub pitch: f32,
}

/// Text-to-speech playback.
#[async_trait]
pub trait Narrator: Send + Sync {
    fn voices(&self) -> Vec<Voice>;

    /// Play `utterance`, resolving when playback ends.
    async fn speak(&self, utterance: Utterance) -> Result<(), SpeechError>;

    /// Drop anything queued or playing.
    fn cancel(&self);
}
