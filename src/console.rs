//! Terminal stand-ins for the platform capabilities
//!
//! Used by the `swapers` binary: the candidate types answers instead of
//! speaking them, and Swapers' lines are printed instead of played.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

use crate::media::{MediaError, MediaGate, MediaStream, MediaTrack, TrackKind};
use crate::speech::{Narrator, RecognitionEvent, SpeechError, Transcriber, Utterance, Voice};

/// Track with no hardware behind it.
struct VirtualTrack {
    kind: TrackKind,
    enabled: AtomicBool,
    stops: Arc<AtomicUsize>,
}

impl MediaTrack for VirtualTrack {
    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        log::debug!("Console media: {} enabled={}", self.kind.as_str(), enabled);
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Always grants one virtual audio and one virtual video track.
#[derive(Default)]
pub struct ConsoleMedia {
    stops: Arc<AtomicUsize>,
}

impl ConsoleMedia {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks released so far.
    pub fn released(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaGate for ConsoleMedia {
    async fn acquire(&self) -> Result<MediaStream, MediaError> {
        let tracks: Vec<Arc<dyn MediaTrack>> = [TrackKind::Audio, TrackKind::Video]
            .into_iter()
            .map(|kind| {
                Arc::new(VirtualTrack {
                    kind,
                    enabled: AtomicBool::new(true),
                    stops: self.stops.clone(),
                }) as Arc<dyn MediaTrack>
            })
            .collect();
        MediaStream::from_tracks(tracks)
    }
}

/// Recognizer fed from typed lines. Text typed while no recognition
/// session is running is dropped.
#[derive(Default)]
pub struct ConsoleTranscriber {
    sink: Mutex<Option<mpsc::UnboundedSender<RecognitionEvent>>>,
}

impl ConsoleTranscriber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver one typed line as a final segment. Returns false if nothing
    /// is listening.
    pub fn feed(&self, text: &str) -> bool {
        let sink = self.sink.lock().unwrap_or_else(|e| e.into_inner());
        match sink.as_ref() {
            Some(tx) => tx
                .send(RecognitionEvent::Segment {
                    text: text.to_string(),
                    is_final: true,
                })
                .is_ok(),
            None => false,
        }
    }
}

impl Transcriber for ConsoleTranscriber {
    fn start(
        &self,
        _language: &str,
        events: mpsc::UnboundedSender<RecognitionEvent>,
    ) -> Result<(), SpeechError> {
        *self.sink.lock().unwrap_or_else(|e| e.into_inner()) = Some(events);
        Ok(())
    }

    fn stop(&self) {
        if let Some(tx) = self.sink.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = tx.send(RecognitionEvent::Ended);
        }
    }
}

/// Prints each line and "plays" it for a fixed pause.
pub struct ConsoleNarrator {
    pause: Duration,
    cancelled: Notify,
}

impl ConsoleNarrator {
    pub fn new(pause: Duration) -> Self {
        Self {
            pause,
            cancelled: Notify::new(),
        }
    }
}

#[async_trait]
impl Narrator for ConsoleNarrator {
    fn voices(&self) -> Vec<Voice> {
        vec![Voice::new("console", "id-ID")]
    }

    async fn speak(&self, utterance: Utterance) -> Result<(), SpeechError> {
        println!("\nSwapers: {}", utterance.text);
        tokio::select! {
            _ = tokio::time::sleep(self.pause) => Ok(()),
            _ = self.cancelled.notified() => Err(SpeechError::Cancelled),
        }
    }

    fn cancel(&self) {
        self.cancelled.notify_waiters();
    }
}
