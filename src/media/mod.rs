//! Camera + microphone acquisition
//!
//! The platform hands back a stream made of independent tracks. Muting
//! flips a track's enabled flag; stopping releases the hardware. A stream
//! stops each of its tracks exactly once, however many times `stop_all`
//! is called.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Audio => "audio",
            TrackKind::Video => "video",
        }
    }
}

/// Errors returned when the platform refuses or cannot supply media.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MediaError {
    #[error("Camera/microphone access denied: {0}")]
    Denied(String),
    #[error("No {0} device available")]
    NoDevice(&'static str),
    #[error("Only partial access granted (missing {0} track)")]
    PartialGrant(&'static str),
    #[error("Media capture not supported: {0}")]
    Unsupported(String),
}

/// A single hardware track handle.
pub trait MediaTrack: Send + Sync {
    fn kind(&self) -> TrackKind;
    fn set_enabled(&self, enabled: bool);
    fn stop(&self);
}

/// Platform capability that asks for camera+microphone access.
#[async_trait]
pub trait MediaGate: Send + Sync {
    async fn acquire(&self) -> Result<MediaStream, MediaError>;
}

struct TrackSlot {
    track: Arc<dyn MediaTrack>,
    stopped: AtomicBool,
}

/// Live camera+microphone stream owned by one session.
pub struct MediaStream {
    tracks: Vec<TrackSlot>,
}

impl std::fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStream")
            .field("tracks", &self.tracks.len())
            .finish()
    }
}

impl MediaStream {
    /// Build a stream from granted tracks. A grant without both an audio
    /// and a video track is rejected and whatever was granted is released.
    pub fn from_tracks(tracks: Vec<Arc<dyn MediaTrack>>) -> Result<Self, MediaError> {
        let stream = Self {
            tracks: tracks
                .into_iter()
                .map(|track| TrackSlot {
                    track,
                    stopped: AtomicBool::new(false),
                })
                .collect(),
        };

        for kind in [TrackKind::Audio, TrackKind::Video] {
            if !stream.has(kind) {
                stream.stop_all();
                return Err(MediaError::PartialGrant(kind.as_str()));
            }
        }
        Ok(stream)
    }

    pub fn has(&self, kind: TrackKind) -> bool {
        self.tracks.iter().any(|s| s.track.kind() == kind)
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Toggle every track of `kind` without releasing it.
    pub fn set_enabled(&self, kind: TrackKind, enabled: bool) {
        for slot in self.tracks.iter().filter(|s| s.track.kind() == kind) {
            if !slot.stopped.load(Ordering::SeqCst) {
                slot.track.set_enabled(enabled);
            }
        }
    }

    /// Stop every track. Returns how many tracks were stopped by this call.
    pub fn stop_all(&self) -> usize {
        let mut stopped = 0;
        for slot in &self.tracks {
            if !slot.stopped.swap(true, Ordering::SeqCst) {
                slot.track.stop();
                stopped += 1;
            }
        }
        if stopped > 0 {
            log::info!("Media: released {} track(s)", stopped);
        }
        stopped
    }
}

impl Drop for MediaStream {
    fn drop(&mut self) {
        self.stop_all();
    }
}
