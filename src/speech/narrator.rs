//! Text-to-speech narration
//!
//! `VoiceNarrator::speak` cancels whatever is playing, picks a voice for
//! the session language and plays the line. The completion callback runs
//! exactly once per call: on playback end, on engine error, or when a
//! newer utterance cancels this one.

use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use super::{Narrator, SpeechError, Utterance, Voice};

/// Pick the best voice for `lang`: exact tag match first, then the same
/// primary subtag (`id` for `id-ID`), otherwise none (engine default).
pub fn select_voice(voices: &[Voice], lang: &str) -> Option<Voice> {
    let wanted = normalize_tag(lang);
    if let Some(v) = voices.iter().find(|v| normalize_tag(&v.lang) == wanted) {
        return Some(v.clone());
    }

    let primary = primary_subtag(&wanted);
    voices
        .iter()
        .find(|v| primary_subtag(&normalize_tag(&v.lang)) == primary)
        .cloned()
}

fn normalize_tag(tag: &str) -> String {
    tag.trim().replace('_', "-").to_ascii_lowercase()
}

fn primary_subtag(tag: &str) -> &str {
    tag.split('-').next().unwrap_or(tag)
}

/// Single-utterance narrator over a platform `Narrator`.
pub struct VoiceNarrator {
    engine: Arc<dyn Narrator>,
    lang: String,
    rate: f32,
    pitch: f32,
    current: Mutex<Option<CancellationToken>>,
}

impl VoiceNarrator {
    pub fn new(engine: Arc<dyn Narrator>, lang: &str, rate: f32, pitch: f32) -> Self {
        Self {
            engine,
            lang: lang.to_string(),
            rate,
            pitch,
            current: Mutex::new(None),
        }
    }

    /// Speak `text`, then call `on_done` with the playback result.
    pub fn speak<F>(&self, text: &str, on_done: F)
    where
        F: FnOnce(Result<(), SpeechError>) + Send + 'static,
    {
        self.cancel();

        let token = CancellationToken::new();
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = Some(token.clone());

        let voice = select_voice(&self.engine.voices(), &self.lang);
        if voice.is_none() {
            log::debug!("Narrator: no voice for {}, using engine default", self.lang);
        }
        let utterance = Utterance {
            text: text.to_string(),
            lang: self.lang.clone(),
            voice,
            rate: self.rate,
            pitch: self.pitch,
        };

        let engine = self.engine.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => Err(SpeechError::Cancelled),
                result = engine.speak(utterance) => result,
            };
            if let Err(e) = &result {
                log::debug!("Narrator: utterance ended early: {}", e);
            }
            on_done(result);
        });
    }

    /// Cancel any queued or playing utterance.
    pub fn cancel(&self) {
        if let Some(token) = self.current.lock().unwrap_or_else(|e| e.into_inner()).take() {
            token.cancel();
            self.engine.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct FakeEngine {
        voices: Vec<Voice>,
        delay: Duration,
        fail: bool,
        cancels: AtomicUsize,
        spoken: Mutex<Vec<Utterance>>,
    }

    impl FakeEngine {
        fn new(delay: Duration, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                voices: vec![Voice::new("Damayanti", "id-ID"), Voice::new("Samantha", "en-US")],
                delay,
                fail,
                cancels: AtomicUsize::new(0),
                spoken: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Narrator for FakeEngine {
        fn voices(&self) -> Vec<Voice> {
            self.voices.clone()
        }

        async fn speak(&self, utterance: Utterance) -> Result<(), SpeechError> {
            self.spoken.lock().unwrap().push(utterance);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                Err(SpeechError::Engine("synthesis-failed".to_string()))
            } else {
                Ok(())
            }
        }

        fn cancel(&self) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn voice_selection_prefers_exact_then_primary_subtag() {
        let voices = vec![
            Voice::new("Generic Indonesian", "id"),
            Voice::new("Damayanti", "id_ID"),
            Voice::new("Samantha", "en-US"),
        ];
        assert_eq!(select_voice(&voices, "id-ID").unwrap().name, "Damayanti");
        assert_eq!(select_voice(&voices, "en-GB").unwrap().name, "Samantha");
        assert!(select_voice(&voices, "ja-JP").is_none());
    }

    #[tokio::test]
    async fn on_done_fires_once_after_playback() {
        let engine = FakeEngine::new(Duration::from_millis(5), false);
        let narrator = VoiceNarrator::new(engine.clone(), "id-ID", 1.0, 1.0);
        let (tx, mut rx) = mpsc::unbounded_channel();

        narrator.speak("Halo", move |r| {
            let _ = tx.send(r);
        });

        assert_eq!(rx.recv().await, Some(Ok(())));
        assert_eq!(rx.recv().await, None);
        let spoken = engine.spoken.lock().unwrap();
        assert_eq!(spoken[0].voice.as_ref().unwrap().name, "Damayanti");
    }

    #[tokio::test]
    async fn engine_error_still_completes() {
        let engine = FakeEngine::new(Duration::from_millis(1), true);
        let narrator = VoiceNarrator::new(engine, "id-ID", 1.0, 1.0);
        let (tx, mut rx) = mpsc::unbounded_channel();

        narrator.speak("Halo", move |r| {
            let _ = tx.send(r);
        });

        assert!(matches!(rx.recv().await, Some(Err(SpeechError::Engine(_)))));
    }

    #[tokio::test]
    async fn new_utterance_cancels_previous() {
        let engine = FakeEngine::new(Duration::from_millis(50), false);
        let narrator = VoiceNarrator::new(engine.clone(), "id-ID", 1.0, 1.0);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let first_tx = tx.clone();
        narrator.speak("satu", move |r| {
            let _ = first_tx.send(("satu", r));
        });
        narrator.speak("dua", move |r| {
            let _ = tx.send(("dua", r));
        });

        assert_eq!(rx.recv().await, Some(("satu", Err(SpeechError::Cancelled))));
        assert_eq!(rx.recv().await, Some(("dua", Ok(()))));
        assert_eq!(engine.cancels.load(Ordering::SeqCst), 1);
    }
}
