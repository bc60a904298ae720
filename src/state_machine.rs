//! State machine for the Swapers interview
//!
//! This module implements the interview flow using a single-writer pattern.
//! All state transitions go through the `reduce()` function, which returns
//! a new state and a list of effects to execute. The reducer never touches
//! hardware or the network; the effect runner does.

use uuid::Uuid;

use crate::media::TrackKind;
use crate::report::{Outcome, QnA};
use crate::settings::{InterviewSettings, SpokenLines};
use crate::speech::{ListenerFault, LiveCapture};
use crate::validation::{ValidationRequest, ValidationVerdict};

/// Read-only session script: who is interviewed, what is asked, what is said.
#[derive(Debug, Clone)]
pub struct Script {
    pub candidate: String,
    pub questions: Vec<String>,
    pub lines: SpokenLines,
    pub min_answer_chars: usize,
    /// Consecutive recognizer failures tolerated before giving up.
    pub max_engine_faults: u32,
}

impl Script {
    pub fn new(candidate: &str, questions: Vec<String>, settings: &InterviewSettings) -> Self {
        Self {
            candidate: candidate.to_string(),
            questions,
            lines: settings.lines.clone(),
            min_answer_chars: settings.min_answer_chars,
            max_engine_faults: settings.max_engine_faults,
        }
    }

    /// Question at `index`; empty past the end of the list.
    pub fn question(&self, index: usize) -> &str {
        self.questions.get(index).map(String::as_str).unwrap_or_default()
    }
}

/// What happens once the current narration finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterSpeech {
    /// Re-open the microphone for the same question.
    Relisten,
    /// Ask the question at the cursor (or close the session).
    NextQuestion,
    /// The closing line was spoken; the session is complete.
    Finish,
}

/// Active phase of the interview. Exactly one is active at a time.
#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    /// Waiting for camera+microphone access.
    Permission,
    /// Media denied, or speech recognition/synthesis unavailable. Terminal.
    Unsupported { reason: String },
    /// Greeting is being spoken.
    Intro { utterance: Uuid },
    /// The question at the cursor is being spoken.
    Question { utterance: Uuid },
    Listening { capture: Uuid, live: LiveCapture },
    /// Waiting for the validator.
    Processing { request: Uuid, answer: String },
    /// Feedback, re-prompt or closing line is being spoken.
    Speaking { utterance: Uuid, then: AfterSpeech },
    /// Terminal.
    Completed { outcome: Outcome },
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Permission => "permission",
            Phase::Unsupported { .. } => "unsupported",
            Phase::Intro { .. } => "intro",
            Phase::Question { .. } => "question",
            Phase::Listening { .. } => "listening",
            Phase::Processing { .. } => "processing",
            Phase::Speaking { .. } => "speaking",
            Phase::Completed { .. } => "completed",
        }
    }
}

/// Internal state of the interview.
/// This is the authoritative state - all transitions go through the reducer.
#[derive(Debug, Clone)]
pub struct State {
    pub phase: Phase,
    /// Index of the question being asked; only ever increases.
    pub cursor: usize,
    /// Accepted answers, in question order. Append-only.
    pub records: Vec<QnA>,
    pub reprompts: u32,
    /// Recognizer failures since the candidate was last heard.
    pub engine_faults: u32,
    pub microphone_on: bool,
    pub camera_on: bool,
    /// Line currently being narrated, shown as a caption.
    pub caption: String,
}

impl Default for State {
    fn default() -> Self {
        Self {
            phase: Phase::Permission,
            cursor: 0,
            records: Vec::new(),
            reprompts: 0,
            engine_faults: 0,
            microphone_on: true,
            camera_on: true,
            caption: String::new(),
        }
    }
}

impl State {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.phase,
            Phase::Completed { .. } | Phase::Unsupported { .. }
        )
    }
}

/// Events that can trigger state transitions.
/// These come from the candidate (UI actions) and from effect completions.
#[derive(Debug, Clone)]
pub enum Event {
    MediaGranted,
    MediaDenied {
        reason: String,
    },
    /// Narration `id` finished (played, failed or was cancelled)
    SpeechDone {
        id: Uuid,
    },
    TranscriptUpdate {
        id: Uuid,
        capture: LiveCapture,
    },
    CaptureFault {
        id: Uuid,
        fault: ListenerFault,
    },
    /// The platform has no usable recognizer or synthesizer.
    SpeechUnsupported {
        reason: String,
    },
    /// Candidate pressed "I'm done speaking"
    DoneSpeaking,
    ValidationOk {
        id: Uuid,
        verdict: ValidationVerdict,
    },
    ValidationFail {
        id: Uuid,
        err: String,
    },
    SetMicrophone(bool),
    SetCamera(bool),
    /// Candidate left the session
    Exit,
}

/// Effects to be executed after a state transition.
#[derive(Debug, Clone)]
pub enum Effect {
    AcquireMedia,
    Speak {
        id: Uuid,
        text: String,
    },
    StartListening {
        id: Uuid,
    },
    /// Intentional stop; the listener must not auto-restart.
    StopListening {
        id: Uuid,
    },
    Validate {
        id: Uuid,
        request: ValidationRequest,
    },
    SetTrackEnabled {
        kind: TrackKind,
        enabled: bool,
    },
    /// Hand the transcript to the hosting application
    Deliver {
        outcome: Outcome,
        records: Vec<QnA>,
        reprompts: u32,
    },
    /// Stop recognition, cancel synthesis, release media
    Teardown,
    /// Signal to publish UI state
    EmitUi,
}

/// Initial state plus the effects that kick off a session.
pub fn begin() -> (State, Vec<Effect>) {
    (State::default(), vec![Effect::AcquireMedia, Effect::EmitUi])
}

/// Reducer function: (state, event) -> (next_state, effects)
///
/// Key rules:
/// - Never mutate state directly
/// - Ignore events with stale narration/capture/request ids
/// - Terminal phases ignore every event
pub fn reduce(script: &Script, state: &State, event: Event) -> (State, Vec<Effect>) {
    use Effect::*;
    use Event::*;
    use Phase::*;

    if state.is_terminal() {
        return (state.clone(), vec![]);
    }

    let mut next = state.clone();

    match (&state.phase, event) {
        // -----------------
        // Permission
        // -----------------
        (Permission, MediaGranted) => {
            let id = Uuid::new_v4();
            next.phase = Intro { utterance: id };
            let text = script.lines.greeting_for(&script.candidate);
            next.caption = text.clone();
            (next, vec![Speak { id, text }, EmitUi])
        }
        (Permission, MediaDenied { reason }) => {
            let effects = give_up(&mut next, None, reason);
            (next, effects)
        }

        // -----------------
        // Narration finished
        // -----------------
        (Intro { utterance }, SpeechDone { id }) if *utterance == id => {
            let effects = ask_question_at_cursor(script, &mut next);
            (next, effects)
        }
        (Question { utterance }, SpeechDone { id }) if *utterance == id => {
            let effects = start_listening(&mut next);
            (next, effects)
        }
        (Speaking { utterance, then }, SpeechDone { id }) if *utterance == id => {
            let effects = match then {
                AfterSpeech::Relisten => start_listening(&mut next),
                AfterSpeech::NextQuestion => ask_question_at_cursor(script, &mut next),
                AfterSpeech::Finish => finish(&mut next, Outcome::Finished),
            };
            (next, effects)
        }

        // -----------------
        // Listening
        // -----------------
        (Listening { capture, .. }, TranscriptUpdate { id, capture: live }) if *capture == id => {
            next.phase = Listening {
                capture: *capture,
                live,
            };
            next.engine_faults = 0;
            (next, vec![EmitUi])
        }
        (Listening { capture, .. }, CaptureFault { id, fault }) if *capture == id => {
            log::info!("Capture fault on question {}: {}", state.cursor + 1, fault);
            if let ListenerFault::Engine(msg) = &fault {
                next.engine_faults += 1;
                if next.engine_faults >= script.max_engine_faults {
                    log::error!(
                        "Recognizer failed {} times in a row, giving up",
                        next.engine_faults
                    );
                    let effects = give_up(&mut next, Some(*capture), msg.clone());
                    return (next, effects);
                }
            }
            let effects = reprompt(
                &mut next,
                Some(*capture),
                script.lines.repeat_no_speech.clone(),
            );
            (next, effects)
        }
        (Listening { capture, live }, DoneSpeaking) => {
            let answer = live.answer().trim().to_string();
            let length = answer.chars().count();

            if length < script.min_answer_chars {
                log::info!(
                    "Answer too short ({} < {} chars), re-prompting without validation",
                    length,
                    script.min_answer_chars
                );
                let effects = reprompt(
                    &mut next,
                    Some(*capture),
                    script.lines.repeat_short_answer.clone(),
                );
                return (next, effects);
            }

            let question = script.question(state.cursor).to_string();
            let id = Uuid::new_v4();
            next.phase = Processing {
                request: id,
                answer: answer.clone(),
            };
            (
                next,
                vec![
                    StopListening { id: *capture },
                    Validate {
                        id,
                        request: ValidationRequest {
                            transcript: answer,
                            question,
                        },
                    },
                    EmitUi,
                ],
            )
        }

        // -----------------
        // Processing
        // -----------------
        (Processing { request, answer }, ValidationOk { id, verdict }) if *request == id => {
            let question = script.question(state.cursor);
            if verdict.is_valid {
                next.records
                    .push(QnA::accepted(question, answer, &verdict.feedback));
                next.cursor += 1;
                let text = non_empty_or(verdict.feedback, &script.lines.accepted);
                let effects = speak_then(&mut next, text, AfterSpeech::NextQuestion);
                (next, effects)
            } else {
                log::info!("Validator rejected answer to question {}", state.cursor + 1);
                let text = non_empty_or(verdict.feedback, &script.lines.repeat_no_speech);
                let effects = reprompt(&mut next, None, text);
                (next, effects)
            }
        }
        (Processing { request, answer }, ValidationFail { id, err }) if *request == id => {
            log::warn!(
                "Validator unavailable for question {} ({}), accepting answer unverified",
                state.cursor + 1,
                err
            );
            let question = script.question(state.cursor);
            next.records.push(QnA::unverified(question, answer, &err));
            next.cursor += 1;
            let text = script.lines.validator_unavailable.clone();
            let effects = speak_then(&mut next, text, AfterSpeech::NextQuestion);
            (next, effects)
        }

        // -----------------
        // Track toggles (mute is not stop)
        // -----------------
        (_, SetMicrophone(enabled)) => {
            next.microphone_on = enabled;
            (
                next,
                vec![
                    SetTrackEnabled {
                        kind: TrackKind::Audio,
                        enabled,
                    },
                    EmitUi,
                ],
            )
        }
        (_, SetCamera(enabled)) => {
            next.camera_on = enabled;
            (
                next,
                vec![
                    SetTrackEnabled {
                        kind: TrackKind::Video,
                        enabled,
                    },
                    EmitUi,
                ],
            )
        }

        // -----------------
        // Speech unavailable (from any non-terminal phase)
        // -----------------
        (Listening { capture, .. }, SpeechUnsupported { reason }) => {
            let effects = give_up(&mut next, Some(*capture), reason);
            (next, effects)
        }
        (_, SpeechUnsupported { reason }) => {
            let effects = give_up(&mut next, None, reason);
            (next, effects)
        }

        // -----------------
        // Exit (from any non-terminal phase)
        // -----------------
        (Listening { capture, .. }, Exit) => {
            let mut effects = vec![StopListening { id: *capture }];
            effects.extend(finish(&mut next, Outcome::Abandoned));
            (next, effects)
        }
        (_, Exit) => {
            let effects = finish(&mut next, Outcome::Abandoned);
            (next, effects)
        }

        // -----------------
        // Stale or unhandled: no transition
        // -----------------
        (phase, event) => {
            log::debug!("Ignoring {:?} in phase {}", event, phase.name());
            (state.clone(), vec![])
        }
    }
}

fn non_empty_or(text: String, fallback: &str) -> String {
    if text.trim().is_empty() {
        fallback.to_string()
    } else {
        text
    }
}

fn ask_question_at_cursor(script: &Script, next: &mut State) -> Vec<Effect> {
    let id = Uuid::new_v4();
    match script.questions.get(next.cursor) {
        Some(question) => {
            next.phase = Phase::Question { utterance: id };
            let text = script.lines.question_line(next.cursor, question);
            next.caption = text.clone();
            vec![Effect::Speak { id, text }, Effect::EmitUi]
        }
        None => speak_then(next, script.lines.closing.clone(), AfterSpeech::Finish),
    }
}

fn start_listening(next: &mut State) -> Vec<Effect> {
    let id = Uuid::new_v4();
    next.phase = Phase::Listening {
        capture: id,
        live: LiveCapture::default(),
    };
    next.caption.clear();
    vec![Effect::StartListening { id }, Effect::EmitUi]
}

fn speak_then(next: &mut State, text: String, then: AfterSpeech) -> Vec<Effect> {
    let id = Uuid::new_v4();
    next.phase = Phase::Speaking { utterance: id, then };
    next.caption = text.clone();
    vec![Effect::Speak { id, text }, Effect::EmitUi]
}

/// Re-ask the current question. The capture (if any) is stopped before the
/// narrator starts so the microphone never hears the re-prompt.
fn reprompt(next: &mut State, capture: Option<Uuid>, text: String) -> Vec<Effect> {
    next.reprompts += 1;
    let mut effects: Vec<Effect> = capture
        .map(|id| Effect::StopListening { id })
        .into_iter()
        .collect();
    effects.extend(speak_then(next, text, AfterSpeech::Relisten));
    effects
}

/// Enter the blocking unsupported screen. Nothing is delivered.
fn give_up(next: &mut State, capture: Option<Uuid>, reason: String) -> Vec<Effect> {
    next.phase = Phase::Unsupported { reason };
    next.caption.clear();
    let mut effects: Vec<Effect> = capture
        .map(|id| Effect::StopListening { id })
        .into_iter()
        .collect();
    effects.extend([Effect::Teardown, Effect::EmitUi]);
    effects
}

fn finish(next: &mut State, outcome: Outcome) -> Vec<Effect> {
    next.phase = Phase::Completed { outcome };
    vec![
        Effect::Teardown,
        Effect::Deliver {
            outcome,
            records: next.records.clone(),
            reprompts: next.reprompts,
        },
        Effect::EmitUi,
    ]
}
