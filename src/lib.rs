pub mod console;
pub mod effects;
pub mod media;
pub mod report;
pub mod settings;
pub mod speech;
pub mod state_machine;
pub mod validation;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub use effects::{Capabilities, EffectRunner, InterviewEffectRunner};
pub use report::{InterviewReport, Outcome, QnA};
pub use settings::InterviewSettings;

use state_machine::{reduce, Effect, Event, Phase, Script, State};

const DEFAULT_CANDIDATE_NAME: &str = "Kandidat";

/// What the recruiting application hands over when a session starts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInput {
    pub candidate_display_name: String,
    pub questions: Vec<String>,
}

impl SessionInput {
    pub fn new(candidate_display_name: &str, questions: Vec<String>) -> Self {
        Self {
            candidate_display_name: candidate_display_name.to_string(),
            questions,
        }
    }

    /// Trimmed name (with a default) and the non-blank prompts, in order.
    fn normalized(self) -> (String, Vec<String>) {
        let name = self.candidate_display_name.trim();
        let name = if name.is_empty() {
            DEFAULT_CANDIDATE_NAME.to_string()
        } else {
            name.to_string()
        };

        let questions = self
            .questions
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect();
        (name, questions)
    }
}

/// UI state published to the host on every change.
/// Uses tagged union format: { "status": "permission" } or { "status": "listening", ... }
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum UiState {
    Permission,
    /// Blocking screen; recovery is a reload.
    Unsupported {
        message: String,
    },
    Intro {
        caption: String,
    },
    Question {
        index: usize,
        total: usize,
        caption: String,
    },
    Listening {
        index: usize,
        total: usize,
        turn: Uuid,
        transcript: String,
        #[serde(rename = "microphoneOn")]
        microphone_on: bool,
    },
    Processing {
        index: usize,
        total: usize,
    },
    Speaking {
        index: usize,
        total: usize,
        caption: String,
    },
    Completed {
        answered: usize,
        total: usize,
        outcome: Outcome,
    },
}

/// Convert internal State to UiState for the host
fn state_to_ui(script: &Script, state: &State) -> UiState {
    let total = script.questions.len();
    let index = state.cursor;
    match &state.phase {
        Phase::Permission => UiState::Permission,
        Phase::Unsupported { reason } => UiState::Unsupported {
            message: reason.clone(),
        },
        Phase::Intro { .. } => UiState::Intro {
            caption: state.caption.clone(),
        },
        Phase::Question { .. } => UiState::Question {
            index,
            total,
            caption: state.caption.clone(),
        },
        Phase::Listening { capture, live } => UiState::Listening {
            index,
            total,
            turn: *capture,
            transcript: live.answer(),
            microphone_on: state.microphone_on,
        },
        Phase::Processing { .. } => UiState::Processing { index, total },
        Phase::Speaking { .. } => UiState::Speaking {
            index,
            total,
            caption: state.caption.clone(),
        },
        Phase::Completed { outcome } => UiState::Completed {
            answered: state.records.len(),
            total,
            outcome: *outcome,
        },
    }
}

pub type CompletionCallback = Box<dyn FnOnce(InterviewReport) + Send + 'static>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Interview session has already ended")]
    Ended,
}

/// State loop context - everything the loop needs besides the state itself
struct StateLoop {
    script: Script,
    runner: Arc<dyn EffectRunner>,
    tx: mpsc::Sender<Event>,
    ui: watch::Sender<UiState>,
    /// Cancelled by `exit()` or dropping the handle; wins over queued events.
    shutdown: CancellationToken,
    on_complete: Option<CompletionCallback>,
    session_id: Uuid,
    started_at: DateTime<Utc>,
    report: Option<InterviewReport>,
}

impl StateLoop {
    async fn execute(&mut self, state: &State, effects: Vec<Effect>) {
        for eff in effects {
            match eff {
                Effect::EmitUi => {
                    self.ui.send_replace(state_to_ui(&self.script, state));
                }
                Effect::Teardown => self.runner.teardown().await,
                Effect::Deliver {
                    outcome,
                    records,
                    reprompts,
                } => self.deliver(outcome, records, reprompts),
                other => self.runner.spawn(other, self.tx.clone()),
            }
        }
    }

    fn deliver(&mut self, outcome: Outcome, records: Vec<QnA>, reprompts: u32) {
        let report = InterviewReport::new(
            self.session_id,
            self.script.candidate.clone(),
            self.started_at,
            outcome,
            records,
            reprompts,
        );
        log::info!(
            "Session {} {}: {}/{} answered ({} unverified, {} re-prompts)",
            self.session_id,
            outcome.as_str(),
            report.transcript.len(),
            self.script.questions.len(),
            report.unverified_answers,
            reprompts
        );

        match self.on_complete.take() {
            Some(callback) => callback(report.clone()),
            None => log::warn!("Session {} delivered more than once", self.session_id),
        }
        self.report = Some(report);
    }

    /// Run the main state loop until a terminal phase is reached
    async fn run(mut self, mut rx: mpsc::Receiver<Event>) -> Option<InterviewReport> {
        let (mut state, effects) = state_machine::begin();
        self.execute(&state, effects).await;
        log::info!(
            "Session {} started: {} question(s) for {}",
            self.session_id,
            self.script.questions.len(),
            self.script.candidate
        );

        while !state.is_terminal() {
            let event = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => Event::Exit,
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            log::debug!("Received event: {:?}", event);

            let (next, effects) = reduce(&self.script, &state, event);
            if next.phase.name() != state.phase.name() {
                log::info!(
                    "State transition: {} -> {} (question {}/{})",
                    state.phase.name(),
                    next.phase.name(),
                    (next.cursor + 1).min(self.script.questions.len()),
                    self.script.questions.len()
                );
            }

            state = next;
            self.execute(&state, effects).await;
        }

        log::info!("Session {} loop ended", self.session_id);
        self.report
    }
}

/// Handle to a running interview. Dropping it abandons the session.
pub struct InterviewSession {
    id: Uuid,
    tx: mpsc::Sender<Event>,
    ui: watch::Receiver<UiState>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<Option<InterviewReport>>>,
}

impl InterviewSession {
    /// Start a session on the current tokio runtime. Media acquisition begins
    /// immediately; `on_complete` receives the report exactly once, when the
    /// interview finishes or is abandoned.
    pub fn create<F>(
        input: SessionInput,
        settings: &InterviewSettings,
        capabilities: Capabilities,
        on_complete: F,
    ) -> Self
    where
        F: FnOnce(InterviewReport) + Send + 'static,
    {
        let runner = InterviewEffectRunner::new(capabilities, settings);
        Self::with_runner(input, settings, runner, Box::new(on_complete))
    }

    /// Start a session with a custom effect runner.
    pub fn with_runner(
        input: SessionInput,
        settings: &InterviewSettings,
        runner: Arc<dyn EffectRunner>,
        on_complete: CompletionCallback,
    ) -> Self {
        let (candidate, questions) = input.normalized();
        let script = Script::new(&candidate, questions, settings);
        let id = Uuid::new_v4();

        // Create event channel for state machine
        let (tx, rx) = mpsc::channel::<Event>(32);
        let (ui_tx, ui_rx) = watch::channel(UiState::Permission);
        let shutdown = CancellationToken::new();

        let state_loop = StateLoop {
            script,
            runner,
            tx: tx.clone(),
            ui: ui_tx,
            shutdown: shutdown.clone(),
            on_complete: Some(on_complete),
            session_id: id,
            started_at: Utc::now(),
            report: None,
        };
        let task = tokio::spawn(state_loop.run(rx));

        Self {
            id,
            tx,
            ui: ui_rx,
            shutdown,
            task: Some(task),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    async fn send(&self, event: Event) -> Result<(), SessionError> {
        self.tx.send(event).await.map_err(|_| SessionError::Ended)
    }

    /// Candidate finished their answer.
    pub async fn done_speaking(&self) -> Result<(), SessionError> {
        self.send(Event::DoneSpeaking).await
    }

    pub async fn set_microphone(&self, enabled: bool) -> Result<(), SessionError> {
        self.send(Event::SetMicrophone(enabled)).await
    }

    pub async fn set_camera(&self, enabled: bool) -> Result<(), SessionError> {
        self.send(Event::SetCamera(enabled)).await
    }

    /// Leave the session: stops capture, cancels narration, releases media
    /// and delivers the partial transcript. Calling it again is a no-op.
    pub async fn exit(&self) {
        if self.tx.is_closed() || self.shutdown.is_cancelled() {
            log::debug!("Exit: session {} already ended", self.id);
            return;
        }
        self.shutdown.cancel();
    }

    /// Watch UI state changes.
    pub fn subscribe(&self) -> watch::Receiver<UiState> {
        self.ui.clone()
    }

    pub fn ui_state(&self) -> UiState {
        self.ui.borrow().clone()
    }

    /// Wait for the session to end and return its report (None when media
    /// was denied, since nothing was delivered).
    pub async fn join(mut self) -> Option<InterviewReport> {
        let task = self.task.take()?;
        match task.await {
            Ok(report) => report,
            Err(e) => {
                log::error!("Session {} task failed: {}", self.id, e);
                None
            }
        }
    }
}

impl Drop for InterviewSession {
    fn drop(&mut self) {
        if self.task.as_ref().is_some_and(|t| !t.is_finished()) {
            log::debug!("Session {} handle dropped, abandoning", self.id);
        }
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::LiveCapture;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::oneshot;

    /// Runs nothing; the session only moves on host events.
    struct IdleRunner;

    #[async_trait]
    impl EffectRunner for IdleRunner {
        fn spawn(&self, _effect: Effect, _tx: mpsc::Sender<Event>) {}

        async fn teardown(&self) {}
    }

    fn script() -> Script {
        Script::new(
            "Budi",
            vec!["Q1".to_string(), "Q2".to_string()],
            &InterviewSettings::default(),
        )
    }

    #[test]
    fn input_normalization_drops_blank_questions_and_defaults_name() {
        let input = SessionInput::new("  ", vec![" Q1 ".to_string(), "   ".to_string(), "Q2".to_string()]);
        let (name, questions) = input.normalized();
        assert_eq!(name, DEFAULT_CANDIDATE_NAME);
        assert_eq!(questions, vec!["Q1".to_string(), "Q2".to_string()]);
    }

    #[test]
    fn session_input_reads_camel_case() {
        let input: SessionInput = serde_json::from_str(
            r#"{"candidateDisplayName":"Sari","questions":["Q1"]}"#,
        )
        .unwrap();
        assert_eq!(input.candidate_display_name, "Sari");
    }

    #[test]
    fn listening_ui_state_serializes_tagged() {
        let mut live = LiveCapture::default();
        live.push("saya", true);
        let state = State {
            phase: Phase::Listening {
                capture: Uuid::nil(),
                live,
            },
            cursor: 1,
            ..State::default()
        };
        let json = serde_json::to_value(state_to_ui(&script(), &state)).unwrap();
        assert_eq!(json["status"], "listening");
        assert_eq!(json["index"], 1);
        assert_eq!(json["total"], 2);
        assert_eq!(json["transcript"], "saya");
        assert_eq!(json["microphoneOn"], true);
    }

    #[test]
    fn completed_ui_state_reports_progress() {
        let state = State {
            phase: Phase::Completed {
                outcome: Outcome::Abandoned,
            },
            cursor: 1,
            records: vec![QnA::accepted("Q1", "A1", "Oke")],
            ..State::default()
        };
        assert_eq!(
            state_to_ui(&script(), &state),
            UiState::Completed {
                answered: 1,
                total: 2,
                outcome: Outcome::Abandoned
            }
        );
    }

    #[tokio::test]
    async fn dropping_handle_with_full_queue_still_abandons() {
        let (done_tx, done_rx) = oneshot::channel();
        let session = InterviewSession::with_runner(
            SessionInput::new("Budi", vec!["Q1".to_string()]),
            &InterviewSettings::default(),
            Arc::new(IdleRunner),
            Box::new(move |report| {
                let _ = done_tx.send(report);
            }),
        );

        // The loop has not run yet on this single-threaded runtime.
        while session.tx.try_send(Event::SetCamera(true)).is_ok() {}
        assert!(session.tx.try_send(Event::SetCamera(false)).is_err());
        drop(session);

        let report = tokio::time::timeout(Duration::from_secs(5), done_rx)
            .await
            .expect("session never ended")
            .expect("callback dropped");
        assert_eq!(report.outcome, Outcome::Abandoned);
        assert!(report.transcript.is_empty());
    }

    #[tokio::test]
    async fn exit_is_idempotent_and_ends_loop() {
        let session = InterviewSession::with_runner(
            SessionInput::new("Budi", vec!["Q1".to_string()]),
            &InterviewSettings::default(),
            Arc::new(IdleRunner),
            Box::new(|_: InterviewReport| {}),
        );
        session.exit().await;
        session.exit().await;

        let report = tokio::time::timeout(Duration::from_secs(5), session.join())
            .await
            .expect("session never ended")
            .expect("abandoned session delivers a report");
        assert_eq!(report.outcome, Outcome::Abandoned);
    }
}
