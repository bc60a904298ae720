//! Interview output records
//!
//! One `QnA` is created per accepted answer and never mutated afterwards.
//! The full list is wrapped in an `InterviewReport` and handed to the
//! hosting application when the session ends (finished or abandoned).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Feedback prefix for answers accepted without a validator verdict.
pub const VALIDATION_ERROR_MARKER: &str = "[validation-unavailable]";

/// A single accepted answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QnA {
    pub question: String,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_feedback: Option<String>,
    /// False when the validator could not be reached and the answer was
    /// accepted as-is.
    #[serde(default = "default_verified")]
    pub verified: bool,
}

fn default_verified() -> bool {
    true
}

impl QnA {
    /// Record for an answer the validator accepted.
    pub fn accepted(question: &str, answer: &str, feedback: &str) -> Self {
        Self {
            question: question.to_string(),
            answer: answer.to_string(),
            ai_feedback: (!feedback.trim().is_empty()).then(|| feedback.to_string()),
            verified: true,
        }
    }

    /// Record for an answer accepted because validation failed.
    pub fn unverified(question: &str, answer: &str, err: &str) -> Self {
        Self {
            question: question.to_string(),
            answer: answer.to_string(),
            ai_feedback: Some(format!("{} {}", VALIDATION_ERROR_MARKER, err)),
            verified: false,
        }
    }
}

/// How the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Outcome {
    /// Every question received an accepted answer.
    Finished,
    /// The candidate left early; the transcript is simply shorter.
    Abandoned,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Finished => "finished",
            Outcome::Abandoned => "abandoned",
        }
    }
}

/// Everything the hosting application receives at session end.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewReport {
    pub session_id: Uuid,
    pub candidate: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub outcome: Outcome,
    pub transcript: Vec<QnA>,
    /// Number of times a question was re-asked (local rejects, no-speech,
    /// validator "invalid").
    pub reprompts: u32,
    pub unverified_answers: usize,
}

impl InterviewReport {
    pub fn new(
        session_id: Uuid,
        candidate: String,
        started_at: DateTime<Utc>,
        outcome: Outcome,
        transcript: Vec<QnA>,
        reprompts: u32,
    ) -> Self {
        let unverified_answers = transcript.iter().filter(|r| !r.verified).count();
        Self {
            session_id,
            candidate,
            started_at,
            completed_at: Utc::now(),
            outcome,
            transcript,
            reprompts,
            unverified_answers,
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.completed_at - self.started_at
    }
}
