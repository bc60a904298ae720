//! Gemini API client for answer validation
//!
//! Sends the question and transcript to `generateContent` with a JSON
//! response schema and parses the verdict out of the returned text.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::OnceLock;
use std::time::Duration;

use super::{parse_verdict, AnswerValidator, ValidationError, ValidationRequest, ValidationVerdict};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Read back when Gemini answers with no text at all.
const EMPTY_REPLY_FEEDBACK: &str = "Maaf, sistem mengalami gangguan. Silakan ulangi.";

/// Global HTTP client for reuse across requests (avoids TLS handshake overhead)
static HTTP_CLIENT: OnceLock<Result<Client, String>> = OnceLock::new();

fn get_http_client() -> Result<&'static Client, ValidationError> {
    HTTP_CLIENT
        .get_or_init(|| {
            Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .map_err(|e| e.to_string())
        })
        .as_ref()
        .map_err(|e| ValidationError::Network(e.clone()))
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Read the API key from `GEMINI_API_KEY`, falling back to `API_KEY`.
fn get_api_key() -> Option<String> {
    ["GEMINI_API_KEY", "API_KEY"]
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|key| !key.trim().is_empty())
}

/// Check if an API key is configured (for status display)
pub fn is_api_key_configured() -> bool {
    get_api_key().is_some()
}

pub struct GeminiValidator {
    api_key: String,
    model: String,
    feedback_language: String,
}

impl GeminiValidator {
    pub fn new(api_key: String, model: &str, feedback_language: &str) -> Self {
        Self {
            api_key,
            model: model.to_string(),
            feedback_language: feedback_language.to_string(),
        }
    }

    pub fn from_env(model: &str, feedback_language: &str) -> Result<Self, ValidationError> {
        let api_key = get_api_key().ok_or(ValidationError::MissingApiKey)?;
        Ok(Self::new(api_key, model, feedback_language))
    }

    fn prompt(&self, request: &ValidationRequest) -> String {
        format!(
            "You are Swapers, an AI job interviewer. Check the quality of a candidate's \
             spoken answer (speech-to-text transcript) to the question: \"{question}\".\n\n\
             CANDIDATE TRANSCRIPT:\n\"{transcript}\"\n\n\
             RULES:\n\
             1. If the answer is very short (fewer than 3 words), irrelevant, mumbled or \
             sounds like background noise, isValid = false.\n\
             2. If the answer makes sense, even with broken grammar or a regional accent, \
             isValid = true.\n\
             3. Give a one-sentence 'feedback' in {language} that will be read back to the \
             candidate. When false, politely ask them to repeat. When true, a short natural \
             acknowledgement.\n\n\
             Return JSON: {{ \"isValid\": boolean, \"feedback\": \"string\" }}",
            question = request.question,
            transcript = request.transcript,
            language = self.feedback_language,
        )
    }

    fn body(&self, request: &ValidationRequest) -> serde_json::Value {
        json!({
            "contents": [{ "parts": [{ "text": self.prompt(request) }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "OBJECT",
                    "properties": {
                        "isValid": { "type": "BOOLEAN" },
                        "feedback": { "type": "STRING" }
                    },
                    "required": ["isValid", "feedback"]
                }
            }
        })
    }
}

#[async_trait]
impl AnswerValidator for GeminiValidator {
    async fn validate(
        &self,
        request: &ValidationRequest,
    ) -> Result<ValidationVerdict, ValidationError> {
        log::info!(
            "Validating answer: {} chars for question {:?}",
            request.transcript.len(),
            request.question
        );

        let url = format!("{}/{}:generateContent", API_BASE, self.model);
        let response = get_http_client()?
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.body(request))
            .send()
            .await
            .map_err(|e| ValidationError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message =
                if let Ok(error_response) = serde_json::from_str::<ApiErrorResponse>(&error_text) {
                    error_response.error.message
                } else {
                    error_text
                };

            log::error!("Gemini API error ({}): {}", status.as_u16(), message);
            return Err(ValidationError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ValidationError::Parse(e.to_string()))?;

        let verdict = verdict_from_text(response_text(&generated))?;
        log::info!("Validation verdict: is_valid={}", verdict.is_valid);
        Ok(verdict)
    }
}

/// An empty reply asks the candidate to repeat rather than passing the
/// answer through unverified.
fn verdict_from_text(text: Option<String>) -> Result<ValidationVerdict, ValidationError> {
    match text {
        Some(text) => parse_verdict(&text),
        None => {
            log::warn!("Gemini returned no text, asking the candidate to repeat");
            Ok(ValidationVerdict {
                is_valid: false,
                feedback: EMPTY_REPLY_FEEDBACK.to_string(),
            })
        }
    }
}

fn response_text(response: &GenerateResponse) -> Option<String> {
    let text: String = response
        .candidates
        .first()?
        .content
        .as_ref()?
        .parts
        .iter()
        .filter_map(|p| p.text.as_deref())
        .collect();
    (!text.trim().is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> GeminiValidator {
        GeminiValidator::new("test-key".to_string(), "gemini-2.5-flash", "Indonesian")
    }

    #[test]
    fn test_missing_api_key_error_display() {
        let err = ValidationError::MissingApiKey;
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn test_api_error_display() {
        let err = ValidationError::Api {
            status: 403,
            message: "API key not valid".to_string(),
        };
        assert!(err.to_string().contains("403"));
        assert!(err.to_string().contains("API key not valid"));
    }

    #[test]
    fn body_carries_schema_and_prompt() {
        let request = ValidationRequest {
            transcript: "Saya suka tantangan".to_string(),
            question: "Mengapa Anda melamar?".to_string(),
        };
        let body = validator().body(&request);
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        let prompt = body["contents"][0]["parts"][0]["text"].as_str().unwrap();
        assert!(prompt.contains("Saya suka tantangan"));
        assert!(prompt.contains("Mengapa Anda melamar?"));
        assert!(prompt.contains("Indonesian"));
    }

    #[test]
    fn response_text_joins_parts() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"{\"isValid\":"},{"text":"true,\"feedback\":\"Oke.\"}"}]}}]}"#,
        )
        .unwrap();
        let text = response_text(&response).unwrap();
        assert!(parse_verdict(&text).unwrap().is_valid);
    }

    #[test]
    fn empty_candidates_yield_no_text() {
        let response: GenerateResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(response_text(&response).is_none());
    }

    #[test]
    fn empty_reply_asks_candidate_to_repeat() {
        let response: GenerateResponse =
            serde_json::from_str(r#"{"candidates":[{"content":{"parts":[{"text":"  "}]}}]}"#)
                .unwrap();
        let verdict = verdict_from_text(response_text(&response)).unwrap();
        assert!(!verdict.is_valid);
        assert_eq!(verdict.feedback, EMPTY_REPLY_FEEDBACK);
    }

    #[test]
    fn unparseable_reply_still_fails_open() {
        let err = verdict_from_text(Some("not json at all".to_string())).unwrap_err();
        assert!(matches!(err, ValidationError::Parse(_)));
    }
}
