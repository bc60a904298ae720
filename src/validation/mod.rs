//! Answer validation boundary
//!
//! A validator checks a spoken answer against the active question and
//! returns a verdict plus one short sentence to read back to the candidate.
//! The orchestrator treats any `Err` as "validator unavailable" and fails
//! open.

mod gemini;
mod heuristic;

pub use gemini::{is_api_key_configured, GeminiValidator};
pub use heuristic::HeuristicValidator;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Request sent to the validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRequest {
    pub transcript: String,
    pub question: String,
}

/// Validator response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationVerdict {
    pub is_valid: bool,
    pub feedback: String,
}

/// Errors that can occur while validating an answer
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Gemini API key not configured. Set GEMINI_API_KEY environment variable.")]
    MissingApiKey,
    #[error("Network error: {0}")]
    Network(String),
    #[error("Gemini API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Failed to parse validator response: {0}")]
    Parse(String),
    #[error("Validator returned no content")]
    EmptyResponse,
    #[error("Validator did not answer within {0}s")]
    Timeout(u64),
}

#[async_trait]
pub trait AnswerValidator: Send + Sync {
    async fn validate(
        &self,
        request: &ValidationRequest,
    ) -> Result<ValidationVerdict, ValidationError>;
}

/// Extract the JSON object from model output that may be wrapped in a
/// markdown fence or surrounded by prose.
pub fn extract_json(text: &str) -> &str {
    if let Some(start) = text.find("```json") {
        let body = &text[start + "```json".len()..];
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
    }

    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text.trim(),
    }
}

/// Parse a verdict out of raw model text.
pub fn parse_verdict(text: &str) -> Result<ValidationVerdict, ValidationError> {
    let json = extract_json(text);
    if json.is_empty() {
        return Err(ValidationError::EmptyResponse);
    }
    serde_json::from_str(json).map_err(|e| ValidationError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fenced_json() {
        let text = "Here you go:\n```json\n{\"isValid\": true, \"feedback\": \"Baik.\"}\n```\n";
        let verdict = parse_verdict(text).unwrap();
        assert!(verdict.is_valid);
        assert_eq!(verdict.feedback, "Baik.");
    }

    #[test]
    fn extracts_object_from_prose() {
        let text = "Result: {\"isValid\": false, \"feedback\": \"Bisa ulangi?\"} done";
        let verdict = parse_verdict(text).unwrap();
        assert!(!verdict.is_valid);
    }

    #[test]
    fn malformed_output_is_parse_error() {
        assert!(matches!(
            parse_verdict("{\"isValid\": \"maybe\"}"),
            Err(ValidationError::Parse(_))
        ));
        assert!(matches!(parse_verdict("   "), Err(ValidationError::EmptyResponse)));
    }

    #[test]
    fn request_uses_wire_field_names() {
        let request = ValidationRequest {
            transcript: "t".to_string(),
            question: "q".to_string(),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"transcript":"t","question":"q"}"#);
    }
}
