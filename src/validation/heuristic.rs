//! Offline validator used when no API key is configured.

use async_trait::async_trait;

use super::{AnswerValidator, ValidationError, ValidationRequest, ValidationVerdict};

/// Accepts any answer with at least `min_words` words.
pub struct HeuristicValidator {
    min_words: usize,
    accept_feedback: String,
    reject_feedback: String,
}

impl HeuristicValidator {
    pub fn new(min_words: usize, accept_feedback: &str, reject_feedback: &str) -> Self {
        Self {
            min_words,
            accept_feedback: accept_feedback.to_string(),
            reject_feedback: reject_feedback.to_string(),
        }
    }
}

#[async_trait]
impl AnswerValidator for HeuristicValidator {
    async fn validate(
        &self,
        request: &ValidationRequest,
    ) -> Result<ValidationVerdict, ValidationError> {
        let words = request.transcript.split_whitespace().count();
        let is_valid = words >= self.min_words;
        log::debug!("Heuristic validator: {} words, is_valid={}", words, is_valid);

        Ok(ValidationVerdict {
            is_valid,
            feedback: if is_valid {
                self.accept_feedback.clone()
            } else {
                self.reject_feedback.clone()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(transcript: &str) -> ValidationRequest {
        ValidationRequest {
            transcript: transcript.to_string(),
            question: "Ceritakan pengalaman kerja Anda".to_string(),
        }
    }

    #[tokio::test]
    async fn counts_words() {
        let validator = HeuristicValidator::new(3, "Baik.", "Bisa ulangi?");
        assert!(!validator.validate(&request("hmm ya")).await.unwrap().is_valid);

        let verdict = validator
            .validate(&request("I worked at Acme for 3 years"))
            .await
            .unwrap();
        assert!(verdict.is_valid);
        assert_eq!(verdict.feedback, "Baik.");
    }
}
