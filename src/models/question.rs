// src/models/question.rs

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Number of answer options every question carries.
pub const OPTION_COUNT: usize = 4;

/// Longest question id, in characters.
pub const MAX_ID_LEN: usize = 64;

/// One multiple-choice item of a generated quiz.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// Unique within its quiz (`q1`, `q2`, ... when the model omits it).
    #[validate(length(min = 1, max = 64))]
    pub id: String,

    /// The question text.
    #[validate(length(min = 1, max = 2000))]
    pub question: String,

    /// Exactly four options. The index is the addressing scheme for answers.
    #[validate(custom(function = validate_options))]
    pub options: Vec<String>,

    /// Index of the correct option.
    #[validate(range(max = 3))]
    pub correct_answer: u8,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

/// DTO for sending a question to the quiz taker (excludes answer and explanation).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    pub id: String,
    pub question: String,
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id.clone(),
            question: q.question.clone(),
            options: q.options.clone(),
            topic: q.topic.clone(),
        }
    }
}

fn validate_options(options: &[String]) -> Result<(), validator::ValidationError> {
    if options.len() != OPTION_COUNT {
        return Err(validator::ValidationError::new("exactly_four_options_required"));
    }
    for opt in options {
        if opt.trim().is_empty() {
            return Err(validator::ValidationError::new("option_cannot_be_empty"));
        }
        if opt.len() > 500 {
            return Err(validator::ValidationError::new("option_too_long"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(options: &[&str], correct_answer: u8) -> Question {
        Question {
            id: "q1".into(),
            question: "What is Rust's package manager?".into(),
            options: options.iter().map(|s| s.to_string()).collect(),
            correct_answer,
            explanation: Some("Cargo ships with Rust.".into()),
            topic: Some("Tooling".into()),
        }
    }

    #[test]
    fn test_valid_question_passes() {
        assert!(question(&["cargo", "npm", "pip", "gem"], 0).validate().is_ok());
    }

    #[test]
    fn test_three_options_rejected() {
        assert!(question(&["cargo", "npm", "pip"], 0).validate().is_err());
    }

    #[test]
    fn test_blank_option_rejected() {
        assert!(question(&["cargo", " ", "pip", "gem"], 0).validate().is_err());
    }

    #[test]
    fn test_out_of_range_answer_rejected() {
        assert!(question(&["cargo", "npm", "pip", "gem"], 4).validate().is_err());
    }

    #[test]
    fn test_public_question_has_no_answer_fields() {
        let public = PublicQuestion::from(&question(&["cargo", "npm", "pip", "gem"], 2));
        let json = serde_json::to_value(&public).unwrap();
        assert!(json.get("correctAnswer").is_none());
        assert!(json.get("explanation").is_none());
        assert_eq!(json["topic"], "Tooling");
    }
}
