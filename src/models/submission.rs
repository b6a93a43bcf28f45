// src/models/submission.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Performance band derived from the rounded percentage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Performance {
    Excellent,
    Good,
    Average,
    NeedsImprovement,
}

impl Performance {
    pub fn from_percentage(percentage: u32) -> Self {
        match percentage {
            80.. => Performance::Excellent,
            60..=79 => Performance::Good,
            40..=59 => Performance::Average,
            _ => Performance::NeedsImprovement,
        }
    }
}

/// The scored outcome of the single allowed attempt at a quiz.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResult {
    pub quiz_id: Uuid,
    pub submitted_at: DateTime<Utc>,
    pub total_questions: usize,
    pub correct_answers: usize,
    pub incorrect_answers: usize,
    pub score: usize,
    pub percentage: u32,
    /// Seconds, as reported by the client.
    pub time_taken: Option<u64>,
    pub performance: Performance,
    pub question_results: Vec<QuestionResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResult {
    pub question_id: String,
    pub user_answer: Option<i64>,
    pub correct_answer: u8,
    pub is_correct: bool,
    pub question: String,
    pub options: Vec<String>,
    pub explanation: Option<String>,
    pub topic: Option<String>,
}

/// DTO for submitting a quiz attempt.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitQuizRequest {
    /// One entry per question, in question order. `null` means unanswered.
    /// The count is checked against the quiz, not here.
    pub answers: Vec<Option<i64>>,

    /// Seconds spent on the quiz, capped at one week.
    #[validate(range(max = 604800))]
    pub time_taken: Option<u64>,
}

/// Submission response: the stored result plus advice text.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResponse {
    #[serde(flatten)]
    pub result: SubmissionResult,
    pub suggestions: Vec<String>,
}

/// Results lookup. Absence is a normal answer (`found: false`), not an error.
#[derive(Debug, Serialize)]
pub struct ResultsLookup {
    pub found: bool,
    #[serde(flatten)]
    pub result: Option<SubmissionResult>,
}

impl ResultsLookup {
    pub fn from_option(result: Option<SubmissionResult>) -> Self {
        Self {
            found: result.is_some(),
            result,
        }
    }
}
