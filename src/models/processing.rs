// src/models/processing.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::quiz::GenerationOptions;

/// Status of a generation job, polled by the client while the quiz is built.
///
/// `uploaded -> processing -> completed | failed`. Terminal states are never left;
/// a job that never finishes simply expires from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum ProcessingState {
    Uploaded(JobInfo),
    Processing(JobInfo),
    Completed {
        quiz_id: Uuid,
        completed_at: DateTime<Utc>,
    },
    Failed {
        error: String,
        failed_at: DateTime<Utc>,
    },
}

impl ProcessingState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessingState::Completed { .. } | ProcessingState::Failed { .. }
        )
    }

    pub fn status(&self) -> &'static str {
        match self {
            ProcessingState::Uploaded(_) => "uploaded",
            ProcessingState::Processing(_) => "processing",
            ProcessingState::Completed { .. } => "completed",
            ProcessingState::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    pub started_at: DateTime<Utc>,
    pub options: GenerationOptions,
    pub file_count: usize,
    pub total_size: usize,
    pub files: Vec<FileSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    pub name: String,
    pub size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_tag_is_flattened() {
        let state = ProcessingState::Completed {
            quiz_id: Uuid::nil(),
            completed_at: Utc::now(),
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["status"], "completed");
        assert!(json.get("quizId").is_some());
        assert!(state.is_terminal());
    }

    #[test]
    fn test_processing_roundtrip_keeps_job_info() {
        let state = ProcessingState::Processing(JobInfo {
            started_at: Utc::now(),
            options: GenerationOptions {
                language: "en".into(),
                include_explanations: true,
                min_questions: 5,
                max_questions: 10,
                use_search: false,
            },
            file_count: 1,
            total_size: 42,
            files: vec![FileSummary {
                name: "a.pdf".into(),
                size: 42,
            }],
        });
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"status\":\"processing\""));
        assert!(json.contains("\"fileCount\":1"));

        let back: ProcessingState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status(), "processing");
        assert!(!back.is_terminal());
    }
}
