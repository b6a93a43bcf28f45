// src/models/quiz.rs

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::question::{PublicQuestion, Question};

/// A generated quiz as persisted in the store. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub questions: Vec<Question>,
    pub metadata: QuizMetadata,
    pub created_at: DateTime<Utc>,
    pub source_files: Vec<SourceFile>,
}

/// Derived facts about a quiz. Counts are recomputed, never taken from model output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizMetadata {
    pub total_questions: usize,
    /// Minutes.
    pub estimated_duration: u32,
    pub topics: Vec<String>,
    pub source_files: Vec<String>,
    pub pdf_count: usize,
    /// Total bytes across all source documents.
    pub pdf_size: usize,
    pub generated_at: DateTime<Utc>,
    pub model: String,
    pub pdf_processing_engine: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFile {
    pub name: String,
    pub size: usize,
    #[serde(rename = "type")]
    pub content_type: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Quiz body produced by the generator, before an id and source files are attached.
#[derive(Debug, Clone)]
pub struct GeneratedQuiz {
    pub title: String,
    pub description: String,
    pub questions: Vec<Question>,
    pub metadata: QuizMetadata,
    /// Repairs applied to model output (clamped answers, dropped questions).
    pub warnings: Vec<String>,
}

impl GeneratedQuiz {
    pub fn into_quiz(self, id: Uuid, source_files: Vec<SourceFile>) -> Quiz {
        Quiz {
            id,
            title: self.title,
            description: self.description,
            questions: self.questions,
            metadata: self.metadata,
            created_at: Utc::now(),
            source_files,
        }
    }
}

/// The quiz as served to the quiz taker: answers and explanations removed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuiz {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub questions: Vec<PublicQuestion>,
    pub metadata: QuizMetadata,
    pub created_at: DateTime<Utc>,
    pub source_files: Vec<SourceFile>,
}

impl From<&Quiz> for PublicQuiz {
    fn from(quiz: &Quiz) -> Self {
        Self {
            id: quiz.id,
            title: quiz.title.clone(),
            description: quiz.description.clone(),
            questions: quiz.questions.iter().map(PublicQuestion::from).collect(),
            metadata: quiz.metadata.clone(),
            created_at: quiz.created_at,
            source_files: quiz.source_files.clone(),
        }
    }
}

/// Options controlling a single generation job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOptions {
    pub language: String,
    pub include_explanations: bool,
    pub min_questions: u32,
    pub max_questions: u32,
    pub use_search: bool,
}

/// Raw generation options from the upload form, before clamping to configured bounds.
#[derive(Debug, Clone, Default)]
pub struct GenerationForm {
    pub use_search: bool,
    pub language: Option<String>,
    pub include_explanations: Option<bool>,
    pub min_questions: Option<u32>,
    pub max_questions: Option<u32>,
}

/// One uploaded document held in memory for the lifetime of its generation job.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl UploadedDocument {
    pub fn size(&self) -> usize {
        self.data.len()
    }
}
