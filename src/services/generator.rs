// src/services/generator.rs

use std::{collections::HashSet, sync::Arc};

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::Utc;
use serde_json::{Map, Value, json};
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::{
    clients::{
        completion::{
            ChatMessage, ChatRequest, CompletionError, CompletionProvider, ContentPart,
            FileAttachment,
        },
        search::{SEARCH_TOOL_NAME, SearchTool},
    },
    config::AiConfig,
    models::{
        question::{MAX_ID_LEN, OPTION_COUNT, Question},
        quiz::{GeneratedQuiz, GenerationOptions, QuizMetadata, UploadedDocument},
    },
    services::prompt,
    utils::json::{ModelOutputError, parse_model_json, unwrap_quiz},
};

const DEFAULT_TITLE: &str = "Generated Quiz";
const TOP_P: f32 = 0.9;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("No documents were supplied")]
    NoDocuments,

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("Model returned an empty message")]
    EmptyContent,

    #[error(transparent)]
    Output(#[from] ModelOutputError),

    #[error("Generated quiz contains no valid questions")]
    NoValidQuestions,
}

/// Turns documents into a validated quiz through the completion provider.
pub struct QuizGenerator {
    completion: Arc<dyn CompletionProvider>,
    search: SearchTool,
    model: String,
    pdf_engine: String,
    temperature: f32,
    max_tokens: u32,
}

impl QuizGenerator {
    pub fn new(completion: Arc<dyn CompletionProvider>, search: SearchTool, ai: &AiConfig) -> Self {
        Self {
            completion,
            search,
            model: ai.model.clone(),
            pdf_engine: ai.pdf_engine.clone(),
            temperature: ai.temperature,
            max_tokens: ai.max_tokens,
        }
    }

    pub fn search_configured(&self) -> bool {
        self.search.is_configured()
    }

    #[instrument(skip_all, fields(documents = documents.len(), use_search = options.use_search))]
    pub async fn generate(
        &self,
        documents: &[UploadedDocument],
        options: &GenerationOptions,
    ) -> Result<GeneratedQuiz, GenerationError> {
        if documents.is_empty() {
            return Err(GenerationError::NoDocuments);
        }
        info!(model = %self.model, "Generating quiz");

        let mut messages = vec![
            ChatMessage::system(prompt::system_prompt(options, Utc::now())),
            ChatMessage::user(encode_documents(documents)),
        ];

        if options.use_search {
            let first = self
                .completion
                .complete(&self.request(messages.clone(), false))
                .await?
                .into_first_message()?;

            let calls = first.tool_calls();
            if calls.is_empty() {
                info!("Model did not request a search, asking for the structured quiz");
            } else {
                info!(calls = calls.len(), "Model requested tool calls");
                messages.push(first.to_message());
                for call in calls {
                    let output = if call.function.name == SEARCH_TOOL_NAME {
                        self.search.run(&call.function.arguments).await
                    } else {
                        warn!(tool = %call.function.name, "Model called an unknown tool");
                        json!({ "error": "Unknown tool", "details": call.function.name })
                            .to_string()
                    };
                    messages.push(ChatMessage::tool(&call.id, &call.function.name, output));
                }
            }
        }

        let reply = self
            .completion
            .complete(&self.request(messages, true))
            .await?
            .into_first_message()?;
        let content = reply
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or(GenerationError::EmptyContent)?;

        let quiz = unwrap_quiz(parse_model_json(&content)?)?;
        let generated = self.normalize(quiz, documents)?;

        for warning in &generated.warnings {
            warn!("{}", warning);
        }
        info!(
            questions = generated.questions.len(),
            documents = documents.len(),
            "Quiz generated"
        );
        Ok(generated)
    }

    /// `structured` demands the quiz schema with tools off; otherwise tools are
    /// offered and the reply shape is left open.
    fn request(&self, messages: Vec<ChatMessage>, structured: bool) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages,
            response_format: structured.then(prompt::quiz_response_format),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            top_p: TOP_P,
            plugins: vec![json!({ "id": "file-parser", "pdf": { "engine": self.pdf_engine } })],
            tools: (!structured).then(|| vec![SearchTool::definition()]),
            tool_choice: (!structured).then(|| "auto".to_string()),
        }
    }

    fn normalize(
        &self,
        quiz: Value,
        documents: &[UploadedDocument],
    ) -> Result<GeneratedQuiz, GenerationError> {
        let mut warnings = Vec::new();
        let empty = Map::new();
        let obj = quiz.as_object().unwrap_or(&empty);

        let raw_questions = obj
            .get("questions")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let questions = normalize_questions(raw_questions, &mut warnings);
        if questions.is_empty() {
            return Err(GenerationError::NoValidQuestions);
        }

        let model_meta = obj.get("metadata").and_then(Value::as_object);
        let estimated_duration = model_meta
            .and_then(|m| m.get("estimatedDuration"))
            .and_then(Value::as_u64)
            .filter(|d| *d > 0)
            .map(|d| d as u32)
            .unwrap_or_else(|| default_duration(questions.len()));

        let mut topics: Vec<String> = model_meta
            .and_then(|m| m.get("topics"))
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if topics.is_empty() {
            for topic in questions.iter().filter_map(|q| q.topic.as_ref()) {
                if !topics.contains(topic) {
                    topics.push(topic.clone());
                }
            }
        }

        let metadata = QuizMetadata {
            total_questions: questions.len(),
            estimated_duration,
            topics,
            source_files: documents.iter().map(|d| d.name.clone()).collect(),
            pdf_count: documents.len(),
            pdf_size: documents.iter().map(UploadedDocument::size).sum(),
            generated_at: Utc::now(),
            model: self.model.clone(),
            pdf_processing_engine: self.pdf_engine.clone(),
        };

        Ok(GeneratedQuiz {
            title: text_field(obj, "title").unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            description: text_field(obj, "description").unwrap_or_default(),
            questions,
            metadata,
            warnings,
        })
    }
}

/// One user turn: the instruction followed by one file part per document.
fn encode_documents(documents: &[UploadedDocument]) -> Vec<ContentPart> {
    let mut parts = vec![ContentPart::text(prompt::USER_INSTRUCTION)];
    parts.extend(documents.iter().enumerate().map(|(i, doc)| ContentPart::File {
        file: FileAttachment {
            filename: format!("document{}.pdf", i + 1),
            file_data: format!("data:application/pdf;base64,{}", STANDARD.encode(&doc.data)),
        },
    }));
    parts
}

/// Estimated minutes to complete a quiz of `count` questions.
pub fn default_duration(count: usize) -> u32 {
    (count as u32 + 2).max(5)
}

fn text_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Coerces the model's answer index to an integer; strings like `"2"` are accepted.
fn answer_index(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Builds typed questions from model output. Ids are filled in and made unique,
/// out-of-range answers fall back to 0, and anything failing validation is dropped.
/// Every repair is recorded in `warnings`.
pub fn normalize_questions(raw: &[Value], warnings: &mut Vec<String>) -> Vec<Question> {
    let mut seen_ids = HashSet::new();
    let mut questions = Vec::with_capacity(raw.len());
    let empty = Map::new();

    for (index, item) in raw.iter().enumerate() {
        let obj = item.as_object().unwrap_or(&empty);
        let position = index + 1;

        let mut id = match text_field(obj, "id") {
            Some(id) if id.chars().count() <= MAX_ID_LEN => id,
            Some(_) => {
                warnings.push(format!(
                    "Question id at position {position} exceeds {MAX_ID_LEN} characters, renamed to q{position}"
                ));
                format!("q{position}")
            }
            None => format!("q{position}"),
        };
        if seen_ids.contains(&id) {
            let mut candidate = format!("q{position}");
            let mut suffix = 1;
            while seen_ids.contains(&candidate) {
                suffix += 1;
                candidate = format!("q{position}_{suffix}");
            }
            warnings.push(format!("Duplicate question id {id}, renamed to {candidate}"));
            id = candidate;
        }

        let correct_answer = match answer_index(obj.get("correctAnswer")) {
            Some(index) if (0..OPTION_COUNT as i64).contains(&index) => index as u8,
            other => {
                let shown = other.map_or_else(|| "missing".to_string(), |v| v.to_string());
                warnings.push(format!(
                    "Invalid correctAnswer ({shown}) for question {id}, defaulting to 0"
                ));
                0
            }
        };

        let options = obj
            .get("options")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .map(|o| match o {
                        Value::String(s) => s.trim().to_string(),
                        other => other.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let question = Question {
            id,
            question: text_field(obj, "question").unwrap_or_default(),
            options,
            correct_answer,
            explanation: text_field(obj, "explanation"),
            topic: text_field(obj, "topic"),
        };

        if let Err(e) = question.validate() {
            warnings.push(format!("Dropping invalid question {}: {e}", question.id));
            continue;
        }
        seen_ids.insert(question.id.clone());
        questions.push(question);
    }

    questions
}
