// src/handlers/quiz.rs

use axum::{
    Json,
    extract::{
        Multipart, Path, State,
        multipart::{Field, MultipartError},
        rejection::JsonRejection,
    },
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        quiz::{GenerationForm, UploadedDocument},
        response::success,
        submission::SubmitQuizRequest,
    },
    services::lifecycle::QuizService,
};

/// Form field carrying the uploaded documents.
const FILE_FIELD: &str = "pdfs";

/// Accepts canonical hyphenated UUIDs only.
fn parse_quiz_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::try_parse(raw)
        .ok()
        .filter(|_| raw.len() == 36)
        .ok_or_else(|| AppError::bad_request("INVALID_QUIZ_ID", "Quiz ID must be a valid UUID"))
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge {
            message: "Upload exceeds the maximum allowed size".to_string(),
            details: json!({}),
        }
    } else {
        AppError::bad_request("INVALID_UPLOAD", format!("Malformed upload: {}", err.body_text()))
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "on" | "yes")
}

async fn field_text(field: Field<'_>) -> Result<String, AppError> {
    field.text().await.map_err(multipart_error)
}

/// Starts quiz generation from uploaded PDFs.
///
/// * Reads files from the `pdfs` field plus optional option fields
///   (`useSearch`, `language`, `includeExplanations`, `minQuestions`, `maxQuestions`).
/// * Responds `202 Accepted` with the new quiz id; generation continues in the
///   background and is observed through the processing endpoint.
pub async fn generate_quiz(
    State(service): State<QuizService>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut documents = Vec::new();
    let mut form = GenerationForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        match name.as_str() {
            FILE_FIELD => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("document{}.pdf", documents.len() + 1));
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                let data = field.bytes().await.map_err(multipart_error)?;
                documents.push(UploadedDocument {
                    name: file_name,
                    content_type,
                    data,
                });
            }
            "useSearch" => form.use_search = parse_flag(&field_text(field).await?),
            "language" => form.language = Some(field_text(field).await?),
            "includeExplanations" => {
                form.include_explanations = Some(parse_flag(&field_text(field).await?))
            }
            "minQuestions" => form.min_questions = field_text(field).await?.trim().parse().ok(),
            "maxQuestions" => form.max_questions = field_text(field).await?.trim().parse().ok(),
            other => tracing::debug!(field = %other, "Ignoring unknown upload field"),
        }
    }

    let options = service.resolve_options(form);
    let quiz_id = service.start_generation(documents, options).await?;

    Ok((
        StatusCode::ACCEPTED,
        success(
            json!({ "quizId": quiz_id }),
            "Quiz generation started. Poll the processing endpoint for status.",
        ),
    ))
}

/// Returns the processing status of a generation job.
pub async fn get_processing_status(
    State(service): State<QuizService>,
    Path(quiz_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let quiz_id = parse_quiz_id(&quiz_id)?;
    let state = service.get_processing_state(&quiz_id).await?;
    Ok(success(state, "Processing status retrieved"))
}

/// Returns a quiz for taking: answers and explanations are stripped.
pub async fn get_quiz(
    State(service): State<QuizService>,
    Path(quiz_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let quiz_id = parse_quiz_id(&quiz_id)?;
    let quiz = service.get_quiz(&quiz_id).await?;
    Ok(success(quiz, "Quiz retrieved successfully"))
}

/// Scores the single allowed submission for a quiz.
pub async fn submit_quiz(
    State(service): State<QuizService>,
    Path(quiz_id): Path<String>,
    payload: Result<Json<SubmitQuizRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let quiz_id = parse_quiz_id(&quiz_id)?;

    let Json(req) = payload.map_err(|rejection| {
        AppError::bad_request("INVALID_SUBMISSION", "Submission body is invalid")
            .with_details(json!({ "reason": rejection.body_text() }))
    })?;
    req.validate().map_err(|e| {
        AppError::bad_request("INVALID_SUBMISSION", "Submission body is invalid")
            .with_details(json!({ "reason": e.to_string() }))
    })?;

    let response = service
        .submit(&quiz_id, &req.answers, req.time_taken)
        .await?;
    Ok(success(response, "Quiz submitted successfully"))
}

/// Returns the stored result, or `{found: false}` when nothing was submitted yet.
pub async fn get_results(
    State(service): State<QuizService>,
    Path(quiz_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let quiz_id = parse_quiz_id(&quiz_id)?;
    let lookup = service.get_results(&quiz_id).await?;
    let message = if lookup.found {
        "Results retrieved successfully"
    } else {
        "No results found for this quiz"
    };
    Ok(success(lookup, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quiz_id() {
        let id = Uuid::new_v4();
        assert_eq!(parse_quiz_id(&id.to_string()).unwrap(), id);
        assert_eq!(parse_quiz_id("abc").unwrap_err().code(), "INVALID_QUIZ_ID");
        assert!(parse_quiz_id(&id.simple().to_string()).is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" On "));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(""));
    }
}
