// src/services/lifecycle.rs

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    config::{QuizConfig, UploadConfig},
    error::AppError,
    models::{
        processing::{FileSummary, JobInfo, ProcessingState},
        quiz::{
            GenerationForm, GenerationOptions, PublicQuiz, Quiz, SourceFile, UploadedDocument,
        },
        submission::{ResultsLookup, SubmissionResponse, SubmissionResult},
    },
    services::{generator::QuizGenerator, scoring},
    store::{QuizStore, processing_key, quiz_key, results_key},
};

/// Owns every state transition keyed by a quiz id.
#[derive(Clone)]
pub struct QuizService {
    store: QuizStore,
    generator: Arc<QuizGenerator>,
    quiz: QuizConfig,
    upload: UploadConfig,
}

impl QuizService {
    pub fn new(
        store: QuizStore,
        generator: Arc<QuizGenerator>,
        quiz: QuizConfig,
        upload: UploadConfig,
    ) -> Self {
        Self {
            store,
            generator,
            quiz,
            upload,
        }
    }

    pub fn store(&self) -> &QuizStore {
        &self.store
    }

    pub fn search_configured(&self) -> bool {
        self.generator.search_configured()
    }

    /// Clamps the form's question bounds into the configured range.
    pub fn resolve_options(&self, form: GenerationForm) -> GenerationOptions {
        let (lo, hi) = (self.quiz.min_questions, self.quiz.max_questions);
        let min_questions = form.min_questions.unwrap_or(lo).clamp(lo, hi);
        let max_questions = form.max_questions.unwrap_or(hi).clamp(min_questions, hi);
        let language = form
            .language
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty() && l.len() <= 16)
            .unwrap_or_else(|| "en".to_string());

        GenerationOptions {
            language,
            include_explanations: form.include_explanations.unwrap_or(true),
            min_questions,
            max_questions,
            use_search: form.use_search,
        }
    }

    fn validate_upload(&self, documents: &[UploadedDocument]) -> Result<(), AppError> {
        if documents.is_empty() {
            return Err(AppError::bad_request(
                "FILES_REQUIRED",
                "At least one PDF file is required",
            ));
        }
        if documents.len() > self.upload.max_files {
            return Err(AppError::bad_request(
                "INVALID_FILE_COUNT",
                format!("Between 1 and {} files are allowed", self.upload.max_files),
            )
            .with_details(json!({
                "maxFiles": self.upload.max_files,
                "received": documents.len(),
            })));
        }

        for doc in documents {
            if !self.upload.allowed_file_types.contains(&doc.content_type) {
                return Err(AppError::UnsupportedMediaType {
                    message: format!("File {} is not an allowed type", doc.name),
                    details: json!({
                        "fileName": doc.name,
                        "receivedType": doc.content_type,
                        "allowedTypes": self.upload.allowed_file_types,
                    }),
                });
            }
            if doc.size() > self.upload.max_file_size {
                return Err(AppError::PayloadTooLarge {
                    message: format!("File {} exceeds the maximum file size", doc.name),
                    details: json!({
                        "fileName": doc.name,
                        "size": doc.size(),
                        "maxFileSize": self.upload.max_file_size,
                    }),
                });
            }
            if doc.size() == 0 {
                return Err(AppError::bad_request(
                    "INVALID_UPLOAD",
                    format!("File {} is empty", doc.name),
                ));
            }
        }
        Ok(())
    }

    /// Validates the upload, records the `uploaded` state and starts generation
    /// in the background. Returns as soon as the initial state is stored.
    pub async fn start_generation(
        &self,
        documents: Vec<UploadedDocument>,
        options: GenerationOptions,
    ) -> Result<Uuid, AppError> {
        self.validate_upload(&documents)?;

        let quiz_id = Uuid::new_v4();
        let uploaded_at = Utc::now();
        let job = JobInfo {
            started_at: uploaded_at,
            options: options.clone(),
            file_count: documents.len(),
            total_size: documents.iter().map(UploadedDocument::size).sum(),
            files: documents
                .iter()
                .map(|d| FileSummary {
                    name: d.name.clone(),
                    size: d.size(),
                })
                .collect(),
        };

        self.store
            .set_json(
                &processing_key(&quiz_id),
                &ProcessingState::Uploaded(job.clone()),
                self.quiz.processing_ttl,
            )
            .await?;

        info!(
            quiz_id = %quiz_id,
            files = documents.len(),
            total_size = job.total_size,
            use_search = options.use_search,
            "Quiz generation accepted"
        );

        let source_files = documents
            .iter()
            .map(|d| SourceFile {
                name: d.name.clone(),
                size: d.size(),
                content_type: d.content_type.clone(),
                uploaded_at,
            })
            .collect();

        let service = self.clone();
        tokio::spawn(async move {
            service
                .run_generation(quiz_id, documents, options, job, source_files)
                .await;
        });

        Ok(quiz_id)
    }

    /// Background job. Every outcome, including a panic inside generation,
    /// ends in a terminal processing state.
    async fn run_generation(
        self,
        quiz_id: Uuid,
        documents: Vec<UploadedDocument>,
        options: GenerationOptions,
        job: JobInfo,
        source_files: Vec<SourceFile>,
    ) {
        let key = processing_key(&quiz_id);
        if let Err(e) = self
            .store
            .set_json(&key, &ProcessingState::Processing(job), self.quiz.processing_ttl)
            .await
        {
            warn!(quiz_id = %quiz_id, error = %e, "Failed to mark quiz as processing");
        }

        let worker = self.clone();
        let outcome = tokio::spawn(async move {
            worker
                .generate_and_store(quiz_id, &documents, &options, source_files)
                .await
        })
        .await
        .unwrap_or_else(|e| Err(format!("Generation task aborted: {e}")));

        let state = match outcome {
            Ok(()) => {
                info!(quiz_id = %quiz_id, "Quiz generation completed");
                ProcessingState::Completed {
                    quiz_id,
                    completed_at: Utc::now(),
                }
            }
            Err(message) => {
                error!(quiz_id = %quiz_id, error = %message, "Quiz generation failed");
                ProcessingState::Failed {
                    error: message,
                    failed_at: Utc::now(),
                }
            }
        };

        if let Err(e) = self
            .store
            .set_json(&key, &state, self.quiz.status_retention)
            .await
        {
            error!(quiz_id = %quiz_id, error = %e, "Failed to record final processing state");
        }
    }

    async fn generate_and_store(
        &self,
        quiz_id: Uuid,
        documents: &[UploadedDocument],
        options: &GenerationOptions,
        source_files: Vec<SourceFile>,
    ) -> Result<(), String> {
        let generated = self
            .generator
            .generate(documents, options)
            .await
            .map_err(|e| format!("Quiz generation failed: {e}"))?;

        let quiz = generated.into_quiz(quiz_id, source_files);
        self.store
            .set_json(&quiz_key(&quiz_id), &quiz, self.quiz.ttl)
            .await
            .map_err(|e| format!("Failed to store quiz: {e}"))
    }

    pub async fn get_processing_state(&self, quiz_id: &Uuid) -> Result<ProcessingState, AppError> {
        self.store
            .get_json(&processing_key(quiz_id))
            .await?
            .ok_or_else(|| {
                AppError::not_found("STATUS_NOT_FOUND", "Processing status not found or expired")
            })
    }

    async fn load_quiz(&self, quiz_id: &Uuid) -> Result<Quiz, AppError> {
        self.store
            .get_json(&quiz_key(quiz_id))
            .await?
            .ok_or_else(|| AppError::not_found("QUIZ_NOT_FOUND", "Quiz not found or has expired"))
    }

    /// The quiz with answers and explanations removed.
    pub async fn get_quiz(&self, quiz_id: &Uuid) -> Result<PublicQuiz, AppError> {
        let quiz = self.load_quiz(quiz_id).await?;
        Ok(PublicQuiz::from(&quiz))
    }

    /// Scores the single allowed attempt. A second attempt, including one that
    /// loses a concurrent race, gets `QUIZ_ALREADY_SUBMITTED` with the stored summary.
    pub async fn submit(
        &self,
        quiz_id: &Uuid,
        answers: &[Option<i64>],
        time_taken: Option<u64>,
    ) -> Result<SubmissionResponse, AppError> {
        let quiz = self.load_quiz(quiz_id).await?;
        let key = results_key(quiz_id);

        if let Some(existing) = self.store.get_json::<SubmissionResult>(&key).await? {
            return Err(already_submitted(&existing));
        }

        if answers.len() != quiz.questions.len() {
            return Err(AppError::bad_request(
                "ANSWER_COUNT_MISMATCH",
                format!(
                    "Expected {} answers, received {}",
                    quiz.questions.len(),
                    answers.len()
                ),
            )
            .with_details(json!({
                "expected": quiz.questions.len(),
                "received": answers.len(),
            })));
        }

        let result = scoring::score(&quiz, answers, time_taken, Utc::now());

        if !self
            .store
            .set_json_if_absent(&key, &result, self.quiz.ttl)
            .await?
        {
            warn!(quiz_id = %quiz_id, "Concurrent submission detected");
            return Err(match self.store.get_json::<SubmissionResult>(&key).await? {
                Some(winner) => already_submitted(&winner),
                None => AppError::conflict(
                    "QUIZ_ALREADY_SUBMITTED",
                    "This quiz has already been submitted",
                ),
            });
        }

        info!(
            quiz_id = %quiz_id,
            score = result.score,
            total = result.total_questions,
            percentage = result.percentage,
            "Quiz submitted"
        );

        Ok(SubmissionResponse {
            suggestions: scoring::suggestions(result.percentage),
            result,
        })
    }

    pub async fn get_results(&self, quiz_id: &Uuid) -> Result<ResultsLookup, AppError> {
        let result = self.store.get_json(&results_key(quiz_id)).await?;
        Ok(ResultsLookup::from_option(result))
    }
}

fn already_submitted(existing: &SubmissionResult) -> AppError {
    AppError::conflict(
        "QUIZ_ALREADY_SUBMITTED",
        "This quiz has already been submitted",
    )
    .with_details(json!({
        "quizId": existing.quiz_id,
        "submittedAt": existing.submitted_at,
        "score": format!("{}/{}", existing.correct_answers, existing.total_questions),
        "percentage": format!("{}%", existing.percentage),
    }))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        clients::{
            CompletionError, CompletionProvider, ScriptedCompletion, SearchTool,
            completion::{ChatRequest, ChatResponse},
        },
        config::AiConfig,
        store::MemoryStore,
    };
    use async_trait::async_trait;
    use bytes::Bytes;

    /// A provider that never answers, leaving the job in `processing`.
    struct StalledCompletion;

    #[async_trait]
    impl CompletionProvider for StalledCompletion {
        async fn complete(&self, _request: &ChatRequest) -> Result<ChatResponse, CompletionError> {
            std::future::pending().await
        }
    }

    fn ai_config() -> AiConfig {
        AiConfig {
            api_key: "test".into(),
            base_url: "http://localhost".into(),
            model: "test-model".into(),
            pdf_engine: "native".into(),
            temperature: 0.3,
            max_tokens: 4000,
            timeout: Duration::from_secs(5),
            max_retries: 0,
            retry_base_delay: Duration::from_millis(1),
        }
    }

    fn quiz_config() -> QuizConfig {
        QuizConfig {
            min_questions: 5,
            max_questions: 50,
            ttl: Duration::from_secs(3600),
            processing_ttl: Duration::from_secs(300),
            status_retention: Duration::from_secs(60),
        }
    }

    fn service(completion: ScriptedCompletion) -> QuizService {
        service_with(Arc::new(completion), quiz_config())
    }

    fn service_with(completion: Arc<dyn CompletionProvider>, quiz: QuizConfig) -> QuizService {
        let generator = QuizGenerator::new(completion, SearchTool::default(), &ai_config());
        QuizService::new(
            QuizStore::new(Arc::new(MemoryStore::new())),
            Arc::new(generator),
            quiz,
            UploadConfig {
                max_file_size: 1024,
                max_files: 2,
                allowed_file_types: vec!["application/pdf".into()],
            },
        )
    }

    fn pdf(name: &str, len: usize) -> UploadedDocument {
        UploadedDocument {
            name: name.into(),
            content_type: "application/pdf".into(),
            data: Bytes::from(vec![b'%'; len]),
        }
    }

    fn quiz_json() -> String {
        json!({
            "quiz": {
                "title": "Traits",
                "description": "Trait objects",
                "questions": [
                    {"id": "q1", "question": "Q one?", "options": ["a", "b", "c", "d"], "correctAnswer": 0},
                    {"id": "q2", "question": "Q two?", "options": ["a", "b", "c", "d"], "correctAnswer": 1},
                    {"id": "q3", "question": "Q three?", "options": ["a", "b", "c", "d"], "correctAnswer": 2}
                ]
            }
        })
        .to_string()
    }

    async fn wait_for_terminal(svc: &QuizService, id: &Uuid) -> ProcessingState {
        for _ in 0..100 {
            let state = svc.get_processing_state(id).await.unwrap();
            if state.is_terminal() {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("generation did not finish");
    }

    #[test]
    fn test_resolve_options_clamps_bounds() {
        let svc = service(ScriptedCompletion::new());
        let opts = svc.resolve_options(GenerationForm {
            min_questions: Some(1),
            max_questions: Some(500),
            ..Default::default()
        });
        assert_eq!(opts.min_questions, 5);
        assert_eq!(opts.max_questions, 50);
        assert_eq!(opts.language, "en");
        assert!(opts.include_explanations);

        let opts = svc.resolve_options(GenerationForm {
            min_questions: Some(20),
            max_questions: Some(10),
            ..Default::default()
        });
        assert_eq!((opts.min_questions, opts.max_questions), (20, 20));
    }

    #[tokio::test]
    async fn test_upload_validation_codes() {
        let svc = service(ScriptedCompletion::new());
        let opts = svc.resolve_options(GenerationForm::default());

        let err = svc.start_generation(vec![], opts.clone()).await.unwrap_err();
        assert_eq!(err.code(), "FILES_REQUIRED");

        let three = vec![pdf("a.pdf", 1), pdf("b.pdf", 1), pdf("c.pdf", 1)];
        let err = svc.start_generation(three, opts.clone()).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_FILE_COUNT");

        let mut text = pdf("a.txt", 1);
        text.content_type = "text/plain".into();
        let err = svc.start_generation(vec![text], opts.clone()).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_FILE_TYPE");

        let err = svc
            .start_generation(vec![pdf("big.pdf", 2048)], opts)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "FILE_TOO_LARGE");
    }

    #[tokio::test]
    async fn test_generation_then_single_submission() {
        let svc = service(ScriptedCompletion::new().with_content(quiz_json()));
        let opts = svc.resolve_options(GenerationForm::default());
        let id = svc.start_generation(vec![pdf("a.pdf", 10)], opts).await.unwrap();

        let state = wait_for_terminal(&svc, &id).await;
        assert_eq!(state.status(), "completed");

        let public = svc.get_quiz(&id).await.unwrap();
        assert_eq!(public.questions.len(), 3);
        assert_eq!(public.metadata.total_questions, 3);

        let response = svc
            .submit(&id, &[Some(0), Some(1), Some(3)], Some(20))
            .await
            .unwrap();
        assert_eq!(response.result.percentage, 67);

        let err = svc.submit(&id, &[Some(0), Some(1), Some(2)], None).await.unwrap_err();
        assert_eq!(err.code(), "QUIZ_ALREADY_SUBMITTED");

        let lookup = svc.get_results(&id).await.unwrap();
        assert!(lookup.found);
        assert_eq!(lookup.result.unwrap().correct_answers, 2);
    }

    #[tokio::test]
    async fn test_failed_generation_is_recorded() {
        let svc = service(ScriptedCompletion::new().with_content("not a quiz"));
        let opts = svc.resolve_options(GenerationForm::default());
        let id = svc.start_generation(vec![pdf("a.pdf", 10)], opts).await.unwrap();

        match wait_for_terminal(&svc, &id).await {
            ProcessingState::Failed { error, .. } => {
                assert!(error.starts_with("Quiz generation failed"))
            }
            other => panic!("unexpected state: {other:?}"),
        }
        assert_eq!(svc.get_quiz(&id).await.unwrap_err().code(), "QUIZ_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_concurrent_submissions_score_once() {
        let svc = service(ScriptedCompletion::new().with_content(quiz_json()));
        let opts = svc.resolve_options(GenerationForm::default());
        let id = svc.start_generation(vec![pdf("a.pdf", 10)], opts).await.unwrap();
        wait_for_terminal(&svc, &id).await;

        let mut handles = Vec::new();
        for i in 0..8 {
            let svc = svc.clone();
            handles.push(tokio::spawn(async move {
                svc.submit(&id, &[Some(i % 4), Some(1), Some(2)], None).await
            }));
        }

        let mut ok = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(e) => assert_eq!(e.code(), "QUIZ_ALREADY_SUBMITTED"),
            }
        }
        assert_eq!(ok, 1);
    }

    #[tokio::test]
    async fn test_answer_count_mismatch() {
        let svc = service(ScriptedCompletion::new().with_content(quiz_json()));
        let opts = svc.resolve_options(GenerationForm::default());
        let id = svc.start_generation(vec![pdf("a.pdf", 10)], opts).await.unwrap();
        wait_for_terminal(&svc, &id).await;

        let err = svc.submit(&id, &[Some(0)], None).await.unwrap_err();
        assert_eq!(err.code(), "ANSWER_COUNT_MISMATCH");
        assert!(!svc.get_results(&id).await.unwrap().found);
    }

    #[tokio::test]
    async fn test_stuck_processing_state_expires() {
        let svc = service_with(
            Arc::new(StalledCompletion),
            QuizConfig {
                processing_ttl: Duration::from_millis(200),
                ..quiz_config()
            },
        );
        let opts = svc.resolve_options(GenerationForm::default());
        let id = svc.start_generation(vec![pdf("a.pdf", 10)], opts).await.unwrap();

        let state = svc.get_processing_state(&id).await.unwrap();
        assert!(!state.is_terminal());

        tokio::time::sleep(Duration::from_millis(400)).await;
        let err = svc.get_processing_state(&id).await.unwrap_err();
        assert_eq!(err.code(), "STATUS_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_terminal_state_expires_after_retention() {
        let svc = service_with(
            Arc::new(ScriptedCompletion::new().with_content("not a quiz")),
            QuizConfig {
                status_retention: Duration::from_millis(100),
                ..quiz_config()
            },
        );
        let opts = svc.resolve_options(GenerationForm::default());
        let id = svc.start_generation(vec![pdf("a.pdf", 10)], opts).await.unwrap();
        assert_eq!(wait_for_terminal(&svc, &id).await.status(), "failed");

        tokio::time::sleep(Duration::from_millis(300)).await;
        let err = svc.get_processing_state(&id).await.unwrap_err();
        assert_eq!(err.code(), "STATUS_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_empty_answers_follow_submission_order() {
        let svc = service(ScriptedCompletion::new().with_content(quiz_json()));
        let opts = svc.resolve_options(GenerationForm::default());
        let id = svc.start_generation(vec![pdf("a.pdf", 10)], opts).await.unwrap();
        wait_for_terminal(&svc, &id).await;

        let err = svc.submit(&id, &[], None).await.unwrap_err();
        assert_eq!(err.code(), "ANSWER_COUNT_MISMATCH");

        svc.submit(&id, &[Some(0), Some(1), Some(2)], None).await.unwrap();
        let err = svc.submit(&id, &[], None).await.unwrap_err();
        assert_eq!(err.code(), "QUIZ_ALREADY_SUBMITTED");
    }
}
