// src/state.rs

use std::{sync::Arc, time::Instant};

use axum::extract::FromRef;

use crate::{
    clients::{CompletionProvider, SearchTool},
    config::Config,
    services::{generator::QuizGenerator, lifecycle::QuizService},
    store::{KvStore, QuizStore},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub quizzes: QuizService,
    pub started_at: Instant,
}

impl AppState {
    /// Wires the services once at startup. The store and completion provider
    /// are injected so tests can swap them.
    pub fn new(
        config: Config,
        store: Arc<dyn KvStore>,
        completion: Arc<dyn CompletionProvider>,
    ) -> Self {
        let search = SearchTool::from_config(&config.search);
        let generator = QuizGenerator::new(completion, search, &config.ai);
        let quizzes = QuizService::new(
            QuizStore::new(store),
            Arc::new(generator),
            config.quiz.clone(),
            config.upload.clone(),
        );

        Self {
            config,
            quizzes,
            started_at: Instant::now(),
        }
    }
}

impl FromRef<AppState> for QuizService {
    fn from_ref(state: &AppState) -> Self {
        state.quizzes.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
