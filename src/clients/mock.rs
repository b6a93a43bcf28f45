use std::{
    collections::VecDeque,
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;

use super::completion::{
    ChatRequest, ChatResponse, CompletionError, CompletionProvider, FunctionCall, ToolCall,
};

/// Deterministic provider for tests: replays queued replies in order and
/// records every request it receives.
#[derive(Default)]
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<Result<ChatResponse, CompletionError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content(self, content: impl Into<String>) -> Self {
        self.push(Ok(ChatResponse::from_content(content)))
    }

    pub fn with_tool_call(self, id: &str, name: &str, arguments: &str) -> Self {
        self.push(Ok(ChatResponse::from_tool_calls(vec![ToolCall {
            id: id.to_string(),
            kind: "function".to_string(),
            function: FunctionCall {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        }])))
    }

    pub fn with_error(self, err: CompletionError) -> Self {
        self.push(Err(err))
    }

    fn push(self, reply: Result<ChatResponse, CompletionError>) -> Self {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
        self
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedCompletion {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, CompletionError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| {
                Err(CompletionError::InvalidResponse(
                    "No scripted reply left".to_string(),
                ))
            })
    }
}
