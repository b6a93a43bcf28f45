// src/clients/completion.rs

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::config::AiConfig;

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("AI request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Network error while calling AI provider: {0}")]
    Network(String),

    #[error("AI provider error: {status} - {message}")]
    Api { status: StatusCode, message: String },

    #[error("Invalid response from AI provider: {0}")]
    InvalidResponse(String),
}

impl CompletionError {
    /// Timeouts, network failures and 5xx replies are worth another attempt.
    /// Everything else (bad request, auth, schema rejection) is final.
    pub fn is_transient(&self) -> bool {
        match self {
            CompletionError::Timeout(_) | CompletionError::Network(_) => true,
            CompletionError::Api { status, .. } => status.is_server_error(),
            CompletionError::InvalidResponse(_) => false,
        }
    }
}

/// One turn of a chat conversation, tagged by `role` on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    System {
        content: String,
    },
    User {
        content: Vec<ContentPart>,
    },
    Assistant {
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        name: String,
        content: String,
    },
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage::System {
            content: content.into(),
        }
    }

    pub fn user(content: Vec<ContentPart>) -> Self {
        ChatMessage::User { content }
    }

    pub fn tool(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        ChatMessage::Tool {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPart {
    Text { text: String },
    File { file: FileAttachment },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, ContentPart::File { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileAttachment {
    pub filename: String,
    /// `data:<mime>;base64,<payload>`
    pub file_data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments, exactly as the model produced them.
    pub arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

/// Body of a `/chat/completions` request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<Value>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
}

impl ChatRequest {
    fn attachment_count(&self) -> usize {
        self.messages
            .iter()
            .map(|m| match m {
                ChatMessage::User { content } => content.iter().filter(|p| p.is_file()).count(),
                _ => 0,
            })
            .sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub model: Option<String>,
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub message: AssistantMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl AssistantMessage {
    pub fn tool_calls(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or_default()
    }

    /// Re-encodes this reply as a conversation turn.
    pub fn to_message(&self) -> ChatMessage {
        ChatMessage::Assistant {
            content: self.content.clone(),
            tool_calls: self.tool_calls().to_vec(),
        }
    }
}

impl ChatResponse {
    pub fn from_content(content: impl Into<String>) -> Self {
        Self::from_message(AssistantMessage {
            content: Some(content.into()),
            tool_calls: None,
        })
    }

    pub fn from_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self::from_message(AssistantMessage {
            content: None,
            tool_calls: Some(calls),
        })
    }

    fn from_message(message: AssistantMessage) -> Self {
        Self {
            model: None,
            choices: vec![ChatChoice {
                message,
                finish_reason: None,
            }],
        }
    }

    pub fn into_first_message(self) -> Result<AssistantMessage, CompletionError> {
        self.choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| CompletionError::InvalidResponse("No choices in response".to_string()))
    }
}

/// Anything that can answer a chat completion request.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, CompletionError>;
}

/// OpenAI-compatible `/chat/completions` client with timeout and retry.
#[derive(Clone)]
pub struct ChatCompletionClient {
    client: Client,
    api_key: String,
    endpoint: String,
    timeout: Duration,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl ChatCompletionClient {
    pub fn new(config: &AiConfig) -> Self {
        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        info!(model = %config.model, endpoint = %endpoint, "Creating chat completion client");
        Self {
            client: Client::new(),
            api_key: config.api_key.clone(),
            endpoint,
            timeout: config.timeout,
            max_retries: config.max_retries,
            retry_base_delay: config.retry_base_delay,
        }
    }

    /// Single attempt. Dropping the request future on timeout aborts the call.
    async fn send_once(&self, request: &ChatRequest) -> Result<ChatResponse, CompletionError> {
        let call = async {
            let response = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(request)
                .send()
                .await
                .map_err(|e| CompletionError::Network(e.to_string()))?;

            let status = response.status();
            debug!(status = %status, "Received response from AI provider");

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = provider_error_message(&body).unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("Unknown error")
                        .to_string()
                });
                return Err(CompletionError::Api { status, message });
            }

            response
                .json::<ChatResponse>()
                .await
                .map_err(|e| CompletionError::InvalidResponse(e.to_string()))
        };

        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| CompletionError::Timeout(self.timeout))?
    }
}

/// Pulls `error.message` out of a provider error body when present.
fn provider_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/error/message")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl CompletionProvider for ChatCompletionClient {
    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, CompletionError> {
        // Document payloads are never logged, only their count.
        debug!(
            messages = request.messages.len(),
            attachments = request.attachment_count(),
            tools = request.tools.is_some(),
            structured = request.response_format.is_some(),
            "Sending chat completion request"
        );

        let mut attempt = 0;
        loop {
            match self.send_once(request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = self.retry_base_delay * 2u32.pow(attempt);
                    attempt += 1;
                    warn!(
                        error = %e,
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "AI request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(error = %e, attempts = attempt + 1, "AI request failed");
                    return Err(e);
                }
            }
        }
    }
}
