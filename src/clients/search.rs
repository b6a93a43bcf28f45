// src/clients/search.rs

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::SearchConfig;

/// Name under which the search function is advertised to the model.
pub const SEARCH_TOOL_NAME: &str = "web_search";

/// Deadline for one search when none is configured.
pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Search request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Search API error: {0} - {1}")]
    Api(StatusCode, String),
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Runs one query and returns the provider's result list as JSON.
    async fn search(&self, query: &str) -> Result<Value, SearchError>;
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: &'static str,
    max_results: u32,
    include_answer: bool,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Value,
}

/// Tavily web search (`POST {base}/search`).
#[derive(Clone)]
pub struct TavilySearch {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl TavilySearch {
    pub fn new(api_key: impl Into<String>, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            endpoint: format!("{}/search", base_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl SearchProvider for TavilySearch {
    async fn search(&self, query: &str) -> Result<Value, SearchError> {
        let body = TavilyRequest {
            api_key: &self.api_key,
            query,
            search_depth: "advanced",
            max_results: 5,
            include_answer: true,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SearchError::Api(status, text));
        }

        let parsed: TavilyResponse = response.json().await?;
        Ok(parsed.results)
    }
}

#[derive(Debug, Deserialize)]
struct SearchArguments {
    query: String,
}

/// Tool adapter handed to the generator.
///
/// Never fails: a missing provider, bad arguments or a provider error all come
/// back as a small JSON error document the model can read and move past.
#[derive(Clone)]
pub struct SearchTool {
    provider: Option<Arc<dyn SearchProvider>>,
    timeout: Duration,
}

impl Default for SearchTool {
    fn default() -> Self {
        Self::new(None)
    }
}

impl SearchTool {
    pub fn new(provider: Option<Arc<dyn SearchProvider>>) -> Self {
        Self {
            provider,
            timeout: DEFAULT_SEARCH_TIMEOUT,
        }
    }

    /// Caps how long a single provider call may take.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        let provider = config.api_key.as_ref().map(|key| {
            Arc::new(TavilySearch::new(key.clone(), &config.base_url)) as Arc<dyn SearchProvider>
        });
        Self::new(provider).with_timeout(config.timeout)
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    /// Function-tool declaration sent with tool-enabled requests.
    pub fn definition() -> Value {
        json!({
            "type": "function",
            "function": {
                "name": SEARCH_TOOL_NAME,
                "description": "Search the web for recent information to make quiz questions more relevant and up to date. Use it for contemporary or evolving topics.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "The search query, e.g. 'Latest advancements in AI'"
                        }
                    },
                    "required": ["query"]
                }
            }
        })
    }

    /// Executes a tool call from its raw JSON argument string.
    pub async fn run(&self, arguments: &str) -> String {
        match serde_json::from_str::<SearchArguments>(arguments) {
            Ok(args) => self.search(&args.query).await,
            Err(e) => {
                tracing::warn!(error = %e, "Search tool called with malformed arguments");
                failure_payload("Search failed", &format!("Invalid tool arguments: {e}"))
            }
        }
    }

    pub async fn search(&self, query: &str) -> String {
        let Some(provider) = &self.provider else {
            tracing::info!("Search requested but no provider is configured");
            return failure_payload("Search unavailable", "No search provider is configured");
        };

        tracing::info!(query = %query, "Performing web search");
        match tokio::time::timeout(self.timeout, provider.search(query)).await {
            Ok(Ok(results)) => {
                tracing::info!("Web search complete");
                results.to_string()
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Web search failed");
                failure_payload("Search failed", &e.to_string())
            }
            Err(_) => {
                tracing::error!(timeout = ?self.timeout, "Web search timed out");
                failure_payload(
                    "Search failed",
                    &format!("Search timed out after {}ms", self.timeout.as_millis()),
                )
            }
        }
    }
}

fn failure_payload(error: &str, details: &str) -> String {
    json!({ "error": error, "details": details }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingProvider;

    #[async_trait]
    impl SearchProvider for FailingProvider {
        async fn search(&self, _query: &str) -> Result<Value, SearchError> {
            Err(SearchError::Api(
                StatusCode::INTERNAL_SERVER_ERROR,
                "boom".into(),
            ))
        }
    }

    struct FixedProvider;

    #[async_trait]
    impl SearchProvider for FixedProvider {
        async fn search(&self, query: &str) -> Result<Value, SearchError> {
            Ok(json!([{ "title": query, "url": "https://example.com" }]))
        }
    }

    struct StalledProvider;

    #[async_trait]
    impl SearchProvider for StalledProvider {
        async fn search(&self, _query: &str) -> Result<Value, SearchError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_stalled_provider_times_out_into_payload() {
        let tool = SearchTool::new(Some(Arc::new(StalledProvider)))
            .with_timeout(Duration::from_millis(20));
        let out: Value = serde_json::from_str(&tool.search("rust").await).unwrap();
        assert_eq!(out["error"], "Search failed");
        assert!(out["details"].as_str().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_unconfigured_tool_returns_unavailable_payload() {
        let tool = SearchTool::default();
        assert!(!tool.is_configured());
        let out: Value = serde_json::from_str(&tool.search("rust").await).unwrap();
        assert_eq!(out["error"], "Search unavailable");
    }

    #[tokio::test]
    async fn test_provider_error_becomes_payload() {
        let tool = SearchTool::new(Some(Arc::new(FailingProvider)));
        let out: Value = serde_json::from_str(&tool.run(r#"{"query":"rust"}"#).await).unwrap();
        assert_eq!(out["error"], "Search failed");
        assert!(out["details"].as_str().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn test_malformed_arguments_do_not_call_provider() {
        let tool = SearchTool::new(Some(Arc::new(FixedProvider)));
        let out: Value = serde_json::from_str(&tool.run("not json").await).unwrap();
        assert_eq!(out["error"], "Search failed");
    }

    #[tokio::test]
    async fn test_results_are_returned_as_json_text() {
        let tool = SearchTool::new(Some(Arc::new(FixedProvider)));
        let out: Value = serde_json::from_str(&tool.run(r#"{"query":"borrowck"}"#).await).unwrap();
        assert_eq!(out[0]["title"], "borrowck");
    }

    #[test]
    fn test_definition_names_the_tool() {
        let def = SearchTool::definition();
        assert_eq!(def["function"]["name"], SEARCH_TOOL_NAME);
        assert_eq!(def["function"]["parameters"]["required"][0], "query");
    }
}
