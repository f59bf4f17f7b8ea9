//! HTTP-backed capability adapters.
//!
//! - [`HttpTextGenerator`] speaks the OpenAI-compatible chat completions API.
//! - [`HttpSearchProvider`] posts `{query, num_results}` to a JSON search API
//!   and reads `{results: [{url, title, text | snippet}]}`.
//!
//! HTTP 408/425/429/5xx, connection errors and timeouts are reported as
//! [`CapabilityError::Transient`]; everything else is terminal.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::error::{classify_status, CapabilityError, CapabilityResult};
use super::{SearchProvider, TextGenerator};
use crate::domain::Source;

const USER_AGENT: &str = concat!("polysolve/", env!("CARGO_PKG_VERSION"));

/// Text-generation endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationEndpoint {
    /// Full chat completions URL.
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
}

impl Default for GenerationEndpoint {
    fn default() -> Self {
        GenerationEndpoint {
            url: std::env::var("POLYSOLVE_LLM_URL")
                .unwrap_or_else(|_| "http://localhost:11434/v1/chat/completions".to_string()),
            model: std::env::var("POLYSOLVE_LLM_MODEL").unwrap_or_else(|_| "llama3.1".to_string()),
            api_key: std::env::var("POLYSOLVE_LLM_API_KEY").ok(),
            temperature: 0.2,
        }
    }
}

impl GenerationEndpoint {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }
}

/// Search endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchEndpoint {
    pub url: String,
    pub api_key: Option<String>,
    pub num_results: u32,
}

impl Default for SearchEndpoint {
    fn default() -> Self {
        SearchEndpoint {
            url: std::env::var("POLYSOLVE_SEARCH_URL")
                .unwrap_or_else(|_| "http://localhost:8088/search".to_string()),
            api_key: std::env::var("POLYSOLVE_SEARCH_API_KEY").ok(),
            num_results: 5,
        }
    }
}

impl SearchEndpoint {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }
}

fn build_client() -> CapabilityResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| CapabilityError::Failed(format!("failed to create HTTP client: {e}")))
}

async fn error_for_status(response: reqwest::Response) -> CapabilityResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail: String = body.chars().take(200).collect();
    Err(classify_status(status.as_u16(), detail))
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Chat-completions text generator.
pub struct HttpTextGenerator {
    endpoint: GenerationEndpoint,
    http_client: reqwest::Client,
}

impl HttpTextGenerator {
    pub fn new(endpoint: GenerationEndpoint) -> CapabilityResult<Self> {
        Ok(Self {
            endpoint,
            http_client: build_client()?,
        })
    }
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
    #[instrument(skip_all, fields(model = %self.endpoint.model))]
    async fn generate(&self, prompt: &str, context: Option<&str>) -> CapabilityResult<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(ctx) = context {
            messages.push(ChatMessage {
                role: "system",
                content: ctx,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let body = ChatRequest {
            model: &self.endpoint.model,
            messages,
            temperature: self.endpoint.temperature,
        };

        let mut request = self.http_client.post(&self.endpoint.url).json(&body);
        if let Some(key) = &self.endpoint.api_key {
            request = request.bearer_auth(key);
        }

        let response = error_for_status(request.send().await?).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CapabilityError::Failed(format!("malformed completion: {e}")))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| CapabilityError::Failed("completion had no content".to_string()))?;
        debug!(chars = text.len(), "generation returned");
        Ok(text)
    }
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    num_results: u32,
}

#[derive(Deserialize)]
struct SearchResponse {
    results: Vec<SearchResultRow>,
}

#[derive(Deserialize)]
struct SearchResultRow {
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
}

impl SearchResultRow {
    fn into_source(self) -> Option<Source> {
        let snippet = self
            .snippet
            .or(self.text)
            .or(self.title)
            .unwrap_or_default();
        if self.url.trim().is_empty() {
            return None;
        }
        Some(Source {
            uri: self.url,
            snippet: snippet.trim().to_string(),
        })
    }
}

/// JSON search API client.
pub struct HttpSearchProvider {
    endpoint: SearchEndpoint,
    http_client: reqwest::Client,
}

impl HttpSearchProvider {
    pub fn new(endpoint: SearchEndpoint) -> CapabilityResult<Self> {
        Ok(Self {
            endpoint,
            http_client: build_client()?,
        })
    }
}

#[async_trait]
impl SearchProvider for HttpSearchProvider {
    #[instrument(skip_all)]
    async fn search(&self, query: &str) -> CapabilityResult<Vec<Source>> {
        let body = SearchRequest {
            query,
            num_results: self.endpoint.num_results,
        };

        let mut request = self.http_client.post(&self.endpoint.url).json(&body);
        if let Some(key) = &self.endpoint.api_key {
            request = request.header("x-api-key", key);
        }

        let response = error_for_status(request.send().await?).await?;
        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| CapabilityError::Failed(format!("malformed search response: {e}")))?;

        let sources: Vec<Source> = parsed
            .results
            .into_iter()
            .filter_map(SearchResultRow::into_source)
            .collect();
        debug!(hits = sources.len(), "search returned");
        Ok(sources)
    }
}
