//! Chat-completion client.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One chat-completion request. The caller picks the prompt pair; the model is
/// always asked for a JSON object response.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    pub timeout: Duration,
}

/// LLM transport errors.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("http error: {0}")]
    Http(String),
    #[error("response error: {0}")]
    Response(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Chat client trait.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Complete the request and return the raw message content.
    async fn complete_json(&self, request: CompletionRequest) -> Result<String, LlmError>;
}

#[async_trait]
impl ChatClient for Arc<dyn ChatClient> {
    async fn complete_json(&self, request: CompletionRequest) -> Result<String, LlmError> {
        (**self).complete_json(request).await
    }
}

/// HTTP client config (OpenAI-compatible chat completions).
#[derive(Debug, Clone)]
pub struct HttpChatClientConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub extra_headers: HeaderMap,
}

impl Default for HttpChatClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: None,
            extra_headers: HeaderMap::new(),
        }
    }
}

/// HTTP chat client using an OpenAI-compatible API.
pub struct HttpChatClient {
    client: reqwest::Client,
    config: HttpChatClientConfig,
}

impl HttpChatClient {
    pub fn new(config: HttpChatClientConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| LlmError::Http(e.to_string()))?;
        Ok(Self { client, config })
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

#[async_trait]
impl ChatClient for HttpChatClient {
    async fn complete_json(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let mut headers = self.config.extra_headers.clone();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.config.api_key {
            let value = format!("Bearer {}", key);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&value).map_err(|e| LlmError::Http(e.to_string()))?,
            );
        }

        tracing::debug!(
            model = %request.model,
            user_len = request.user.len(),
            timeout_ms = request.timeout.as_millis() as u64,
            "chat completion request"
        );

        let body = ChatRequest {
            model: request.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.system,
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.user,
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat { kind: "json_object" },
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .timeout(request.timeout)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;
        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| LlmError::Serialization(e.to_string()))?;

        if status.as_u16() >= 400 {
            if let Some(err) = parsed.error.filter(|e| !e.message.is_empty()) {
                return Err(LlmError::Response(err.message));
            }
            return Err(LlmError::Response(format!(
                "request failed with status {}",
                status
            )));
        }

        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| LlmError::Response("missing choices".to_string()))?;
        if content.is_empty() {
            return Err(LlmError::Response("empty message content".to_string()));
        }
        Ok(content)
    }
}

/// Mock client for tests/examples: always returns the same content.
pub struct MockChatClient {
    pub response: String,
}

#[async_trait]
impl ChatClient for MockChatClient {
    async fn complete_json(&self, _request: CompletionRequest) -> Result<String, LlmError> {
        Ok(self.response.clone())
    }
}

/// Scripted client for ladder tests: pops queued outcomes in order and records
/// every request it saw.
pub struct ScriptedChatClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedChatClient {
    pub fn new(outcomes: Vec<Result<String, LlmError>>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Convenience constructor for all-success scripts.
    pub fn with_responses(responses: Vec<&str>) -> Self {
        Self::new(responses.into_iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ChatClient for ScriptedChatClient {
    async fn complete_json(&self, request: CompletionRequest) -> Result<String, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        next.unwrap_or_else(|| Err(LlmError::Response("script exhausted".to_string())))
    }
}
