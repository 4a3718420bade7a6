use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TEMPERATURE: f32 = 0.3;
const DEFAULT_MAX_TOKENS: u32 = 300;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl OpenAiConfig {
    /// OPENAI_API_KEY, OPENAI_BASE_URL, OPENAI_MODEL, OPENAI_TIMEOUT_SECS
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty());
        if let Ok(base) = std::env::var("OPENAI_BASE_URL") {
            cfg.base_url = base;
        }
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            cfg.model = model;
        }
        if let Some(secs) = std::env::var("OPENAI_TIMEOUT_SECS").ok().and_then(|t| t.parse::<u64>().ok()) {
            cfg.timeout = Duration::from_secs(secs);
        }
        cfg
    }
}

#[derive(Clone)]
pub struct OpenAiClient {
    http: HttpClient,
    cfg: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(cfg: OpenAiConfig) -> Result<Self, OpenAiError> {
        if cfg.api_key.is_none() {
            return Err(OpenAiError::MissingApiKey);
        }
        let http = HttpClient::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(OpenAiError::from)?;
        Ok(Self { http, cfg })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.cfg.base_url.trim_end_matches('/'))
    }

    fn build_api_request(&self, req: &ChatRequest) -> ApiChatRequest {
        ApiChatRequest {
            model: self.cfg.model.clone(),
            temperature: self.cfg.temperature,
            max_tokens: self.cfg.max_tokens,
            messages: req
                .messages
                .iter()
                .map(|m| ApiChatMessage { role: m.role.as_api_str().to_string(), content: Some(m.content.clone()) })
                .collect(),
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Text of the first choice of a chat completion.
    async fn complete(&self, request: ChatRequest) -> Result<String, OpenAiError>;
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: ChatRequest) -> Result<String, OpenAiError> {
        if request.messages.is_empty() {
            return Err(OpenAiError::EmptyMessages);
        }
        let api_key = self.cfg.api_key.as_deref().ok_or(OpenAiError::MissingApiKey)?;

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&self.build_api_request(&request))
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ApiErrorEnvelope>(&bytes)
                .map(|env| env.error.message)
                .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).trim().to_string());
            return Err(OpenAiError::Api { status, message });
        }

        let parsed: ApiChatResponse = serde_json::from_slice(&bytes).map_err(OpenAiError::Decode)?;
        parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .ok_or(OpenAiError::EmptyReply)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

#[cfg(test)]
impl ChatRequest {
    pub fn user(content: impl Into<String>) -> Self {
        Self { messages: vec![ChatMessage::new(ChatRole::User, content)] }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ChatRole {
    System,
    User,
}

impl ChatRole {
    fn as_api_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
        }
    }
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
}

#[derive(Debug)]
pub enum OpenAiError {
    MissingApiKey,
    EmptyMessages,
    EmptyReply,
    Http(reqwest::Error),
    Timeout,
    Api { status: StatusCode, message: String },
    Decode(serde_json::Error),
}

impl From<reqwest::Error> for OpenAiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { OpenAiError::Timeout } else { OpenAiError::Http(err) }
    }
}

impl std::fmt::Display for OpenAiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpenAiError::MissingApiKey => write!(f, "OPENAI_API_KEY is not set"),
            OpenAiError::EmptyMessages => write!(f, "chat completion requires at least one message"),
            OpenAiError::EmptyReply => write!(f, "model returned no content"),
            OpenAiError::Http(err) => write!(f, "http error: {err}"),
            OpenAiError::Timeout => write!(f, "request timed out"),
            OpenAiError::Api { status, message } => write!(f, "api error {status}: {message}"),
            OpenAiError::Decode(err) => write!(f, "decode error: {err}"),
        }
    }
}

impl std::error::Error for OpenAiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OpenAiError::Http(err) => Some(err),
            OpenAiError::Decode(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Clone, Serialize)]
struct ApiChatRequest {
    model: String,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ApiChatMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiChatMessage {
    role: String,
    content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiChatResponse {
    choices: Vec<ApiChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiChatChoice {
    message: ApiChatMessage,
}

#[cfg(test)]
pub use mock::MockClient;

#[cfg(test)]
mod mock {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Replays queued replies in order and records every request.
    #[derive(Debug, Default)]
    pub struct MockClient {
        replies: Mutex<VecDeque<Result<String, OpenAiError>>>,
        calls: Mutex<Vec<ChatRequest>>,
    }

    impl MockClient {
        pub fn new() -> Self { Self::default() }

        pub fn push_reply(&self, reply: Result<String, OpenAiError>) {
            self.replies.lock().unwrap().push_back(reply);
        }

        pub fn calls(&self) -> Vec<ChatRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmClient for MockClient {
        async fn complete(&self, request: ChatRequest) -> Result<String, OpenAiError> {
            self.calls.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(OpenAiError::EmptyReply))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OpenAiClient {
        OpenAiClient::new(OpenAiConfig {
            api_key: Some("test".into()),
            base_url: "https://proxy.local/v1/".into(),
            ..OpenAiConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn build_request_uses_configured_model_and_limits() {
        let api_request = client().build_api_request(&ChatRequest::user("Hello"));
        let value = serde_json::to_value(&api_request).unwrap();

        assert_eq!(value["model"], "gpt-4o-mini");
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["content"], "Hello");
        assert_eq!(value["max_tokens"], 300);
        assert!((value["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        assert_eq!(client().endpoint(), "https://proxy.local/v1/chat/completions");
    }

    #[test]
    fn client_requires_api_key() {
        let err = OpenAiClient::new(OpenAiConfig::default()).err().unwrap();
        assert!(matches!(err, OpenAiError::MissingApiKey));
    }

    #[test]
    fn api_error_display_includes_status() {
        let err = OpenAiError::Api { status: StatusCode::TOO_MANY_REQUESTS, message: "slow down".into() };
        assert_eq!(format!("{err}"), "api error 429 Too Many Requests: slow down");
    }

    #[tokio::test]
    async fn mock_client_replays_in_order() {
        let mock = MockClient::new();
        mock.push_reply(Ok("first".into()));
        mock.push_reply(Err(OpenAiError::Timeout));

        assert_eq!(mock.complete(ChatRequest::user("a")).await.unwrap(), "first");
        assert!(matches!(mock.complete(ChatRequest::user("b")).await, Err(OpenAiError::Timeout)));
        assert!(matches!(mock.complete(ChatRequest::user("c")).await, Err(OpenAiError::EmptyReply)));
        assert_eq!(mock.calls().len(), 3);
    }
}
