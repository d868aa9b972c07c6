#[cfg(test)]
use std::collections::VecDeque;
#[cfg(test)]
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "chatgpt-4o-latest";
const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";
const IMAGE_SIZE: &str = "1024x1024";
const IMAGE_QUALITY: &str = "standard";
const DEFAULT_TEMPERATURE: f32 = 0.2;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Clone, Debug)]
pub struct OpenAiClientConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub chat_model: String,
    pub image_model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for OpenAiClientConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            chat_model: DEFAULT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl OpenAiClientConfig {
    /// Endpoint tuning from the environment; the key comes from the run's config.
    pub fn from_env(api_key: Option<String>) -> Self {
        let var = |k: &str| std::env::var(k).ok().filter(|v| !v.trim().is_empty());
        let d = Self::default();
        Self {
            api_key,
            base_url: var("OPENAI_BASE_URL").unwrap_or(d.base_url),
            chat_model: var("OPENAI_MODEL").unwrap_or(d.chat_model),
            image_model: var("OPENAI_IMAGE_MODEL").unwrap_or(d.image_model),
            temperature: d.temperature,
            timeout: var("OPENAI_TIMEOUT_SECS")
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(d.timeout),
        }
    }
}

/// Completion and image generation: the two model calls a run makes.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat_completion(&self, request: ChatCompletionRequest) -> Result<Completion, OpenAiError>;

    /// Returns the URL of the single generated image.
    async fn generate_image(&self, request: ImageRequest) -> Result<String, OpenAiError>;
}

#[derive(Clone)]
pub struct OpenAiClient {
    http: HttpClient,
    cfg: OpenAiClientConfig,
}

impl OpenAiClient {
    pub fn new(cfg: OpenAiClientConfig) -> Result<Self, OpenAiError> {
        let http = HttpClient::builder().timeout(cfg.timeout).build()?;
        Ok(Self { http, cfg })
    }

    fn chat_body<'a>(&'a self, req: &'a ChatCompletionRequest) -> ChatBody<'a> {
        ChatBody {
            model: &self.cfg.chat_model,
            temperature: self.cfg.temperature,
            n: 1,
            messages: req
                .messages
                .iter()
                .map(|m| WireMessage { role: m.role.as_str(), content: &m.content })
                .collect(),
        }
    }

    fn image_body<'a>(&'a self, req: &'a ImageRequest) -> ImageBody<'a> {
        ImageBody { model: &self.cfg.image_model, prompt: &req.prompt, size: IMAGE_SIZE, quality: IMAGE_QUALITY, n: 1 }
    }

    async fn post<B: Serialize + Sync, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R, OpenAiError> {
        let key = self.cfg.api_key.as_deref().ok_or(OpenAiError::MissingApiKey)?;
        let url = format!("{}/{}", self.cfg.base_url.trim_end_matches('/'), path);
        let response = self.http.post(url).bearer_auth(key).json(body).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorEnvelope>(&bytes)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).trim().to_string());
            return Err(OpenAiError::Api { status, message });
        }
        serde_json::from_slice(&bytes).map_err(OpenAiError::Decode)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat_completion(&self, request: ChatCompletionRequest) -> Result<Completion, OpenAiError> {
        if request.messages.is_empty() {
            return Err(OpenAiError::EmptyMessages);
        }
        let parsed: ChatReply = self.post("chat/completions", &self.chat_body(&request)).await?;
        Ok(Completion {
            content: parsed.choices.into_iter().find_map(|c| c.message.content).unwrap_or_default(),
            total_tokens: parsed.usage.and_then(|u| u.total_tokens),
        })
    }

    async fn generate_image(&self, request: ImageRequest) -> Result<String, OpenAiError> {
        let parsed: ImageReply = self.post("images/generations", &self.image_body(&request)).await?;
        parsed.data.into_iter().find_map(|d| d.url).ok_or(OpenAiError::NoImage)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatCompletionRequest {
    pub messages: Vec<ChatMessage>,
}

impl ChatCompletionRequest {
    /// The system role followed by the rendered prompt.
    pub fn role_and_prompt(role: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self { messages: vec![ChatMessage::new(ChatRole::System, role), ChatMessage::new(ChatRole::User, prompt)] }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ChatRole {
    System,
    User,
}

impl ChatRole {
    fn as_str(self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImageRequest {
    pub prompt: String,
}

impl ImageRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into() }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Completion {
    pub content: String,
    pub total_tokens: Option<u32>,
}

#[derive(Debug)]
pub enum OpenAiError {
    MissingApiKey,
    EmptyMessages,
    Timeout,
    Http(reqwest::Error),
    Api { status: StatusCode, message: String },
    Decode(serde_json::Error),
    NoImage,
    #[cfg(test)]
    MockQueueEmpty,
}

impl From<reqwest::Error> for OpenAiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { OpenAiError::Timeout } else { OpenAiError::Http(err) }
    }
}

impl std::fmt::Display for OpenAiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpenAiError::MissingApiKey => write!(f, "OPENAI_API_KEY is not configured"),
            OpenAiError::EmptyMessages => write!(f, "chat completion requires at least one message"),
            OpenAiError::Timeout => write!(f, "OpenAI request timed out"),
            OpenAiError::Http(err) => write!(f, "http error: {err}"),
            OpenAiError::Api { status, message } => write!(f, "api error {status}: {message}"),
            OpenAiError::Decode(err) => write!(f, "decode error: {err}"),
            OpenAiError::NoImage => write!(f, "image response contained no url"),
            #[cfg(test)]
            OpenAiError::MockQueueEmpty => write!(f, "mock client response queue is empty"),
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

// Wire shapes

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    temperature: f32,
    n: u32,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatReply {
    choices: Vec<ChoiceReply>,
    usage: Option<UsageReply>,
}

#[derive(Deserialize)]
struct ChoiceReply {
    message: MessageReply,
}

#[derive(Deserialize)]
struct MessageReply {
    content: Option<String>,
}

#[derive(Deserialize)]
struct UsageReply {
    total_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ImageBody<'a> {
    model: &'a str,
    prompt: &'a str,
    size: &'static str,
    quality: &'static str,
    n: u32,
}

#[derive(Deserialize)]
struct ImageReply {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    url: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Queue-driven client for tests: records every request, replays enqueued responses.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockClient {
    replies: Mutex<VecDeque<Result<Completion, OpenAiError>>>,
    images: Mutex<VecDeque<Result<String, OpenAiError>>>,
    calls: Mutex<Vec<ChatCompletionRequest>>,
    image_calls: Mutex<Vec<ImageRequest>>,
}

#[cfg(test)]
impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_text(&self, content: impl Into<String>) {
        let reply = Completion { content: content.into(), total_tokens: None };
        self.replies.lock().unwrap().push_back(Ok(reply));
    }

    pub fn push_image(&self, resp: Result<String, OpenAiError>) {
        self.images.lock().unwrap().push_back(resp);
    }

    pub fn calls(&self) -> Vec<ChatCompletionRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn image_calls(&self) -> Vec<ImageRequest> {
        self.image_calls.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl LlmClient for MockClient {
    async fn chat_completion(&self, request: ChatCompletionRequest) -> Result<Completion, OpenAiError> {
        self.calls.lock().unwrap().push(request);
        self.replies.lock().unwrap().pop_front().unwrap_or(Err(OpenAiError::MockQueueEmpty))
    }

    async fn generate_image(&self, request: ImageRequest) -> Result<String, OpenAiError> {
        self.image_calls.lock().unwrap().push(request);
        self.images.lock().unwrap().pop_front().unwrap_or(Err(OpenAiError::MockQueueEmpty))
    }
}
