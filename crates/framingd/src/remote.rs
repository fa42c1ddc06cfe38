//! Remote suggestion service: an OpenAI-compatible chat-completions client.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Messages kept per history, excluding the system prompt.
pub const HISTORY_LIMIT: usize = 8;

const SYSTEM_PROMPT: &str = "You are a smart photography assistant helping the user take better photos. \
Understand what kind of photo they want, give concrete posing instructions such as \
\"turn a little to the left\" or \"keep smiling\", adapt to their feedback, and say when \
the moment is right to take the photo. Reply briefly and kindly with clear instructions.";

const MAX_TOKENS: u32 = 500;
const TEMPERATURE: f32 = 0.7;

#[derive(Debug, Error)]
pub enum SuggestionError {
    #[error("remote suggestions are disabled (no API key)")]
    Disabled,

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl SuggestionError {
    /// Network failures, rate limiting and server errors are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            SuggestionError::Network(_) => true,
            SuggestionError::Status { status, .. } => *status == 429 || *status >= 500,
            SuggestionError::Disabled | SuggestionError::InvalidResponse(_) => false,
        }
    }
}

/// Produces free-form coaching text.
#[async_trait]
pub trait SuggestionService: Send + Sync {
    /// High-level suggestion for the scene described by `status_summary`.
    async fn suggest(&self, status_summary: &str) -> Result<String, SuggestionError>;

    /// One conversation-mode turn.
    async fn converse(&self, user_text: &str) -> Result<String, SuggestionError>;
}

/// Used when no API key is configured.
#[derive(Debug, Default)]
pub struct DisabledSuggestions;

#[async_trait]
impl SuggestionService for DisabledSuggestions {
    async fn suggest(&self, _status_summary: &str) -> Result<String, SuggestionError> {
        Err(SuggestionError::Disabled)
    }

    async fn converse(&self, _user_text: &str) -> Result<String, SuggestionError> {
        Err(SuggestionError::Disabled)
    }
}

#[derive(Debug, Clone)]
pub struct ChatClientConfig {
    /// Base URL without the `/v1/...` suffix.
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Rolling message window for one kind of exchange.
#[derive(Debug, Default)]
struct History(Mutex<VecDeque<ChatMessage>>);

impl History {
    /// System prompt, the retained window, then `user`.
    fn request_messages(&self, user: &str) -> Vec<ChatMessage> {
        let window = self.0.lock();
        let mut messages = Vec::with_capacity(window.len() + 2);
        messages.push(ChatMessage::new("system", SYSTEM_PROMPT));
        messages.extend(window.iter().cloned());
        messages.push(ChatMessage::new("user", user));
        messages
    }

    fn record(&self, user: &str, reply: &str) {
        let mut window = self.0.lock();
        window.push_back(ChatMessage::new("user", user));
        window.push_back(ChatMessage::new("assistant", reply));
        while window.len() > HISTORY_LIMIT {
            window.pop_front();
        }
    }
}

/// Wrap the status summary in the request sent for automatic suggestions.
pub fn analysis_prompt(status_summary: &str) -> String {
    format!(
        "Current scene: {status_summary}. Give one short, specific instruction to improve \
         the photo. If the subject is well positioned and smiling, say \"perfect timing\"."
    )
}

/// Client for an OpenAI-compatible `/v1/chat/completions` endpoint.
pub struct ChatClient {
    http: Client,
    config: ChatClientConfig,
    suggestions: History,
    conversation: History,
}

impl ChatClient {
    pub fn new(config: ChatClientConfig) -> Result<Self, SuggestionError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(SuggestionError::Network)?;

        Ok(Self {
            http,
            config,
            suggestions: History::default(),
            conversation: History::default(),
        })
    }

    async fn chat(&self, history: &History, user: &str) -> Result<String, SuggestionError> {
        let url = format!("{}/v1/chat/completions", self.config.base_url);
        let messages = history.request_messages(user);
        let request = ChatRequest {
            model: &self.config.model,
            messages: &messages,
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };

        debug!(url = %url, messages = messages.len(), "sending chat request");

        let response = self
            .with_retry(|| async {
                let response = self
                    .http
                    .post(&url)
                    .bearer_auth(&self.config.api_key)
                    .json(&request)
                    .send()
                    .await?;

                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(SuggestionError::Status {
                        status: status.as_u16(),
                        body,
                    });
                }
                Ok(response)
            })
            .await?;

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| SuggestionError::InvalidResponse(e.to_string()))?;
        let reply = body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| SuggestionError::InvalidResponse("no choices".to_string()))?;

        history.record(user, &reply);
        Ok(reply)
    }

    async fn with_retry<F, Fut, T>(&self, operation: F) -> Result<T, SuggestionError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, SuggestionError>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    warn!(
                        attempt = attempt + 1,
                        ?delay,
                        error = %e,
                        "chat request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl SuggestionService for ChatClient {
    async fn suggest(&self, status_summary: &str) -> Result<String, SuggestionError> {
        self.chat(&self.suggestions, &analysis_prompt(status_summary))
            .await
    }

    async fn converse(&self, user_text: &str) -> Result<String, SuggestionError> {
        self.chat(&self.conversation, user_text).await
    }
}
