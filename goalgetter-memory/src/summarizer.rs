//! Summarization collaborator
//!
//! Trimming hands the dropped prefix of a conversation to a summarizer and
//! inserts the result at the head of the retained sequence. The collaborator
//! is fallible by contract; on failure the manager truncates instead.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use goalgetter_core::config::schema::SummarizerConfig;

use crate::types::Message;

/// Error type for summarization
#[derive(Error, Debug)]
pub enum SummarizeError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

pub type SummarizeResult<T> = Result<T, SummarizeError>;

/// Produces a single summary of an ordered message sequence
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, messages: &[Message]) -> SummarizeResult<String>;
}

const SUMMARY_PROMPT: &str = "Condense the following conversation into a short \
summary that preserves the user's goals, decisions, and open tasks. Reply with \
the summary text only.";

/// Chat-completions request format (OpenAI-compatible)
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<RequestMessage>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct RequestMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Summarizer backed by an OpenAI-compatible chat-completions endpoint
pub struct LlmSummarizer {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl LlmSummarizer {
    /// Create a summarizer client
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: 512,
        }
    }

    /// Create a summarizer from configuration
    pub fn from_config(config: &SummarizerConfig) -> Self {
        let client = match Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
        {
            Ok(client) => client,
            Err(err) => {
                warn!(error = %err, "failed to build summarizer HTTP client, using defaults");
                Client::new()
            }
        };

        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        }
    }

    fn transcript(messages: &[Message]) -> String {
        messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, messages: &[Message]) -> SummarizeResult<String> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                RequestMessage {
                    role: "system".to_string(),
                    content: SUMMARY_PROMPT.to_string(),
                },
                RequestMessage {
                    role: "user".to_string(),
                    content: Self::transcript(messages),
                },
            ],
            max_tokens: self.max_tokens,
            temperature: 0.3,
        };

        let url = format!("{}/chat/completions", self.api_base);
        debug!(count = messages.len(), %url, "requesting history summary");

        let mut builder = self.client.post(&url).json(&request);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SummarizeError::Api(format!("{status}: {body}")));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| SummarizeError::InvalidResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .map(|content| content.trim().to_string())
            .ok_or_else(|| SummarizeError::InvalidResponse("empty completion".to_string()))
    }
}
