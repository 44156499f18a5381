//! Chat-completion client for product summaries.
//!
//! One request per turn: a system persona plus the product prompt. The first
//! returned choice is trimmed and handed back with the measured latency.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::OpenAiConfig;
use crate::error::CompletionError;

/// A completed reply and how long the round trip took.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub latency_ms: f64,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<Completion, CompletionError>;
}

// --- Wire types ---

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
    n: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible `/chat/completions` client.
pub struct OpenAiCompletion {
    config: OpenAiConfig,
    api_key: String,
    client: Client,
}

impl OpenAiCompletion {
    pub fn new(config: OpenAiConfig, api_key: String) -> Result<Self, CompletionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            config,
            api_key,
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.host.trim_end_matches('/'))
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletion {
    async fn complete(&self, prompt: &str) -> Result<Completion, CompletionError> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &self.config.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            n: self.config.n,
        };
        debug!("Sending {} prompt chars to model '{}'", prompt.len(), self.config.model);

        let t_start = Instant::now();
        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CompletionError::Status { status, body });
        }

        let bytes = resp.bytes().await?;
        let data: ChatResponse =
            serde_json::from_slice(&bytes).map_err(CompletionError::Decode)?;
        let latency_ms = t_start.elapsed().as_secs_f64() * 1000.0;

        let choice = data.choices.into_iter().next().ok_or(CompletionError::NoChoices)?;
        let text = choice.message.content.unwrap_or_default().trim().to_string();
        info!("Completion: {} chars ({latency_ms:.0}ms)", text.len());

        Ok(Completion { text, latency_ms })
    }
}
