use anyhow::Context;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::agent::conversation::ChatMessage;
use crate::agent::game_api::BoxFuture;
use crate::agent::harness::LlmClient;

/// Config for an OpenAI-compatible `POST {base_url}/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct ChatCompletionsConfig {
    /// e.g. `http://localhost:11434/v1`.
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_tokens: u32,
}

impl ChatCompletionsConfig {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
            max_tokens: 256,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Sends the message log and returns the first choice's text, trimmed. A response without
/// content yields an empty string.
pub async fn query_chat_completions(
    client: &Client,
    messages: &[ChatMessage],
    cfg: &ChatCompletionsConfig,
) -> anyhow::Result<String> {
    let request = ChatRequest {
        model: &cfg.model,
        messages,
        max_tokens: cfg.max_tokens,
    };

    let mut builder = client.post(cfg.endpoint()).json(&request);
    if let Some(key) = &cfg.api_key {
        builder = builder.bearer_auth(key);
    }

    let res = builder
        .send()
        .await
        .context("chat completion request failed")?
        .error_for_status()
        .context("chat completion non-2xx response")?
        .json::<ChatResponse>()
        .await
        .context("chat completion response decode failed")?;

    Ok(res
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|s| s.trim().to_string())
        .unwrap_or_default())
}

pub struct ChatCompletionsClient {
    client: Client,
    cfg: ChatCompletionsConfig,
}

impl ChatCompletionsClient {
    pub fn new(cfg: ChatCompletionsConfig) -> Self {
        Self {
            client: Client::new(),
            cfg,
        }
    }
}

impl LlmClient for ChatCompletionsClient {
    fn complete<'a>(&'a self, messages: Vec<ChatMessage>) -> BoxFuture<'a, anyhow::Result<String>> {
        Box::pin(async move { query_chat_completions(&self.client, &messages, &self.cfg).await })
    }
}
