//! OpenAI chat completions adapter

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::llm::provider::{post_json, Message, NormalizedResult, Provider, ProviderAdapter};

pub struct OpenAiAdapter {
    client: Client,
    config: ProviderConfig,
}

#[derive(Debug, Serialize)]
pub(crate) struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessageResponse,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    total_tokens: u32,
}

impl OpenAiAdapter {
    pub fn new(client: Client, config: ProviderConfig) -> Self {
        Self { client, config }
    }

    pub(crate) fn build_request<'a>(&'a self, prompt: &str) -> OpenAiRequest<'a> {
        OpenAiRequest {
            model: &self.config.model,
            messages: vec![Message::user(prompt)],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }
}

/// Extract the first choice's text
pub(crate) fn parse_response(body: &str) -> Result<NormalizedResult, ProviderError> {
    let response: OpenAiResponse = serde_json::from_str(body)?;

    if let Some(usage) = &response.usage {
        debug!(total_tokens = usage.total_tokens, "OpenAI usage");
    }

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or(ProviderError::EmptyContent)?;

    if choice.finish_reason.as_deref() == Some("length") {
        return Err(ProviderError::Truncated);
    }

    NormalizedResult::from_text(choice.message.content)
}

#[async_trait::async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    async fn send(&self, prompt: &str, credential: &str) -> Result<NormalizedResult, ProviderError> {
        let url = format!("{}/chat/completions", self.config.endpoint);
        let body = post_json(
            self.client
                .post(&url)
                .header("Authorization", format!("Bearer {}", credential))
                .json(&self.build_request(prompt)),
        )
        .await?;

        parse_response(&body)
    }
}
