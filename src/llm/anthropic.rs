//! Anthropic messages adapter

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::llm::provider::{post_json, Message, NormalizedResult, Provider, ProviderAdapter};

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicAdapter {
    client: Client,
    config: ProviderConfig,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message>,
    temperature: f32,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    #[serde(default)]
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

impl AnthropicAdapter {
    pub fn new(client: Client, config: ProviderConfig) -> Self {
        Self { client, config }
    }

    pub(crate) fn build_request<'a>(&'a self, prompt: &str) -> AnthropicRequest<'a> {
        AnthropicRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            messages: vec![Message::user(prompt)],
            temperature: self.config.temperature,
        }
    }
}

/// Extract the first content block's text
pub(crate) fn parse_response(body: &str) -> Result<NormalizedResult, ProviderError> {
    let response: AnthropicResponse = serde_json::from_str(body)?;

    debug!(
        input_tokens = response.usage.input_tokens,
        output_tokens = response.usage.output_tokens,
        "Anthropic usage"
    );

    if response.stop_reason.as_deref() == Some("max_tokens") {
        return Err(ProviderError::Truncated);
    }

    let first = response
        .content
        .into_iter()
        .next()
        .ok_or(ProviderError::EmptyContent)?;

    if first.kind != "text" {
        return Err(ProviderError::Decode(format!(
            "expected text block, got {}",
            first.kind
        )));
    }

    NormalizedResult::from_text(first.text)
}

#[async_trait::async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn provider(&self) -> Provider {
        Provider::Claude
    }

    async fn send(&self, prompt: &str, credential: &str) -> Result<NormalizedResult, ProviderError> {
        let url = format!("{}/messages", self.config.endpoint);
        let body = post_json(
            self.client
                .post(&url)
                .header("x-api-key", credential)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&self.build_request(prompt)),
        )
        .await?;

        parse_response(&body)
    }
}
