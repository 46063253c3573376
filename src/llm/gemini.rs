//! Google Gemini generateContent adapter

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::llm::provider::{post_json, NormalizedResult, Provider, ProviderAdapter};

pub struct GeminiAdapter {
    client: Client,
    config: ProviderConfig,
}

#[derive(Debug, Serialize)]
pub(crate) struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
    role: &'a str,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default, alias = "usageMetadata")]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default, alias = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Option<Vec<CandidatePart>>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct UsageMetadata {
    #[serde(default, alias = "totalTokenCount")]
    total_token_count: Option<u32>,
}

impl GeminiAdapter {
    pub fn new(client: Client, config: ProviderConfig) -> Self {
        Self { client, config }
    }

    pub(crate) fn build_request<'a>(&self, prompt: &'a str) -> GeminiRequest<'a> {
        GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: prompt }],
                role: "user",
            }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_tokens,
            },
        }
    }
}

/// Extract the first candidate's first part
pub(crate) fn parse_response(body: &str) -> Result<NormalizedResult, ProviderError> {
    let response: GeminiResponse = serde_json::from_str(body)?;

    if let Some(total) = response.usage_metadata.and_then(|u| u.total_token_count) {
        debug!(total_tokens = total, "Gemini usage");
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or(ProviderError::EmptyContent)?;

    if candidate.finish_reason.as_deref() == Some("MAX_TOKENS") {
        return Err(ProviderError::Truncated);
    }

    // Parts may be missing entirely, e.g. on safety-blocked candidates
    let text = candidate
        .content
        .and_then(|c| c.parts)
        .and_then(|parts| parts.into_iter().next())
        .and_then(|part| part.text);

    NormalizedResult::from_text(text)
}

#[async_trait::async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    async fn send(&self, prompt: &str, credential: &str) -> Result<NormalizedResult, ProviderError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.endpoint, self.config.model
        );
        let body = post_json(
            self.client
                .post(&url)
                .header("x-goog-api-key", credential)
                .json(&self.build_request(prompt)),
        )
        .await?;

        parse_response(&body)
    }
}
