//! Provider identities, the adapter trait and shared HTTP plumbing

use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::{Config, ProviderConfig, TimeoutConfig};
use crate::error::ProviderError;
use crate::llm::{AnthropicAdapter, GeminiAdapter, OpenAiAdapter};

/// Supported providers. Each speaks its own wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Provider {
    OpenAi,
    Claude,
    Gemini,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::OpenAi, Provider::Claude, Provider::Gemini];

    /// Stable identifier used in config and on the command line
    pub fn id(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Claude => "claude",
            Provider::Gemini => "gemini",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::OpenAi => "ChatGPT (OpenAI)",
            Provider::Claude => "Claude (Anthropic)",
            Provider::Gemini => "Gemini (Google)",
        }
    }

    /// Key under which the provider's API key is stored
    pub fn credential_key(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai_api_key",
            Provider::Claude => "claude_api_key",
            Provider::Gemini => "gemini_api_key",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" | "chatgpt" | "gpt" => Ok(Provider::OpenAi),
            "claude" | "anthropic" => Ok(Provider::Claude),
            "gemini" | "google" => Ok(Provider::Gemini),
            other => Err(format!("Unknown provider: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Minimal chat turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Provider output with the envelope stripped. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedResult {
    pub text: String,
}

impl NormalizedResult {
    /// Reject empty or whitespace-only text
    pub fn from_text(text: Option<String>) -> Result<Self, ProviderError> {
        match text {
            Some(text) if !text.trim().is_empty() => Ok(Self { text }),
            _ => Err(ProviderError::EmptyContent),
        }
    }
}

/// One provider's wire format. Callers never see auth or envelope details.
#[async_trait::async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    async fn send(&self, prompt: &str, credential: &str) -> Result<NormalizedResult, ProviderError>;
}

/// Client shared by every adapter, bounded by connect and overall timeouts
pub fn build_http_client(timeouts: &TimeoutConfig) -> Result<Client, ProviderError> {
    Client::builder()
        .connect_timeout(timeouts.connect())
        .timeout(timeouts.request())
        .build()
        .map_err(ProviderError::from_reqwest)
}

/// Send a prepared POST and return the body of a 2xx response.
/// The request must already carry its body via `.json(..)`, which sets the content type.
pub(crate) async fn post_json(request: RequestBuilder) -> Result<String, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(ProviderError::from_reqwest)?;

    let status = response.status();
    let body = response.text().await.map_err(ProviderError::from_reqwest)?;

    if !status.is_success() {
        return Err(ProviderError::HttpStatus(status.as_u16(), body));
    }

    Ok(body)
}

/// Build the adapter for a provider
pub fn create_adapter(
    provider: Provider,
    config: ProviderConfig,
    client: Client,
) -> Arc<dyn ProviderAdapter> {
    match provider {
        Provider::OpenAi => Arc::new(OpenAiAdapter::new(client, config)),
        Provider::Claude => Arc::new(AnthropicAdapter::new(client, config)),
        Provider::Gemini => Arc::new(GeminiAdapter::new(client, config)),
    }
}

/// Adapters keyed by provider
#[derive(Clone, Default)]
pub struct AdapterSet {
    adapters: HashMap<Provider, Arc<dyn ProviderAdapter>>,
}

impl AdapterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// One adapter per provider, sharing a single HTTP client
    pub fn from_config(config: &Config) -> Result<Self, ProviderError> {
        let client = build_http_client(&config.timeouts)?;
        let mut set = Self::new();
        for provider in Provider::ALL {
            set.insert(create_adapter(provider, config.provider(provider), client.clone()));
        }
        Ok(set)
    }

    pub fn insert(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.provider(), adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.insert(adapter);
        self
    }

    pub fn get(&self, provider: Provider) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&provider).cloned()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
