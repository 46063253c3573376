//! Configuration management for Polyglot

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::llm::Provider;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Provider configurations, keyed by provider id
    pub providers: HashMap<String, ProviderConfig>,

    /// Provider used to synthesize the summary
    pub summarizer: String,

    /// HTTP timeouts applied to every provider call
    pub timeouts: TimeoutConfig,

    /// Where API keys are stored
    pub credentials: CredentialsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API base URL
    pub endpoint: String,

    /// Model to use
    pub model: String,

    /// Whether this provider takes part in rounds
    pub enabled: bool,

    /// Max tokens for responses
    pub max_tokens: u32,

    /// Temperature setting
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Connect timeout in seconds
    pub connect_secs: u64,

    /// Overall per-request timeout in seconds
    pub request_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Key file location (defaults to the user data dir)
    pub path: Option<PathBuf>,

    /// Fall back to OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
    pub allow_env: bool,
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 30,
            request_secs: 60,
        }
    }
}

impl ProviderConfig {
    /// Built-in settings for a provider
    pub fn default_for(provider: Provider) -> Self {
        match provider {
            Provider::OpenAi => ProviderConfig {
                endpoint: "https://api.openai.com/v1".to_string(),
                model: "gpt-3.5-turbo".to_string(),
                enabled: true,
                max_tokens: 1000,
                temperature: 0.7,
            },
            Provider::Claude => ProviderConfig {
                endpoint: "https://api.anthropic.com/v1".to_string(),
                model: "claude-opus-4-1-20250805".to_string(),
                enabled: true,
                max_tokens: 1024,
                temperature: 0.7,
            },
            Provider::Gemini => ProviderConfig {
                endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                model: "gemini-2.5-flash".to_string(),
                enabled: true,
                max_tokens: 2048,
                temperature: 0.7,
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let providers = Provider::ALL
            .iter()
            .map(|p| (p.id().to_string(), ProviderConfig::default_for(*p)))
            .collect();

        Self {
            providers,
            summarizer: Provider::Claude.id().to_string(),
            timeouts: TimeoutConfig::default(),
            credentials: CredentialsConfig {
                path: None,
                allow_env: true,
            },
        }
    }
}

impl Config {
    /// Load config from file or create default
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = match path {
            Some(p) => PathBuf::from(p),
            None => Self::default_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(&config_path)?;
            Ok(config)
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("polyglot")
            .join("config.toml")
    }

    /// Settings for a provider, falling back to built-in defaults
    pub fn provider(&self, provider: Provider) -> ProviderConfig {
        self.providers
            .get(provider.id())
            .cloned()
            .unwrap_or_else(|| ProviderConfig::default_for(provider))
    }

    /// Reject values that would otherwise be silently replaced by defaults
    pub fn validate(&self) -> Result<()> {
        self.summarizer
            .parse::<Provider>()
            .map_err(|e| anyhow!("Invalid summarizer in config: {}", e))?;

        for id in self.providers.keys() {
            let provider = id
                .parse::<Provider>()
                .map_err(|e| anyhow!("Invalid provider section in config: {}", e))?;
            if provider.id() != id {
                return Err(anyhow!(
                    "Provider section [providers.{}] must be named [providers.{}]",
                    id,
                    provider.id()
                ));
            }
        }
        Ok(())
    }

    /// Designated summarizer, Claude unless configured otherwise.
    /// `load` has already rejected unknown names.
    pub fn summarizer(&self) -> Provider {
        self.summarizer.parse().unwrap_or(Provider::Claude)
    }

    /// Providers that may be selected for a round
    pub fn enabled_providers(&self) -> Vec<Provider> {
        Provider::ALL
            .iter()
            .copied()
            .filter(|p| self.provider(*p).enabled)
            .collect()
    }

    /// Key file location
    pub fn credentials_path(&self) -> PathBuf {
        self.credentials.path.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("polyglot")
                .join("keys.json")
        })
    }
}
