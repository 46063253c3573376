//! Error types for Polyglot

use thiserror::Error;

/// Failure of a single provider call. Scoped to that provider's record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("No API key configured")]
    MissingCredential,

    #[error("Network error: {0}")]
    Transport(String),

    #[error("HTTP {0}: {1}")]
    HttpStatus(u16, String),

    #[error("Decoding error: {0}")]
    Decode(String),

    #[error("No content in response")]
    EmptyContent,

    #[error("Response truncated due to max tokens limit")]
    Truncated,

    #[error("No adapter registered for provider")]
    NoAdapter,
}

impl ProviderError {
    /// Short reason shown next to a failed provider.
    pub fn reason(&self) -> String {
        match self {
            ProviderError::MissingCredential => "no API key".to_string(),
            ProviderError::Transport(detail) => detail.clone(),
            ProviderError::HttpStatus(code, body) => {
                error_message_from_body(body).unwrap_or_else(|| format!("HTTP {}", code))
            }
            ProviderError::Decode(detail) => format!("unexpected response: {}", detail),
            ProviderError::EmptyContent => "empty response".to_string(),
            ProviderError::Truncated => "truncated".to_string(),
            ProviderError::NoAdapter => "provider not supported".to_string(),
        }
    }

    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Transport("request timed out".to_string())
        } else if err.is_connect() {
            ProviderError::Transport(format!("connection failed: {}", err))
        } else if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Decode(err.to_string())
    }
}

/// Pull a human message out of an error body. Providers wrap it as
/// `{"error": {"message": ..}}` or `{"error": ".."}`; anything else is used as-is.
fn error_message_from_body(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        let error = value.get("error");
        let message = error
            .and_then(|e| e.get("message"))
            .or(error)
            .or_else(|| value.get("message"))
            .and_then(|m| m.as_str());
        if let Some(message) = message.filter(|m| !m.trim().is_empty()) {
            return Some(message.trim().to_string());
        }
    }

    Some(trimmed.to_string())
}

/// Failure of a summarization attempt. Never touches provider records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SummaryError {
    #[error("No conversation in progress")]
    NoRound,

    #[error("Need at least 2 successful responses to summarize (have {successful})")]
    NotEnoughResponses { successful: usize },

    #[error("A summary is already being generated")]
    AlreadyRunning,

    #[error("designated summarizer credential required")]
    MissingSummarizerCredential,

    #[error("{}", .0.reason())]
    Provider(#[from] ProviderError),

    #[error("Conversation ended before the summary arrived")]
    Superseded,
}

/// Reasons a round cannot start.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoundError {
    #[error("Prompt is empty")]
    EmptyPrompt,

    #[error("No providers selected")]
    NoProviders,
}

/// Credential store I/O failures.
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
