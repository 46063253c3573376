//! Per-provider response records and the round's conversation summary

use chrono::{DateTime, Local};

use crate::error::ProviderError;
use crate::llm::Provider;

/// Lifecycle of a provider response (or of the summary)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Idle,
    Pending,
    Success,
    Failed(String),
    NoCredential,
    Disabled,
}

impl Status {
    pub fn status_text(&self) -> String {
        match self {
            Status::Idle => "Ready".to_string(),
            Status::Pending => "Loading...".to_string(),
            Status::Success => "Complete".to_string(),
            Status::Failed(reason) => format!("Error: {}", reason),
            Status::NoCredential => "No API Key".to_string(),
            Status::Disabled => "Disabled".to_string(),
        }
    }

    /// Nothing more will happen to this record in the current round
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Status::Success | Status::Failed(_) | Status::NoCredential | Status::Disabled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseRecord {
    pub provider: Provider,
    pub status: Status,
    pub content: String,
    pub timestamp: Option<DateTime<Local>>,
}

impl ResponseRecord {
    pub fn new(provider: Provider, status: Status) -> Self {
        Self {
            provider,
            status,
            content: String::new(),
            timestamp: None,
        }
    }

    /// pending -> success. Returns false if the record already settled.
    pub fn succeed(&mut self, text: String) -> bool {
        if self.status != Status::Pending || text.trim().is_empty() {
            return false;
        }
        self.status = Status::Success;
        self.content = text;
        self.timestamp = Some(Local::now());
        true
    }

    /// pending -> failed / noCredential. Returns false if the record already settled.
    pub fn fail(&mut self, error: &ProviderError) -> bool {
        if self.status != Status::Pending {
            return false;
        }
        self.status = match error {
            ProviderError::MissingCredential => Status::NoCredential,
            other => Status::Failed(other.reason()),
        };
        self.content.clear();
        true
    }

    pub fn has_content(&self) -> bool {
        self.status == Status::Success && !self.content.is_empty()
    }

    /// First three lines of the content
    pub fn preview(&self) -> String {
        let lines: Vec<&str> = self.content.lines().collect();
        let preview = lines.iter().take(3).copied().collect::<Vec<_>>().join("\n");
        if lines.len() > 3 {
            format!("{}...", preview)
        } else {
            preview
        }
    }
}

/// One round: the prompt, its records, and the optional synthesized answer
#[derive(Debug, Clone)]
pub struct ConversationSummary {
    pub original_prompt: String,
    pub responses: Vec<ResponseRecord>,
    pub summary_content: String,
    pub summary_status: Status,
    pub timestamp: Option<DateTime<Local>>,
}

impl ConversationSummary {
    pub fn new(original_prompt: impl Into<String>, responses: Vec<ResponseRecord>) -> Self {
        Self {
            original_prompt: original_prompt.into(),
            responses,
            summary_content: String::new(),
            summary_status: Status::Idle,
            timestamp: None,
        }
    }

    pub fn record(&self, provider: Provider) -> Option<&ResponseRecord> {
        self.responses.iter().find(|r| r.provider == provider)
    }

    pub fn record_mut(&mut self, provider: Provider) -> Option<&mut ResponseRecord> {
        self.responses.iter_mut().find(|r| r.provider == provider)
    }

    /// Status for any provider; unselected providers are disabled
    pub fn status_of(&self, provider: Provider) -> Status {
        self.record(provider)
            .map(|r| r.status.clone())
            .unwrap_or(Status::Disabled)
    }

    pub fn successful(&self) -> Vec<ResponseRecord> {
        self.responses
            .iter()
            .filter(|r| r.has_content())
            .cloned()
            .collect()
    }

    pub fn success_count(&self) -> usize {
        self.responses.iter().filter(|r| r.has_content()).count()
    }

    pub fn can_summarize(&self) -> bool {
        self.success_count() >= 2
    }

    pub fn is_ready(&self) -> bool {
        self.summary_status == Status::Success && !self.summary_content.is_empty()
    }

    /// No record is still waiting on its provider
    pub fn is_settled(&self) -> bool {
        self.responses.iter().all(|r| r.status.is_terminal())
    }

    pub fn start_summary(&mut self) {
        self.summary_status = Status::Pending;
        self.summary_content.clear();
        self.timestamp = None;
    }

    pub fn finish_summary(&mut self, text: String) {
        self.summary_status = Status::Success;
        self.summary_content = text;
        self.timestamp = Some(Local::now());
    }

    pub fn fail_summary(&mut self, reason: String) {
        self.summary_status = Status::Failed(reason);
        self.summary_content.clear();
    }

    /// Prompt prefix carrying this round into a single follow-up question
    pub fn follow_up_context(&self) -> String {
        if !self.is_ready() {
            return self.original_prompt.clone();
        }
        format!(
            "Previous conversation:\nUser: {}\n\nSummary of AI responses: {}\n\nNew question:",
            self.original_prompt, self.summary_content
        )
    }
}
