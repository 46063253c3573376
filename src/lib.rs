//! Polyglot - ask several AI providers at once
//!
//! One prompt fans out to every selected provider concurrently. Each provider's
//! outcome is tracked on its own record, and once at least two have answered a
//! designated provider can merge the answers into a single summary.

pub mod app;
pub mod config;
pub mod credentials;
pub mod error;
pub mod llm;
pub mod response;

pub use app::{ApplyOutcome, Conversation};
pub use config::Config;
pub use credentials::CredentialSource;
pub use error::{ProviderError, RoundError, SummaryError};
pub use llm::{Provider, ProviderAdapter};
pub use response::{ConversationSummary, ResponseRecord, Status};
