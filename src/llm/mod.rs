//! Provider adapters, concurrent dispatch and summary synthesis

mod anthropic;
mod dispatcher;
mod gemini;
mod openai;
mod provider;
mod summary;

pub use anthropic::AnthropicAdapter;
pub use dispatcher::*;
pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;
pub use provider::*;
pub use summary::*;
