//! Summary engine - one designated provider merges the successful answers

use std::sync::Arc;
use tracing::info;

use crate::credentials::CredentialSource;
use crate::error::SummaryError;
use crate::llm::provider::{NormalizedResult, Provider, ProviderAdapter};
use crate::response::ResponseRecord;

pub struct SummaryEngine {
    adapter: Arc<dyn ProviderAdapter>,
    credentials: Arc<dyn CredentialSource>,
}

impl SummaryEngine {
    pub fn new(adapter: Arc<dyn ProviderAdapter>, credentials: Arc<dyn CredentialSource>) -> Self {
        Self {
            adapter,
            credentials,
        }
    }

    /// The provider that writes summaries
    pub fn provider(&self) -> Provider {
        self.adapter.provider()
    }

    /// Synthesize one answer from the successful records.
    ///
    /// Fails without any network call when fewer than two records succeeded or
    /// the summarizer has no credential.
    pub async fn summarize(
        &self,
        original_prompt: &str,
        records: &[ResponseRecord],
    ) -> Result<NormalizedResult, SummaryError> {
        let successful: Vec<&ResponseRecord> = records.iter().filter(|r| r.has_content()).collect();

        if successful.len() < 2 {
            return Err(SummaryError::NotEnoughResponses {
                successful: successful.len(),
            });
        }

        let credential = self
            .credentials
            .get(self.provider().credential_key())
            .ok_or(SummaryError::MissingSummarizerCredential)?;

        let prompt = build_summary_prompt(original_prompt, &successful);

        info!(
            summarizer = %self.provider(),
            responses = successful.len(),
            "Generating summary"
        );

        Ok(self.adapter.send(&prompt, &credential).await?)
    }
}

/// Synthesis prompt embedding the question and each labelled answer
pub fn build_summary_prompt(original_prompt: &str, responses: &[&ResponseRecord]) -> String {
    let sections = responses
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{}. {}:\n{}\n", i + 1, r.provider.display_name(), r.content))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Please create a comprehensive summary that synthesizes the following AI responses to this question:\n\n\
        Original Question: \"{}\"\n\n\
        AI Responses:\n\n{}\n\
        Instructions:\n\
        - Combine the best insights from each response\n\
        - Resolve any conflicts or contradictions\n\
        - Present as one coherent, comprehensive answer\n\
        - Preserve important details and nuances\n\
        - Keep the summary well-structured and easy to understand\n\
        - If responses disagree, explain the different perspectives instead of silently picking one\n\n\
        Summary:",
        original_prompt, sections
    )
}
