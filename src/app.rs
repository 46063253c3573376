//! Conversation state management
//!
//! A [`Conversation`] owns the current round: one [`ResponseRecord`] per selected
//! provider plus the summary. Every mutation goes through the single
//! `RoundState` mutex, and every dispatch carries the round's generation so that
//! completions from an abandoned round are dropped on arrival.

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::Config;
use crate::credentials::CredentialSource;
use crate::error::{ProviderError, RoundError, SummaryError};
use crate::llm::{AdapterSet, DispatchEvent, Dispatcher, Provider, SummaryEngine};
use crate::response::{ConversationSummary, ResponseRecord, Status};

/// What happened to an incoming dispatch event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The record moved to its terminal status
    Applied,
    /// The event belongs to an earlier round and was dropped
    Stale,
    /// The record had already settled, or the provider is not part of the round
    Ignored,
}

struct RoundState {
    generation: u64,
    round: Option<ConversationSummary>,
}

struct Inner {
    dispatcher: Dispatcher,
    summarizer: SummaryEngine,
    credentials: Arc<dyn CredentialSource>,
    state: Mutex<RoundState>,
    updates: watch::Sender<u64>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, RoundState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(&self) {
        self.updates.send_modify(|revision| *revision = revision.wrapping_add(1));
    }

    fn apply(&self, event: DispatchEvent) -> ApplyOutcome {
        let outcome = {
            let mut state = self.lock();
            if event.generation != state.generation {
                ApplyOutcome::Stale
            } else {
                let record = state
                    .round
                    .as_mut()
                    .and_then(|round| round.record_mut(event.provider));
                let changed = match (record, event.outcome) {
                    (None, _) => false,
                    (Some(record), Ok(result)) if !result.text.trim().is_empty() => {
                        record.succeed(result.text)
                    }
                    (Some(record), Ok(_)) => record.fail(&ProviderError::EmptyContent),
                    (Some(record), Err(e)) => record.fail(&e),
                };
                if changed {
                    ApplyOutcome::Applied
                } else {
                    ApplyOutcome::Ignored
                }
            }
        };

        match outcome {
            ApplyOutcome::Applied => self.notify(),
            ApplyOutcome::Stale => debug!(
                provider = %event.provider,
                generation = event.generation,
                "Dropping result from an earlier round"
            ),
            ApplyOutcome::Ignored => {}
        }
        outcome
    }
}

/// Multi-provider conversation: dispatch, aggregation and summary
#[derive(Clone)]
pub struct Conversation {
    inner: Arc<Inner>,
}

impl Conversation {
    pub fn new(
        dispatcher: Dispatcher,
        summarizer: SummaryEngine,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        let (updates, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                dispatcher,
                summarizer,
                credentials,
                state: Mutex::new(RoundState {
                    generation: 0,
                    round: None,
                }),
                updates,
            }),
        }
    }

    /// Real HTTP adapters for every provider, summarizing with the configured one
    pub fn from_config(
        config: &Config,
        credentials: Arc<dyn CredentialSource>,
    ) -> Result<Self, ProviderError> {
        let adapters = AdapterSet::from_config(config)?;
        let summary_adapter = adapters
            .get(config.summarizer())
            .ok_or(ProviderError::NoAdapter)?;
        let summarizer = SummaryEngine::new(summary_adapter, Arc::clone(&credentials));

        Ok(Self::new(Dispatcher::new(adapters), summarizer, credentials))
    }

    /// Start a new round, discarding the previous one.
    ///
    /// Records are created synchronously as `Pending` or `NoCredential` before any
    /// request goes out. Must be called inside a tokio runtime.
    pub fn submit(&self, prompt: &str, selected: &[Provider]) -> Result<u64, RoundError> {
        let prompt = prompt.trim();
        self.start_round(prompt, prompt, selected)
    }

    /// Ask a follow-up that carries the previous round's summary as context
    pub fn submit_follow_up(&self, question: &str, selected: &[Provider]) -> Result<u64, RoundError> {
        let question = question.trim();
        let context = self
            .snapshot()
            .filter(|round| round.is_ready())
            .map(|round| round.follow_up_context());

        match context {
            Some(context) => self.start_round(question, &format!("{}\n{}", context, question), selected),
            None => self.start_round(question, question, selected),
        }
    }

    fn start_round(
        &self,
        question: &str,
        prompt: &str,
        selected: &[Provider],
    ) -> Result<u64, RoundError> {
        if question.is_empty() {
            return Err(RoundError::EmptyPrompt);
        }

        let mut providers: Vec<Provider> = Vec::with_capacity(selected.len());
        for provider in selected {
            if !providers.contains(provider) {
                providers.push(*provider);
            }
        }
        if providers.is_empty() {
            return Err(RoundError::NoProviders);
        }

        let generation = {
            let mut state = self.inner.lock();
            state.generation += 1;

            let records = providers
                .iter()
                .map(|&provider| {
                    let status = if self.inner.credentials.exists(provider.credential_key()) {
                        Status::Pending
                    } else {
                        Status::NoCredential
                    };
                    ResponseRecord::new(provider, status)
                })
                .collect();
            state.round = Some(ConversationSummary::new(question, records));
            state.generation
        };
        self.inner.notify();

        info!(generation, providers = providers.len(), "Starting round");

        let mut events = self.inner.dispatcher.dispatch_all(
            prompt,
            &providers,
            self.inner.credentials.as_ref(),
            generation,
        );
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                inner.apply(event);
            }
        });

        Ok(generation)
    }

    /// Apply one provider outcome to the current round
    pub fn apply(&self, event: DispatchEvent) -> ApplyOutcome {
        self.inner.apply(event)
    }

    /// Drop the current round. In-flight calls finish but their results are discarded.
    pub fn end_chat(&self) {
        {
            let mut state = self.inner.lock();
            state.generation += 1;
            state.round = None;
        }
        self.inner.notify();
        info!("Conversation ended");
    }

    /// Synthesize the successful responses into one answer.
    ///
    /// Rejected without a network call unless at least two providers succeeded.
    /// May be retried after a failure; each attempt uses the records as they are
    /// at that moment.
    pub async fn summarize(&self) -> Result<String, SummaryError> {
        let (generation, prompt, records) = {
            let mut state = self.inner.lock();
            let generation = state.generation;
            let round = state.round.as_mut().ok_or(SummaryError::NoRound)?;

            if round.summary_status == Status::Pending {
                return Err(SummaryError::AlreadyRunning);
            }
            if !round.can_summarize() {
                return Err(SummaryError::NotEnoughResponses {
                    successful: round.success_count(),
                });
            }

            round.start_summary();
            (generation, round.original_prompt.clone(), round.successful())
        };
        self.inner.notify();

        let result = self.inner.summarizer.summarize(&prompt, &records).await;

        {
            let mut state = self.inner.lock();
            if state.generation != generation {
                debug!(generation, "Dropping summary from an earlier round");
                return Err(SummaryError::Superseded);
            }
            if let Some(round) = state.round.as_mut() {
                match &result {
                    Ok(summary) => round.finish_summary(summary.text.clone()),
                    Err(e) => round.fail_summary(e.to_string()),
                }
            }
        }
        self.inner.notify();

        result.map(|summary| summary.text)
    }

    /// Copy of the current round
    pub fn snapshot(&self) -> Option<ConversationSummary> {
        self.inner.lock().round.clone()
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    pub fn summarizer(&self) -> Provider {
        self.inner.summarizer.provider()
    }

    /// Revision counter bumped on every state change
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.updates.subscribe()
    }

    /// Wait until no record of the current round is pending
    pub async fn wait_settled(&self) -> Option<ConversationSummary> {
        let mut updates = self.subscribe();
        loop {
            match self.snapshot() {
                Some(round) if !round.is_settled() => {}
                settled => return settled,
            }
            if updates.changed().await.is_err() {
                return self.snapshot();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentials;
    use crate::llm::{NormalizedResult, ProviderAdapter};
    use pretty_assertions::assert_eq;

    struct EchoAdapter(Provider);

    #[async_trait::async_trait]
    impl ProviderAdapter for EchoAdapter {
        fn provider(&self) -> Provider {
            self.0
        }

        async fn send(&self, prompt: &str, _credential: &str) -> Result<NormalizedResult, ProviderError> {
            Ok(NormalizedResult {
                text: format!("{} heard: {}", self.0, prompt),
            })
        }
    }

    fn conversation(credentials: MemoryCredentials) -> Conversation {
        let credentials: Arc<dyn CredentialSource> = Arc::new(credentials);
        let adapters = AdapterSet::new()
            .with(Arc::new(EchoAdapter(Provider::OpenAi)))
            .with(Arc::new(EchoAdapter(Provider::Claude)))
            .with(Arc::new(EchoAdapter(Provider::Gemini)));
        let summarizer = SummaryEngine::new(Arc::new(EchoAdapter(Provider::Claude)), Arc::clone(&credentials));
        Conversation::new(Dispatcher::new(adapters), summarizer, credentials)
    }

    fn all_keys() -> MemoryCredentials {
        MemoryCredentials::new()
            .with("openai_api_key", "a")
            .with("claude_api_key", "b")
            .with("gemini_api_key", "c")
    }

    #[tokio::test]
    async fn test_submit_rejects_empty_input() {
        let convo = conversation(all_keys());
        assert_eq!(convo.submit("   ", &[Provider::OpenAi]), Err(RoundError::EmptyPrompt));
        assert_eq!(convo.submit("hi", &[]), Err(RoundError::NoProviders));
        assert!(convo.snapshot().is_none());
    }

    #[tokio::test]
    async fn test_records_created_before_dispatch() {
        let convo = conversation(MemoryCredentials::new().with("openai_api_key", "a"));
        convo.submit("hi", &[Provider::OpenAi, Provider::Gemini]).unwrap();

        let round = convo.snapshot().unwrap();
        assert_eq!(round.responses.len(), 2);
        assert_eq!(round.status_of(Provider::Gemini), Status::NoCredential);
        assert_eq!(round.status_of(Provider::Claude), Status::Disabled);
    }

    #[tokio::test]
    async fn test_stale_event_is_dropped() {
        let convo = conversation(all_keys());
        let first = convo.submit("one", &[Provider::Claude]).unwrap();
        let second = convo.submit("two", &[Provider::Claude]).unwrap();
        assert!(second > first);

        let stale = DispatchEvent {
            provider: Provider::Claude,
            generation: first,
            outcome: Ok(NormalizedResult {
                text: "old answer".to_string(),
            }),
        };
        assert_eq!(convo.apply(stale), ApplyOutcome::Stale);

        let round = convo.wait_settled().await.unwrap();
        assert_eq!(round.original_prompt, "two");
        assert_eq!(round.record(Provider::Claude).unwrap().content, "claude heard: two");
    }

    #[tokio::test]
    async fn test_blank_success_becomes_failure() {
        let convo = conversation(all_keys());
        let generation = convo.submit("hi", &[Provider::OpenAi]).unwrap();

        // The forwarding task has not run yet on the single-threaded test runtime
        let blank = DispatchEvent {
            provider: Provider::OpenAi,
            generation,
            outcome: Ok(NormalizedResult {
                text: "  ".to_string(),
            }),
        };
        assert_eq!(convo.apply(blank), ApplyOutcome::Applied);

        let round = convo.wait_settled().await.unwrap();
        let record = round.record(Provider::OpenAi).unwrap();
        assert_eq!(record.status, Status::Failed("empty response".to_string()));
        assert!(record.content.is_empty());
    }

    #[tokio::test]
    async fn test_late_duplicate_is_ignored() {
        let convo = conversation(all_keys());
        let generation = convo.submit("hi", &[Provider::OpenAi]).unwrap();
        convo.wait_settled().await.unwrap();

        let duplicate = DispatchEvent {
            provider: Provider::OpenAi,
            generation,
            outcome: Err(ProviderError::Truncated),
        };
        assert_eq!(convo.apply(duplicate), ApplyOutcome::Ignored);
        assert_eq!(
            convo.snapshot().unwrap().status_of(Provider::OpenAi),
            Status::Success
        );
    }

    #[tokio::test]
    async fn test_end_chat_clears_round() {
        let convo = conversation(all_keys());
        convo.submit("hi", &[Provider::OpenAi]).unwrap();
        let before = convo.generation();

        convo.end_chat();
        assert!(convo.snapshot().is_none());
        assert_eq!(convo.generation(), before + 1);
        assert_eq!(convo.summarize().await, Err(SummaryError::NoRound));
    }

    #[tokio::test]
    async fn test_follow_up_threads_previous_summary() {
        let convo = conversation(all_keys());
        convo.submit("What is TCP?", &[Provider::OpenAi, Provider::Gemini]).unwrap();
        convo.wait_settled().await.unwrap();
        convo.summarize().await.unwrap();

        convo.submit_follow_up("And UDP?", &[Provider::OpenAi]).unwrap();
        let round = convo.wait_settled().await.unwrap();

        assert_eq!(round.original_prompt, "And UDP?");
        let content = &round.record(Provider::OpenAi).unwrap().content;
        assert!(content.contains("Previous conversation:\nUser: What is TCP?"));
        assert!(content.ends_with("New question:\nAnd UDP?"));
    }
}
