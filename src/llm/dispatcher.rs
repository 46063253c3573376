//! Concurrent fan-out of one prompt to every selected provider

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::credentials::CredentialSource;
use crate::error::ProviderError;
use crate::llm::provider::{AdapterSet, NormalizedResult, Provider};

/// Outcome of one provider call, tagged with the round it belongs to
#[derive(Debug, Clone)]
pub struct DispatchEvent {
    pub provider: Provider,
    pub generation: u64,
    pub outcome: Result<NormalizedResult, ProviderError>,
}

/// Sends a prompt to several providers at once and reports each result as it lands
#[derive(Clone)]
pub struct Dispatcher {
    adapters: AdapterSet,
}

impl Dispatcher {
    pub fn new(adapters: AdapterSet) -> Self {
        Self { adapters }
    }

    pub fn adapters(&self) -> &AdapterSet {
        &self.adapters
    }

    /// Start one independent call per selected provider.
    ///
    /// Credentials are looked up before anything is spawned; a provider without
    /// one gets `MissingCredential` immediately and is never called. Events
    /// arrive in completion order, one per distinct provider. The channel closes
    /// once every call has reported.
    pub fn dispatch_all(
        &self,
        prompt: &str,
        selected: &[Provider],
        credentials: &dyn CredentialSource,
        generation: u64,
    ) -> mpsc::UnboundedReceiver<DispatchEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let prompt: Arc<str> = Arc::from(prompt);
        let mut seen = Vec::with_capacity(selected.len());

        for &provider in selected {
            if seen.contains(&provider) {
                continue;
            }
            seen.push(provider);

            let Some(credential) = credentials.get(provider.credential_key()) else {
                debug!(%provider, generation, "No credential, skipping call");
                let _ = tx.send(DispatchEvent {
                    provider,
                    generation,
                    outcome: Err(ProviderError::MissingCredential),
                });
                continue;
            };

            let Some(adapter) = self.adapters.get(provider) else {
                warn!(%provider, "No adapter registered");
                let _ = tx.send(DispatchEvent {
                    provider,
                    generation,
                    outcome: Err(ProviderError::NoAdapter),
                });
                continue;
            };

            let tx = tx.clone();
            let prompt = Arc::clone(&prompt);
            tokio::spawn(async move {
                debug!(%provider, generation, "Sending prompt");
                let outcome = adapter.send(&prompt, &credential).await;
                match &outcome {
                    Ok(result) => info!(%provider, generation, chars = result.text.len(), "Provider responded"),
                    Err(e) => warn!(%provider, generation, "Provider failed: {}", e),
                }
                // Receiver may be gone if the round was dropped
                let _ = tx.send(DispatchEvent {
                    provider,
                    generation,
                    outcome,
                });
            });
        }

        rx
    }
}
