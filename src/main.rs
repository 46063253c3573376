//! Polyglot - ask ChatGPT, Claude and Gemini the same question at once
//!
//! Answers are printed as each provider finishes, and can be merged into
//! one summary by the designated summarizer.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use polyglot::credentials::{mask_secret, EnvCredentials, FileCredentials, LayeredCredentials};
use polyglot::{Config, Conversation, ConversationSummary, CredentialSource, Provider, ResponseRecord, Status};

/// How long the process keeps serving the clipboard on Linux
#[cfg(target_os = "linux")]
const CLIPBOARD_HOLD: std::time::Duration = std::time::Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(long, default_value_t = false, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a prompt to the selected providers
    Ask {
        /// The question to ask
        prompt: String,

        /// Provider to include (openai, claude, gemini); repeatable, defaults to all enabled
        #[arg(short, long = "provider")]
        providers: Vec<Provider>,

        /// Merge the answers into one summary
        #[arg(short, long, default_value_t = false)]
        summarize: bool,

        /// Copy the summary to the clipboard
        #[arg(long, default_value_t = false)]
        copy: bool,

        /// Ask one follow-up question with the summary as context
        #[arg(long)]
        follow_up: Option<String>,
    },

    /// Manage stored API keys
    Keys {
        #[command(subcommand)]
        action: KeysAction,
    },
}

#[derive(Subcommand, Debug)]
enum KeysAction {
    /// Show which providers have a key
    List,

    /// Store a key for a provider
    Set { provider: Provider, value: String },

    /// Remove a provider's stored key
    Delete { provider: Provider },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    let config = Config::load(args.config.as_deref())?;
    let store = Arc::new(FileCredentials::open(config.credentials_path())?);

    match args.command {
        Command::Ask {
            prompt,
            providers,
            summarize,
            copy,
            follow_up,
        } => {
            let mut credentials = LayeredCredentials::new(store);
            if config.credentials.allow_env {
                credentials = credentials.with_fallback(Arc::new(EnvCredentials));
            }
            let credentials: Arc<dyn CredentialSource> = Arc::new(credentials);

            let selected = select_providers(&config, &providers)?;
            let conversation = Conversation::from_config(&config, credentials)?;
            run_ask(&conversation, &prompt, &selected, summarize, copy, follow_up.as_deref()).await
        }
        Command::Keys { action } => run_keys(&store, action),
    }
}

/// Requested providers minus the ones disabled in config
fn select_providers(config: &Config, requested: &[Provider]) -> Result<Vec<Provider>> {
    let enabled = config.enabled_providers();
    if requested.is_empty() {
        return Ok(enabled);
    }

    let selected: Vec<Provider> = requested
        .iter()
        .copied()
        .filter(|p| {
            let ok = enabled.contains(p);
            if !ok {
                warn!(provider = %p, "Provider is disabled in config, skipping");
            }
            ok
        })
        .collect();

    if selected.is_empty() {
        return Err(anyhow!("None of the requested providers are enabled"));
    }
    Ok(selected)
}

async fn run_ask(
    conversation: &Conversation,
    prompt: &str,
    selected: &[Provider],
    summarize: bool,
    copy: bool,
    follow_up: Option<&str>,
) -> Result<()> {
    conversation.submit(prompt, selected)?;
    let Some(round) = watch_round(conversation).await else {
        return Ok(());
    };

    let mut summary = None;
    if summarize || copy || follow_up.is_some() {
        summary = summarize_round(conversation, &round).await;
    }

    let clipboard = match (copy, summary) {
        (true, Some(text)) => Some(tokio::task::spawn_blocking(move || copy_to_clipboard(text))),
        _ => None,
    };

    if let Some(question) = follow_up {
        println!("\n>>> {}\n", question);
        conversation.submit_follow_up(question, selected)?;
        watch_round(conversation).await;
    }

    if let Some(handle) = clipboard {
        handle.await??;
    }

    Ok(())
}

/// Place the summary on the system clipboard
#[cfg(target_os = "linux")]
fn copy_to_clipboard(text: String) -> Result<()> {
    use arboard::SetExtLinux;

    // X11 and Wayland selections live only as long as their owner, so keep
    // serving until a clipboard manager takes over or the hold expires
    let mut clipboard = arboard::Clipboard::new()?;
    println!(
        "Summary copied to clipboard (kept for up to {}s unless a clipboard manager takes it).",
        CLIPBOARD_HOLD.as_secs()
    );
    clipboard
        .set()
        .wait_until(std::time::Instant::now() + CLIPBOARD_HOLD)
        .text(text)?;
    tracing::debug!("Released clipboard");
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn copy_to_clipboard(text: String) -> Result<()> {
    let mut clipboard = arboard::Clipboard::new()?;
    clipboard.set_text(text)?;
    println!("Summary copied to clipboard.");
    Ok(())
}

/// Print each record as it settles; Ctrl-C abandons the round
async fn watch_round(conversation: &Conversation) -> Option<ConversationSummary> {
    let printer = async {
        let mut updates = conversation.subscribe();
        let mut printed: Vec<Provider> = Vec::new();
        loop {
            let Some(round) = conversation.snapshot() else {
                return None;
            };
            for record in &round.responses {
                if record.status.is_terminal() && !printed.contains(&record.provider) {
                    print_record(record);
                    printed.push(record.provider);
                }
            }
            if round.is_settled() {
                return Some(round);
            }
            if updates.changed().await.is_err() {
                return conversation.snapshot();
            }
        }
    };

    tokio::select! {
        round = printer => round,
        _ = tokio::signal::ctrl_c() => {
            conversation.end_chat();
            println!("\nConversation ended.");
            None
        }
    }
}

async fn summarize_round(conversation: &Conversation, round: &ConversationSummary) -> Option<String> {
    if !round.can_summarize() {
        println!(
            "\nSummary unavailable: need at least 2 successful responses (have {}).",
            round.success_count()
        );
        return None;
    }

    println!(
        "\nGenerating summary with {}...",
        conversation.summarizer().display_name()
    );
    match conversation.summarize().await {
        Ok(text) => {
            let time = conversation
                .snapshot()
                .and_then(|r| r.timestamp)
                .map(|t| t.format("%H:%M").to_string())
                .unwrap_or_default();
            println!("\n=== Summary {} ===\n{}", time, text);
            Some(text)
        }
        Err(e) => {
            println!("\nSummary failed: {}", e);
            None
        }
    }
}

fn print_record(record: &ResponseRecord) {
    let time = record
        .timestamp
        .map(|t| format!(" {}", t.format("%H:%M")))
        .unwrap_or_default();
    println!(
        "\n=== {} [{}]{} ===",
        record.provider.display_name(),
        record.status.status_text(),
        time
    );
    if record.status == Status::Success {
        println!("{}", record.content);
    }
}

fn run_keys(store: &FileCredentials, action: KeysAction) -> Result<()> {
    match action {
        KeysAction::List => {
            println!("Keys stored in {}", store.path().display());
            for provider in Provider::ALL {
                let value = store
                    .get(provider.credential_key())
                    .map(|k| mask_secret(&k))
                    .unwrap_or_else(|| "(none)".to_string());
                println!("  {:<20} {}", provider.display_name(), value);
            }
        }
        KeysAction::Set { provider, value } => {
            if !store.set(provider.credential_key(), &value) {
                return Err(anyhow!("Failed to save API key for {}", provider.display_name()));
            }
            println!("{} API key saved", provider.display_name());
        }
        KeysAction::Delete { provider } => {
            if !store.delete(provider.credential_key()) {
                return Err(anyhow!("No stored API key for {}", provider.display_name()));
            }
            println!("{} API key deleted", provider.display_name());
        }
    }
    Ok(())
}
