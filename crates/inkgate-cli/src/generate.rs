//! `inkgate generate` — run one generation through the gateway.

use std::io::Write;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Args;
use colored::Colorize;
use futures_util::StreamExt;
use tracing::debug;

use inkgate_core::config::{load_config, Config};
use inkgate_core::{
    CredentialId, CredentialStore, GenerationMode, GenerationRequest, InMemoryCredentialStore,
    UserId,
};
use inkgate_gateway::{fallback_config, GenerationResult, GenerationStream, Orchestrator};

use crate::helpers;

#[derive(Args)]
pub struct GenerateArgs {
    /// User whose credentials are used
    #[arg(short, long)]
    pub user: i64,

    /// Prompt text
    #[arg(short, long)]
    pub prompt: String,

    /// System prompt (defaults to gateway.systemPrompt)
    #[arg(short, long)]
    pub system: Option<String>,

    /// Stream the response as it is generated
    #[arg(long, default_value_t = false)]
    pub stream: bool,

    /// Use this stored credential instead of the preferred one
    #[arg(long)]
    pub config_id: Option<i64>,

    /// Enable debug logging
    #[arg(long, default_value_t = false)]
    pub logs: bool,
}

pub async fn run(args: GenerateArgs) -> Result<()> {
    let config = load_config(None);
    let store = Arc::new(helpers::load_store(&config).await?);
    let orchestrator = build_orchestrator(&config, store.clone())?;
    let request = build_request(&args, store.as_ref()).await?;

    let result = match orchestrator.generate(request).await {
        Ok(result) => result,
        Err(err) => {
            debug!(error = %err, "Generation failed");
            helpers::print_gateway_error(&err);
            return Err(anyhow!("generation failed"));
        }
    };

    // Persist last-used bookkeeping.
    store
        .save(&helpers::credentials_path(&config))
        .await
        .context("failed to update credentials file")?;

    match result {
        GenerationResult::Complete(text) => {
            println!("{text}");
            Ok(())
        }
        GenerationResult::Stream(stream) => print_stream(stream).await,
    }
}

fn build_orchestrator(config: &Config, store: Arc<InMemoryCredentialStore>) -> Result<Orchestrator> {
    let cipher = Arc::new(helpers::open_cipher(config)?);
    let fallback = config
        .default_provider
        .as_ref()
        .and_then(|d| fallback_config(d, cipher.as_ref()));

    let orchestrator = Orchestrator::new(store, cipher, config)
        .context("failed to initialise HTTP transport")?;
    Ok(match fallback {
        Some(fallback) => orchestrator.with_fallback(fallback),
        None => orchestrator,
    })
}

async fn build_request(args: &GenerateArgs, store: &InMemoryCredentialStore) -> Result<GenerationRequest> {
    let user_id = UserId(args.user);
    let mode = if args.stream {
        GenerationMode::Stream
    } else {
        GenerationMode::Complete
    };

    let mut request = GenerationRequest::new(user_id, args.prompt.clone(), mode);
    if let Some(system) = &args.system {
        request = request.with_system_prompt(system.clone());
    }
    if let Some(id) = args.config_id {
        let config = store
            .fetch_config(user_id, CredentialId(id))
            .await?
            .with_context(|| format!("user {user_id} has no credential {id}"))?;
        request = request.with_config(config);
    }
    Ok(request)
}

/// Write chunks to stdout as they arrive. Ctrl-C cancels the upstream call.
async fn print_stream(mut stream: GenerationStream) -> Result<()> {
    let mut stdout = std::io::stdout();
    let mut chars = 0usize;

    loop {
        let next = tokio::select! {
            next = stream.next() => next,
            _ = tokio::signal::ctrl_c() => {
                stream.cancel();
                eprintln!();
                eprintln!("{}", "(cancelled)".yellow());
                return Ok(());
            }
        };

        match next {
            Some(Ok(chunk)) => {
                chars += chunk.content.chars().count();
                write!(stdout, "{}", chunk.content)?;
                stdout.flush()?;
            }
            Some(Err(err)) => {
                println!();
                if stream.chunks_received() > 0 {
                    eprintln!("{}", "(output above is incomplete)".dimmed());
                }
                helpers::print_gateway_error(&err);
                return Err(anyhow!("stream failed"));
            }
            None => break,
        }
    }

    println!();
    eprintln!(
        "{}",
        format!(
            "{} via {} · {} chunks, {} chars",
            stream.model(),
            stream.provider(),
            stream.chunks_received(),
            chars
        )
        .dimmed()
    );
    Ok(())
}
