//! `inkgate keys` — manage stored provider credentials.
//!
//! - `inkgate keys add -u USER --platform NAME --key KEY [--base-url URL] [--model M]`
//! - `inkgate keys list -u USER`
//! - `inkgate keys remove -u USER ID`
//!
//! Keys are encrypted with the configured Fernet key before they are written.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use inkgate_core::config::{load_config, Config};
use inkgate_core::{mask_api_key, CredentialCipher, CredentialId, ProviderConfig, UserId};
use inkgate_gateway::PlatformAliases;
use inkgate_providers::resolve;

use crate::helpers;

// ─────────────────────────────────────────────
// Subcommand enum
// ─────────────────────────────────────────────

/// Keys subcommands.
#[derive(Subcommand)]
pub enum KeysCommands {
    /// Store a new credential
    Add {
        /// Owner of the credential
        #[arg(short, long)]
        user: i64,

        /// Provider id or vendor label (e.g. "qwen", "Anthropic")
        #[arg(long)]
        platform: String,

        /// API key ("API_KEY,SECRET_KEY" for Ernie)
        #[arg(short, long)]
        key: String,

        /// Base URL override
        #[arg(long)]
        base_url: Option<String>,

        /// Model override
        #[arg(short, long)]
        model: Option<String>,
    },

    /// List a user's credentials (keys masked)
    List {
        #[arg(short, long)]
        user: i64,
    },

    /// Remove a credential by ID
    Remove {
        #[arg(short, long)]
        user: i64,

        /// Credential ID
        id: i64,
    },
}

// ─────────────────────────────────────────────
// Dispatcher
// ─────────────────────────────────────────────

/// Dispatch a keys subcommand.
pub async fn dispatch(cmd: KeysCommands) -> Result<()> {
    let config = load_config(None);
    match cmd {
        KeysCommands::Add {
            user,
            platform,
            key,
            base_url,
            model,
        } => {
            let added = add_key(&config, UserId(user), &platform, &key, base_url, model).await?;
            println!(
                "  {} added credential {} ({}, key {})",
                "✓".green(),
                added.id,
                added.platform,
                mask_api_key(&key)
            );
            Ok(())
        }
        KeysCommands::List { user } => list_keys(&config, UserId(user)).await,
        KeysCommands::Remove { user, id } => {
            remove_key(&config, UserId(user), CredentialId(id)).await?;
            println!("  {} removed credential {}", "✓".green(), id);
            Ok(())
        }
    }
}

async fn add_key(
    config: &Config,
    user: UserId,
    platform: &str,
    key: &str,
    base_url: Option<String>,
    model: Option<String>,
) -> Result<ProviderConfig> {
    let provider_id = PlatformAliases::new(config.aliases.clone()).canonical(platform);
    resolve(&provider_id)?;

    let cipher = helpers::open_cipher(config)?;
    let store = helpers::load_store(config).await?;
    let added = store
        .add(user, platform, cipher.encrypt(key.trim()), base_url, model)
        .await?;
    store
        .save(&helpers::credentials_path(config))
        .await
        .context("failed to write credentials file")?;
    Ok(added)
}

async fn remove_key(config: &Config, user: UserId, id: CredentialId) -> Result<()> {
    let store = helpers::load_store(config).await?;
    store.remove(user, id).await?;
    store
        .save(&helpers::credentials_path(config))
        .await
        .context("failed to write credentials file")
}

async fn list_keys(config: &Config, user: UserId) -> Result<()> {
    let cipher = helpers::open_cipher(config)?;
    let store = helpers::load_store(config).await?;
    let configs = store.list_for_user(user).await;

    println!();
    if configs.is_empty() {
        println!("  {}", format!("no credentials for user {user}").dimmed());
        println!();
        return Ok(());
    }

    println!(
        "  {:<5} {:<12} {:<28} {:<16} {}",
        "ID".bold(),
        "PLATFORM".bold(),
        "MODEL".bold(),
        "KEY".bold(),
        "LAST USED".bold()
    );
    for c in &configs {
        println!(
            "  {:<5} {:<12} {:<28} {:<16} {}",
            c.id.to_string(),
            c.platform,
            c.model_name.as_deref().unwrap_or("(default)"),
            masked_key(&cipher, c),
            c.last_used_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "never".into())
        );
    }
    println!();
    Ok(())
}

fn masked_key(cipher: &dyn CredentialCipher, config: &ProviderConfig) -> String {
    match cipher.decrypt(&config.encrypted_api_key) {
        Ok(key) => mask_api_key(key.expose()),
        Err(_) => "<unreadable>".into(),
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
