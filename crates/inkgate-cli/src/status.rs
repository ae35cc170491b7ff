//! `inkgate status` — show configuration status.
//!
//! - Config path, encryption key and credential file
//! - Fallback provider
//! - Timeouts and stream limits

use anyhow::Result;
use colored::Colorize;

use inkgate_core::config::{get_config_path, load_config};
use inkgate_core::FernetCipher;

use crate::helpers::{self, mark};

/// Run the status command.
pub async fn run() -> Result<()> {
    let config = load_config(None);
    let config_path = get_config_path();

    println!();
    println!("{}", "Inkgate Status".cyan().bold());
    println!();

    println!(
        "  {:<18} {} {}",
        "Config:".bold(),
        config_path.display(),
        if config_path.exists() {
            "✓".green().to_string()
        } else {
            "(not found, using defaults)".red().to_string()
        }
    );

    let key_status = if !config.encryption.is_configured() {
        "· not configured".dimmed().to_string()
    } else if FernetCipher::new(&config.encryption.key).is_ok() {
        format!("{} (key set)", "✓".green())
    } else {
        "✗ invalid key".red().to_string()
    };
    println!("  {:<18} {}", "Encryption:".bold(), key_status);

    let creds_path = helpers::credentials_path(&config);
    let creds_status = if creds_path.exists() {
        match helpers::load_store(&config).await {
            Ok(store) => format!("{} ({} stored)", mark(true), store.len().await),
            Err(_) => "✗ unreadable".red().to_string(),
        }
    } else {
        "(not found)".dimmed().to_string()
    };
    println!(
        "  {:<18} {} {}",
        "Credentials:".bold(),
        creds_path.display(),
        creds_status
    );

    let fallback = match &config.default_provider {
        Some(d) if d.is_configured() => format!(
            "{} {} {}",
            mark(true),
            d.provider,
            d.model.as_deref().unwrap_or("(default model)").dimmed()
        ),
        _ => "· none".dimmed().to_string(),
    };
    println!("  {:<18} {}", "Fallback:".bold(), fallback);

    let t = &config.timeouts;
    println!(
        "  {:<18} {}",
        "Timeouts:".bold(),
        format!(
            "connect {}s | request {}s | stream {}s | idle {}s",
            t.connect_secs, t.request_secs, t.stream_secs, t.idle_secs
        )
        .dimmed()
    );
    println!(
        "  {:<18} {}",
        "Streaming:".bold(),
        format!(
            "buffer {} | max malformed events {}",
            config.gateway.stream_buffer, config.gateway.max_malformed_events
        )
        .dimmed()
    );

    println!();
    Ok(())
}
