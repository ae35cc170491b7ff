//! Shared CLI helpers — path expansion, cipher and store setup, error output.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use colored::Colorize;

use inkgate_core::config::Config;
use inkgate_core::{FernetCipher, InMemoryCredentialStore};
use inkgate_gateway::GatewayError;

/// Expand `~` at the start of a path to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_next::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs_next::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// Location of the credential file.
pub fn credentials_path(config: &Config) -> PathBuf {
    expand_tilde(&config.credentials_file)
}

/// The Fernet cipher for the configured key.
pub fn open_cipher(config: &Config) -> Result<FernetCipher> {
    if !config.encryption.is_configured() {
        bail!(
            "no encryption key configured; run `inkgate onboard`, or set encryption.key \
             in the config file or INKGATE_ENCRYPTION__KEY"
        );
    }
    FernetCipher::new(&config.encryption.key).context("encryption key is not usable")
}

/// Load the credential file (an absent file is an empty store).
pub async fn load_store(config: &Config) -> Result<InMemoryCredentialStore> {
    let path = credentials_path(config);
    InMemoryCredentialStore::load(&path)
        .await
        .with_context(|| format!("failed to read credentials from {}", path.display()))
}

/// Print a gateway error the way an end user should see it.
pub fn print_gateway_error(err: &GatewayError) {
    eprintln!("{} {}", "✗".red().bold(), err.user_message());
    if err.is_retryable() {
        eprintln!("{}", "  (temporary problem, retrying later may help)".dimmed());
    }
}

/// Green check or dimmed dot for status lines.
pub fn mark(ok: bool) -> String {
    if ok {
        "✓".green().to_string()
    } else {
        "·".dimmed().to_string()
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
