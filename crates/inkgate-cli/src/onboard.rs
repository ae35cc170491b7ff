//! `inkgate onboard` — create `~/.inkgate/config.json` with a fresh
//! encryption key.

use anyhow::{Context, Result};
use colored::Colorize;

use inkgate_core::config::{get_config_path, save_config, Config};
use inkgate_core::FernetCipher;

/// Run the onboard command.
pub fn run() -> Result<()> {
    println!();
    println!("{}", "Inkgate — Setup".cyan().bold());
    println!();

    let config_path = get_config_path();
    if config_path.exists() {
        println!(
            "  {} config already exists at {}",
            "✓".green(),
            config_path.display()
        );
    } else {
        let mut config = Config::default();
        config.encryption.key = FernetCipher::generate_key();
        save_config(&config, Some(&config_path))
            .with_context(|| format!("failed to write {}", config_path.display()))?;
        println!(
            "  {} created config at {}",
            "✓".green(),
            config_path.display()
        );
        println!(
            "  {} generated encryption key {}",
            "✓".green(),
            "(keep a backup: stored credentials cannot be read without it)".dimmed()
        );
    }

    println!();
    println!(
        "{}",
        "  Setup complete! Add a key with `inkgate keys add`.".green()
    );
    println!();

    Ok(())
}
