//! Inkgate CLI — entry point.
//!
//! # Commands
//!
//! - `inkgate generate -u USER -p PROMPT [--stream]` — run one generation
//! - `inkgate providers` — list supported providers
//! - `inkgate keys add|list|remove` — manage stored credentials
//! - `inkgate keygen` — print a fresh encryption key
//! - `inkgate onboard` — create the config file with an encryption key
//! - `inkgate status` — show configuration status

mod generate;
mod helpers;
mod keys_cmd;
mod onboard;
mod providers_cmd;
mod status;

use anyhow::Result;
use clap::{Parser, Subcommand};

use inkgate_core::FernetCipher;

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// Inkgate — one gateway to many AI text providers
#[derive(Parser)]
#[command(name = "inkgate", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate text with the user's configured provider
    Generate(generate::GenerateArgs),

    /// List supported providers and their defaults
    Providers,

    /// Manage stored provider credentials
    Keys {
        #[command(subcommand)]
        action: keys_cmd::KeysCommands,
    },

    /// Print a freshly generated encryption key
    Keygen,

    /// Create the configuration file with a fresh encryption key
    Onboard,

    /// Show configuration status
    Status,
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate(args) => {
            init_logging(args.logs);
            generate::run(args).await
        }
        Commands::Providers => {
            providers_cmd::run();
            Ok(())
        }
        Commands::Keys { action } => {
            init_logging(false);
            keys_cmd::dispatch(action).await
        }
        Commands::Keygen => {
            println!("{}", FernetCipher::generate_key());
            Ok(())
        }
        Commands::Onboard => onboard::run(),
        Commands::Status => status::run().await,
    }
}

/// Initialize tracing/logging.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("inkgate=debug,info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
