//! Config loader — reads `~/.inkgate/config.json` and merges env vars.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.inkgate/config.json`
//! 3. Environment variables `INKGATE_<SECTION>__<FIELD>` (override JSON)
//! 4. Legacy variables (`ENCRYPTION_KEY`, `QWEN_API_KEY`, `QWEN_API_URL`,
//!    `QWEN_MODEL`), only where nothing above set a value

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::schema::{default_aliases, Config, DefaultProviderConfig};

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the given path (or the default one) + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);
    let config = load_config_from_path(&config_path);
    apply_env_overrides(config, |name| std::env::var(name).ok())
}

/// Load config from a specific file path, without env overrides.
fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return Config::default();
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return Config::default();
        }
    };

    let mut config: Config = match serde_json::from_str(&content) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to parse config JSON: {}", e);
            return Config::default();
        }
    };

    // User aliases extend the built-in table rather than replacing it.
    let mut aliases = default_aliases();
    aliases.extend(std::mem::take(&mut config.aliases));
    config.aliases = aliases;

    config
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> std::io::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;

    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Env var format: `INKGATE_<SECTION>__<FIELD>` (double underscore as delimiter).
///
/// Supported overrides:
/// - `INKGATE_ENCRYPTION__KEY` → `encryption.key`
/// - `INKGATE_GATEWAY__SYSTEM_PROMPT` → `gateway.system_prompt`
/// - `INKGATE_GATEWAY__MAX_MALFORMED_EVENTS` → `gateway.max_malformed_events`
/// - `INKGATE_GATEWAY__STREAM_BUFFER` → `gateway.stream_buffer`
/// - `INKGATE_TIMEOUTS__{CONNECT,REQUEST,STREAM,IDLE}_SECS` → `timeouts.*`
/// - `INKGATE_CREDENTIALS_FILE` → `credentials_file`
/// - `INKGATE_DEFAULT_PROVIDER__{PROVIDER,API_KEY,API_BASE,MODEL}` → `default_provider.*`
fn apply_env_overrides<F>(mut config: Config, env: F) -> Config
where
    F: Fn(&str) -> Option<String>,
{
    // Encryption
    if let Some(val) = env("INKGATE_ENCRYPTION__KEY") {
        config.encryption.key = val;
    } else if !config.encryption.is_configured() {
        if let Some(val) = env("ENCRYPTION_KEY") {
            debug!("Using legacy ENCRYPTION_KEY");
            config.encryption.key = val;
        }
    }

    // Gateway
    if let Some(val) = env("INKGATE_GATEWAY__SYSTEM_PROMPT") {
        config.gateway.system_prompt = val;
    }
    if let Some(n) = parse_env(&env, "INKGATE_GATEWAY__MAX_MALFORMED_EVENTS") {
        config.gateway.max_malformed_events = n;
    }
    if let Some(n) = parse_env(&env, "INKGATE_GATEWAY__STREAM_BUFFER") {
        config.gateway.stream_buffer = n;
    }

    // Timeouts
    if let Some(n) = parse_env(&env, "INKGATE_TIMEOUTS__CONNECT_SECS") {
        config.timeouts.connect_secs = n;
    }
    if let Some(n) = parse_env(&env, "INKGATE_TIMEOUTS__REQUEST_SECS") {
        config.timeouts.request_secs = n;
    }
    if let Some(n) = parse_env(&env, "INKGATE_TIMEOUTS__STREAM_SECS") {
        config.timeouts.stream_secs = n;
    }
    if let Some(n) = parse_env(&env, "INKGATE_TIMEOUTS__IDLE_SECS") {
        config.timeouts.idle_secs = n;
    }

    if let Some(val) = env("INKGATE_CREDENTIALS_FILE") {
        config.credentials_file = val;
    }

    apply_default_provider_env(&mut config, &env);

    config
}

/// Default provider: `INKGATE_DEFAULT_PROVIDER__*`, else the legacy Qwen variables.
fn apply_default_provider_env<F>(config: &mut Config, env: &F)
where
    F: Fn(&str) -> Option<String>,
{
    let provider = env("INKGATE_DEFAULT_PROVIDER__PROVIDER");
    let api_key = env("INKGATE_DEFAULT_PROVIDER__API_KEY");
    let api_base = env("INKGATE_DEFAULT_PROVIDER__API_BASE");
    let model = env("INKGATE_DEFAULT_PROVIDER__MODEL");

    if provider.is_some() || api_key.is_some() || api_base.is_some() || model.is_some() {
        let target = config.default_provider.get_or_insert_with(Default::default);
        if let Some(val) = provider {
            target.provider = val;
        }
        if let Some(val) = api_key {
            target.api_key = val;
        }
        if let Some(val) = api_base {
            target.api_base = Some(val);
        }
        if let Some(val) = model {
            target.model = Some(val);
        }
        return;
    }

    let configured = config
        .default_provider
        .as_ref()
        .is_some_and(DefaultProviderConfig::is_configured);
    if configured {
        return;
    }

    if let Some(api_key) = env("QWEN_API_KEY").filter(|k| !k.trim().is_empty()) {
        debug!("Using legacy QWEN_* variables for the default provider");
        config.default_provider = Some(DefaultProviderConfig {
            provider: "qwen".to_string(),
            api_key,
            api_base: env("QWEN_API_URL").filter(|v| !v.trim().is_empty()),
            model: env("QWEN_MODEL").filter(|v| !v.trim().is_empty()),
        });
    }
}

fn parse_env<F, T>(env: &F, name: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = env(name)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring {}: '{}' is not a valid number", name, raw);
            None
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
