//! Configuration schema.
//!
//! Hierarchy: `Config` → `GatewayConfig`, `TimeoutsConfig`, `EncryptionConfig`,
//! `DefaultProviderConfig`, plus the platform alias table.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::DEFAULT_SYSTEM_PROMPT;

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration, loaded from `~/.inkgate/config.json` + env vars.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub timeouts: TimeoutsConfig,
    /// Stored platform label → registry provider id.
    pub aliases: HashMap<String, String>,
    pub encryption: EncryptionConfig,
    /// JSON credential file used by the CLI's store.
    pub credentials_file: String,
    /// Fallback provider used when a user has no stored configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_provider: Option<DefaultProviderConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            timeouts: TimeoutsConfig::default(),
            aliases: default_aliases(),
            encryption: EncryptionConfig::default(),
            credentials_file: "~/.inkgate/credentials.json".to_string(),
            default_provider: None,
        }
    }
}

/// The built-in platform label table.
pub fn default_aliases() -> HashMap<String, String> {
    [
        ("OpenAI", "openai"),
        ("Anthropic", "anthropic"),
        ("Google", "gemini"),
        ("Alibaba", "qwen"),
        ("Baidu", "ernie"),
        ("iFlytek", "spark"),
        ("Zhipu", "glm"),
        ("Meta", "llama"),
    ]
    .into_iter()
    .map(|(label, id)| (label.to_string(), id.to_string()))
    .collect()
}

// ─────────────────────────────────────────────
// Gateway
// ─────────────────────────────────────────────

/// Generation behaviour shared by every provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayConfig {
    /// System prompt used when a request does not carry one.
    pub system_prompt: String,
    /// Consecutive malformed stream events tolerated before failing.
    pub max_malformed_events: u32,
    /// Capacity of the channel between the stream worker and the caller.
    pub stream_buffer: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_malformed_events: 8,
            stream_buffer: 32,
        }
    }
}

// ─────────────────────────────────────────────
// Timeouts
// ─────────────────────────────────────────────

/// Network timeouts, in seconds. Applied uniformly to every provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeoutsConfig {
    pub connect_secs: u64,
    /// Whole-request limit for single-shot calls.
    pub request_secs: u64,
    /// Whole-stream limit for streaming calls.
    pub stream_secs: u64,
    /// Longest silence tolerated between two stream chunks.
    pub idle_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            request_secs: 120,
            stream_secs: 600,
            idle_secs: 60,
        }
    }
}

impl TimeoutsConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs.max(1))
    }

    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs.max(1))
    }

    pub fn stream(&self) -> Duration {
        Duration::from_secs(self.stream_secs.max(1))
    }

    pub fn idle(&self) -> Duration {
        Duration::from_secs(self.idle_secs.max(1))
    }
}

// ─────────────────────────────────────────────
// Encryption
// ─────────────────────────────────────────────

/// Credential encryption settings.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EncryptionConfig {
    /// URL-safe base64 Fernet key (32 bytes). Empty means unset.
    pub key: String,
}

impl EncryptionConfig {
    pub fn is_configured(&self) -> bool {
        !self.key.trim().is_empty()
    }
}

impl std::fmt::Debug for EncryptionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionConfig")
            .field("key", &if self.is_configured() { "<set>" } else { "<unset>" })
            .finish()
    }
}

// ─────────────────────────────────────────────
// Default provider
// ─────────────────────────────────────────────

/// Deployment-wide fallback provider, with a plaintext API key.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DefaultProviderConfig {
    /// Registry id or platform label (e.g. `"qwen"`).
    pub provider: String,
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl DefaultProviderConfig {
    /// Whether a provider and a key are both present.
    pub fn is_configured(&self) -> bool {
        !self.provider.trim().is_empty() && !self.api_key.trim().is_empty()
    }
}

impl std::fmt::Debug for DefaultProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultProviderConfig")
            .field("provider", &self.provider)
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
