//! Core types for Inkgate — provider configurations, generation requests,
//! and the text chunks produced by streaming generation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// System prompt used when the caller does not supply one.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

// ─────────────────────────────────────────────
// Identifiers
// ─────────────────────────────────────────────

/// Identifier of an application user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one stored provider credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialId(pub i64);

impl CredentialId {
    /// Id of a configuration that exists only in memory (never stored).
    pub const UNSTORED: CredentialId = CredentialId(0);
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─────────────────────────────────────────────
// ProviderConfig — one stored credential
// ─────────────────────────────────────────────

/// How to reach one upstream AI service on behalf of one user.
///
/// Owned by the credential subsystem; the gateway only reads it. The API key
/// is stored as a Fernet token and is redacted from `Debug` output.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub id: CredentialId,
    /// User that owns this credential.
    pub owner: UserId,
    /// Platform label as stored (e.g. `"OpenAI"`, `"Alibaba"`, or a registry id).
    pub platform: String,
    /// Encrypted API key (Fernet token).
    pub encrypted_api_key: String,
    /// Base URL override. `None` means the provider default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Model override. `None` means the provider default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Last time a generation used this credential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ProviderConfig {
    /// Create a config with no overrides, created now.
    pub fn new(
        id: CredentialId,
        owner: UserId,
        platform: impl Into<String>,
        encrypted_api_key: impl Into<String>,
    ) -> Self {
        Self {
            id,
            owner,
            platform: platform.into(),
            encrypted_api_key: encrypted_api_key.into(),
            base_url: None,
            model_name: None,
            created_at: Utc::now(),
            last_used_at: None,
        }
    }

    /// Set the base URL override. Blank strings count as no override.
    pub fn with_base_url(mut self, base_url: Option<impl Into<String>>) -> Self {
        self.base_url = base_url.map(Into::into).filter(|u: &String| !u.trim().is_empty());
        self
    }

    /// Set the model override. Blank strings count as no override.
    pub fn with_model(mut self, model: Option<impl Into<String>>) -> Self {
        self.model_name = model.map(Into::into).filter(|m: &String| !m.trim().is_empty());
        self
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("platform", &self.platform)
            .field("encrypted_api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model_name", &self.model_name)
            .field("created_at", &self.created_at)
            .field("last_used_at", &self.last_used_at)
            .finish()
    }
}

// ─────────────────────────────────────────────
// ApiKey — decrypted, call-scoped secret
// ─────────────────────────────────────────────

/// A decrypted API key. Zeroed on drop, redacted from `Debug`.
pub struct ApiKey(Zeroizing<String>);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        ApiKey(Zeroizing::new(key.into()))
    }

    /// Borrow the plaintext for attaching to a single request.
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    /// Whether the key is empty or whitespace only.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

// ─────────────────────────────────────────────
// Generation request
// ─────────────────────────────────────────────

/// Single-shot completion or incremental streaming.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    Complete,
    Stream,
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationMode::Complete => f.write_str("complete"),
            GenerationMode::Stream => f.write_str("stream"),
        }
    }
}

/// One generation call. Created per call, never persisted.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
    pub user_id: UserId,
    pub prompt: String,
    /// `None` means the gateway's configured default system prompt.
    pub system_prompt: Option<String>,
    pub mode: GenerationMode,
    /// A credential the caller picked explicitly. Must belong to `user_id`.
    pub explicit_config: Option<ProviderConfig>,
}

impl GenerationRequest {
    /// A single-shot completion request.
    pub fn complete(user_id: UserId, prompt: impl Into<String>) -> Self {
        Self::new(user_id, prompt, GenerationMode::Complete)
    }

    /// A streaming request.
    pub fn stream(user_id: UserId, prompt: impl Into<String>) -> Self {
        Self::new(user_id, prompt, GenerationMode::Stream)
    }

    pub fn new(user_id: UserId, prompt: impl Into<String>, mode: GenerationMode) -> Self {
        Self {
            user_id,
            prompt: prompt.into(),
            system_prompt: None,
            mode,
            explicit_config: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    /// Use this configuration instead of the store's preferred one. A stored
    /// configuration is re-read from the store, so only its id matters.
    pub fn with_config(mut self, config: ProviderConfig) -> Self {
        self.explicit_config = Some(config);
        self
    }
}

/// One text delta of a streamed generation. Never empty.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    pub content: String,
}

impl TextChunk {
    pub fn new(content: impl Into<String>) -> Self {
        TextChunk {
            content: content.into(),
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
