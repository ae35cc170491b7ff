//! Error taxonomy shared by the provider adapters and the orchestrator.
//!
//! Every upstream failure ends up as a [`ProviderCallError`] whose
//! [`CallErrorKind`] lets callers tell a bad API key from rate limiting from
//! a generic upstream failure without parsing message strings.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::types::CredentialId;

// ─────────────────────────────────────────────
// Registry / construction errors
// ─────────────────────────────────────────────

/// Requested provider id is not in the adapter registry.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unsupported provider '{requested}' (supported: {})", .supported.join(", "))]
pub struct UnsupportedProviderError {
    pub requested: String,
    pub supported: Vec<String>,
}

/// An adapter could not be constructed. Configuration problem, never transient.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AdapterInitError {
    #[error("{provider}: API key is empty")]
    MissingApiKey { provider: String },

    #[error("{provider}: credential must have the form 'API_KEY,SECRET_KEY'")]
    MalformedCredential { provider: String },

    #[error("{provider}: invalid base URL '{url}'")]
    InvalidBaseUrl { provider: String, url: String },

    #[error("HTTP transport unavailable: {reason}")]
    Transport { reason: String },
}

// ─────────────────────────────────────────────
// ProviderCallError
// ─────────────────────────────────────────────

/// Coarse classification of an upstream failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallErrorKind {
    /// HTTP 401/403 or a provider-specific invalid-key code.
    Authentication,
    /// HTTP 429 or a provider-specific quota/QPS code.
    RateLimited,
    /// Connect, request, or stream idle timeout.
    Timeout,
    /// Connection-level failure before a response arrived.
    Network,
    /// Any other non-2xx status or provider-reported error.
    Upstream,
    /// The provider answered 2xx with a body we could not interpret.
    InvalidResponse,
}

/// Provider error codes that mean "the credential is wrong".
const AUTH_CODES: &[&str] = &[
    "invalid_api_key",
    "authentication_error",
    "permission_error",
    "API_KEY_INVALID",
    "UNAUTHENTICATED",
    "PERMISSION_DENIED",
    // Baidu Ernie
    "13",
    "14",
    "110",
    "111",
    // iFlytek Spark
    "11200",
];

/// Provider error codes that mean "slow down".
const RATE_LIMIT_CODES: &[&str] = &[
    "rate_limit_exceeded",
    "rate_limit_error",
    "RESOURCE_EXHAUSTED",
    // Baidu Ernie
    "4",
    "17",
    "18",
    "336501",
    "336502",
    // iFlytek Spark
    "11201",
    "11202",
    "11203",
];

impl CallErrorKind {
    /// Classify by HTTP status first, then by provider error code.
    pub fn classify(status: Option<u16>, code: Option<&str>) -> Self {
        match status {
            Some(401) | Some(403) => return CallErrorKind::Authentication,
            Some(429) => return CallErrorKind::RateLimited,
            Some(408) | Some(504) => return CallErrorKind::Timeout,
            _ => {}
        }

        match code {
            Some(c) if AUTH_CODES.iter().any(|k| k.eq_ignore_ascii_case(c)) => {
                CallErrorKind::Authentication
            }
            Some(c) if RATE_LIMIT_CODES.iter().any(|k| k.eq_ignore_ascii_case(c)) => {
                CallErrorKind::RateLimited
            }
            _ => CallErrorKind::Upstream,
        }
    }
}

impl fmt::Display for CallErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CallErrorKind::Authentication => "authentication",
            CallErrorKind::RateLimited => "rate limited",
            CallErrorKind::Timeout => "timeout",
            CallErrorKind::Network => "network",
            CallErrorKind::Upstream => "upstream",
            CallErrorKind::InvalidResponse => "invalid response",
        };
        f.write_str(s)
    }
}

/// A failed call to an upstream provider.
///
/// `message` keeps the upstream text for diagnostics. It may leak provider
/// internals, so it is not meant to be shown to end users verbatim.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{provider} call failed ({kind}): {message}")]
pub struct ProviderCallError {
    pub provider: String,
    pub kind: CallErrorKind,
    pub status: Option<u16>,
    pub code: Option<String>,
    pub message: String,
}

impl ProviderCallError {
    pub fn new(provider: impl Into<String>, kind: CallErrorKind, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            kind,
            status: None,
            code: None,
            message: message.into(),
        }
    }

    /// Build from a non-2xx response, classifying by status and code.
    pub fn from_status(
        provider: impl Into<String>,
        status: u16,
        code: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            kind: CallErrorKind::classify(Some(status), code.as_deref()),
            status: Some(status),
            code,
            message: message.into(),
        }
    }

    /// Build from an error payload delivered inside a 2xx response or stream.
    pub fn from_payload(
        provider: impl Into<String>,
        code: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            kind: CallErrorKind::classify(None, code.as_deref()),
            status: None,
            code,
            message: message.into(),
        }
    }

    pub fn invalid_response(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, CallErrorKind::InvalidResponse, message)
    }

    pub fn is_authentication(&self) -> bool {
        self.kind == CallErrorKind::Authentication
    }

    pub fn is_rate_limited(&self) -> bool {
        self.kind == CallErrorKind::RateLimited
    }

    /// Whether repeating the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            CallErrorKind::RateLimited | CallErrorKind::Timeout | CallErrorKind::Network
        ) || matches!(self.status, Some(s) if s >= 500)
    }
}

// ─────────────────────────────────────────────
// Credential errors
// ─────────────────────────────────────────────

/// The stored credential could not be decrypted.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecryptionError {
    #[error("invalid encryption key: {0}")]
    InvalidKey(String),

    #[error("credential ciphertext is not valid base64")]
    Encoding,

    #[error("credential ciphertext is malformed")]
    Malformed,

    #[error("credential signature mismatch (wrong key or tampered ciphertext)")]
    SignatureMismatch,

    #[error("decrypted credential is not valid UTF-8")]
    Utf8,
}

/// Failures of the credential store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("credential store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("credential store file is corrupt: {0}")]
    Format(#[from] serde_json::Error),

    #[error("a credential for {platform} / {model} already exists")]
    Duplicate { platform: String, model: String },

    #[error("credential {0} not found")]
    NotFound(CredentialId),
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
