//! Gateway errors and their end-user rendering.

use thiserror::Error;

use inkgate_core::{
    AdapterInitError, CallErrorKind, CredentialId, DecryptionError, GenerationMode,
    ProviderCallError, StoreError, UnsupportedProviderError, UserId,
};
use inkgate_providers::registry::find_by_id;

/// Everything a generation call can fail with.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    UnsupportedProvider(#[from] UnsupportedProviderError),

    #[error("user {user_id} has no provider configuration")]
    NoConfiguration { user_id: UserId },

    #[error("configuration {config_id} does not belong to user {user_id}")]
    ForeignConfiguration {
        user_id: UserId,
        config_id: CredentialId,
    },

    #[error("cannot construct {provider} adapter: {source}")]
    AdapterInit {
        provider: String,
        #[source]
        source: AdapterInitError,
    },

    #[error("cannot decrypt credential {config_id}: {source}")]
    Decryption {
        config_id: CredentialId,
        #[source]
        source: DecryptionError,
    },

    #[error("{mode} generation via {provider} failed: {source}")]
    Provider {
        provider: String,
        mode: GenerationMode,
        #[source]
        source: ProviderCallError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("generation was cancelled")]
    Cancelled,
}

impl GatewayError {
    pub(crate) fn provider(mode: GenerationMode, source: ProviderCallError) -> Self {
        GatewayError::Provider {
            provider: source.provider.clone(),
            mode,
            source,
        }
    }

    /// The upstream failure, if this is one.
    pub fn provider_error(&self) -> Option<&ProviderCallError> {
        match self {
            GatewayError::Provider { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Whether the same request may succeed if simply tried again later.
    pub fn is_retryable(&self) -> bool {
        self.provider_error().is_some_and(|e| {
            matches!(
                e.kind,
                CallErrorKind::RateLimited | CallErrorKind::Timeout | CallErrorKind::Network
            )
        })
    }

    /// Actionable text for an end user. Never contains upstream messages.
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::UnsupportedProvider(e) => format!(
                "The AI provider '{}' is not supported. Choose one of: {}.",
                e.requested,
                e.supported.join(", ")
            ),
            GatewayError::NoConfiguration { .. } => {
                "No AI provider is configured. Add an API key in your settings first.".into()
            }
            GatewayError::ForeignConfiguration { .. } => {
                "The selected provider configuration is not available to your account.".into()
            }
            GatewayError::AdapterInit { provider, source } => {
                let name = display_name(provider);
                match source {
                    AdapterInitError::MissingApiKey { .. } => {
                        format!("The API key for {name} is empty. Update it in your settings.")
                    }
                    AdapterInitError::MalformedCredential { .. } => {
                        format!("The {name} credential must be entered as API_KEY,SECRET_KEY.")
                    }
                    AdapterInitError::InvalidBaseUrl { .. } => {
                        format!("The base URL configured for {name} is not a valid http(s) URL.")
                    }
                    AdapterInitError::Transport { .. } => {
                        "The AI service is temporarily unavailable. Please try again later.".into()
                    }
                }
            }
            GatewayError::Decryption { .. } => {
                "The stored API key could not be read. Please enter it again.".into()
            }
            GatewayError::Provider { provider, source, .. } => {
                let name = display_name(provider);
                match source.kind {
                    CallErrorKind::Authentication => {
                        format!("{name} rejected the API key. Check your credentials.")
                    }
                    CallErrorKind::RateLimited => {
                        format!("{name} rate limit reached. Please wait a moment and try again.")
                    }
                    CallErrorKind::Timeout => {
                        format!("{name} did not respond in time. Please try again.")
                    }
                    CallErrorKind::Network => {
                        format!("Could not reach {name}. Check your network connection.")
                    }
                    CallErrorKind::Upstream | CallErrorKind::InvalidResponse => {
                        format!("{name} returned an error. Please try again later.")
                    }
                }
            }
            GatewayError::Store(_) => {
                "Your provider settings could not be loaded. Please try again later.".into()
            }
            GatewayError::Cancelled => "Generation was cancelled.".into(),
        }
    }
}

fn display_name(provider: &str) -> &str {
    find_by_id(provider).map_or(provider, |spec| spec.display_name)
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
