//! Inkgate core — shared types for the AI generation gateway.
//!
//! - [`types`] — provider configurations, generation requests, text chunks
//! - [`error`] — the error taxonomy shared by adapters and the orchestrator
//! - [`crypto`] — Fernet credential cipher
//! - [`credentials`] — credential store trait + in-memory/JSON implementation
//! - [`config`] — `~/.inkgate/config.json` schema and loader

pub mod config;
pub mod credentials;
pub mod crypto;
pub mod error;
pub mod types;
pub mod utils;

pub use credentials::{mask_api_key, CredentialStore, InMemoryCredentialStore};
pub use crypto::{CredentialCipher, FernetCipher};
pub use error::{
    AdapterInitError, CallErrorKind, DecryptionError, ProviderCallError, StoreError,
    UnsupportedProviderError,
};
pub use types::{
    ApiKey, CredentialId, GenerationMode, GenerationRequest, ProviderConfig, TextChunk, UserId,
    DEFAULT_SYSTEM_PROMPT,
};
