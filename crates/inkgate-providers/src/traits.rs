//! Provider adapter trait — the one contract every AI backend implements.
//!
//! An adapter is bound to one resolved provider configuration: decrypted key,
//! base URL, model, and a shared HTTP client. It is built per call and
//! dropped when the call ends.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::Stream;

use inkgate_core::{AdapterInitError, ApiKey, ProviderCallError};

use crate::registry::ProviderSpec;

/// Incremental text deltas. Owns the underlying HTTP response; dropping the
/// stream closes the connection.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, ProviderCallError>> + Send>>;

/// Per-call limits, applied identically to every provider.
#[derive(Clone, Debug)]
pub struct RequestSettings {
    /// Whole-request limit for single-shot calls.
    pub request_timeout: Duration,
    /// Whole-stream limit for streaming calls.
    pub stream_timeout: Duration,
    /// Consecutive malformed stream events tolerated before failing.
    pub max_malformed_events: u32,
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(120),
            stream_timeout: Duration::from_secs(600),
            max_malformed_events: 8,
        }
    }
}

/// Inputs for constructing an adapter. `None` overrides mean "provider default".
#[derive(Debug)]
pub struct AdapterParams {
    pub api_key: ApiKey,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub client: reqwest::Client,
    pub settings: RequestSettings,
}

impl AdapterParams {
    pub fn new(api_key: ApiKey, client: reqwest::Client) -> Self {
        Self {
            api_key,
            base_url: None,
            model: None,
            client,
            settings: RequestSettings::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_settings(mut self, settings: RequestSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Validate and resolve against a provider spec.
    ///
    /// Fails on a blank key or a base URL that is not an absolute http(s) URL.
    pub fn bind(self, spec: &'static ProviderSpec) -> Result<AdapterBinding, AdapterInitError> {
        if self.api_key.is_blank() {
            return Err(AdapterInitError::MissingApiKey {
                provider: spec.id.to_string(),
            });
        }

        let base_url = spec.resolve_base_url(self.base_url.as_deref());
        let parsed = reqwest::Url::parse(&base_url).map_err(|_| AdapterInitError::InvalidBaseUrl {
            provider: spec.id.to_string(),
            url: base_url.clone(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(AdapterInitError::InvalidBaseUrl {
                provider: spec.id.to_string(),
                url: base_url,
            });
        }

        Ok(AdapterBinding {
            spec,
            api_key: self.api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: spec.resolve_model(self.model.as_deref()),
            client: self.client,
            settings: self.settings,
        })
    }
}

/// Validated, resolved adapter inputs.
#[derive(Debug)]
pub struct AdapterBinding {
    pub spec: &'static ProviderSpec,
    pub api_key: ApiKey,
    /// Base URL without a trailing slash.
    pub base_url: String,
    pub model: String,
    pub client: reqwest::Client,
    pub settings: RequestSettings,
}

impl AdapterBinding {
    pub fn provider(&self) -> &'static str {
        self.spec.id
    }
}

/// Trait that every provider adapter implements.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Registry id (e.g. `"qwen"`).
    fn provider_id(&self) -> &'static str;

    /// Resolved model name sent upstream.
    fn model(&self) -> &str;

    /// Resolved base URL or endpoint.
    fn base_url(&self) -> &str;

    /// Send one request and return the whole generated text.
    async fn generate_complete(
        &self,
        prompt: &str,
        system_prompt: &str,
    ) -> Result<String, ProviderCallError>;

    /// Open a streaming request.
    ///
    /// Errors before the first byte (connection, non-2xx status) are returned
    /// here; errors after that arrive as items of the stream.
    async fn generate_stream(
        &self,
        prompt: &str,
        system_prompt: &str,
    ) -> Result<TextStream, ProviderCallError>;
}
