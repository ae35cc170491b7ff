//! Generation orchestrator — one call from request to text or stream.
//!
//! Per call: resolve the provider configuration, decrypt the credential
//! once, build a fresh adapter and dispatch in the requested mode. The
//! decrypted key lives in the adapter and is zeroed when it drops.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use inkgate_core::config::{Config, DefaultProviderConfig};
use inkgate_core::{
    AdapterInitError, CredentialCipher, CredentialId, CredentialStore, GenerationMode,
    GenerationRequest, ProviderConfig, UserId,
};
use inkgate_providers::{build_client, resolve, AdapterParams, ProviderAdapter, RequestSettings};

use crate::aliases::PlatformAliases;
use crate::error::GatewayError;
use crate::stream::GenerationStream;

/// Outcome of a successful dispatch.
#[derive(Debug)]
pub enum GenerationResult {
    Complete(String),
    Stream(GenerationStream),
}

impl GenerationResult {
    /// The full text, draining the stream if needed.
    pub async fn into_text(self) -> Result<String, GatewayError> {
        match self {
            GenerationResult::Complete(text) => Ok(text),
            GenerationResult::Stream(stream) => stream.collect_text().await,
        }
    }
}

/// Where the configuration for a call came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ConfigSource {
    Explicit,
    Stored,
    Fallback,
}

/// Turns [`GenerationRequest`]s into provider calls.
pub struct Orchestrator {
    store: Arc<dyn CredentialStore>,
    cipher: Arc<dyn CredentialCipher>,
    client: reqwest::Client,
    aliases: PlatformAliases,
    settings: RequestSettings,
    idle_timeout: Duration,
    stream_buffer: usize,
    system_prompt: String,
    fallback: Option<ProviderConfig>,
}

impl Orchestrator {
    /// Build an orchestrator with limits, aliases and the default system
    /// prompt taken from `config`.
    pub fn new(
        store: Arc<dyn CredentialStore>,
        cipher: Arc<dyn CredentialCipher>,
        config: &Config,
    ) -> Result<Self, AdapterInitError> {
        let client = build_client(config.timeouts.connect())?;
        Ok(Self {
            store,
            cipher,
            client,
            aliases: PlatformAliases::new(config.aliases.clone()),
            settings: RequestSettings {
                request_timeout: config.timeouts.request(),
                stream_timeout: config.timeouts.stream(),
                max_malformed_events: config.gateway.max_malformed_events,
            },
            idle_timeout: config.timeouts.idle(),
            stream_buffer: config.gateway.stream_buffer,
            system_prompt: config.gateway.system_prompt.clone(),
            fallback: None,
        })
    }

    /// Configuration used when a user has none stored.
    pub fn with_fallback(mut self, fallback: ProviderConfig) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_aliases(mut self, aliases: PlatformAliases) -> Self {
        self.aliases = aliases;
        self
    }

    /// Run one generation call.
    pub async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResult, GatewayError> {
        let started = Instant::now();
        let user_id = request.user_id;
        let mode = request.mode;

        debug!(user_id = %user_id, mode = %mode, "Resolving provider configuration");
        let (config, source) = self.resolve_config(&request).await?;

        let provider_id = self.aliases.canonical(&config.platform);
        let spec = resolve(&provider_id)?;

        debug!(user_id = %user_id, provider = spec.id, config_id = %config.id, "Decrypting credential");
        let api_key = self
            .cipher
            .decrypt(&config.encrypted_api_key)
            .map_err(|source| {
                warn!(user_id = %user_id, config_id = %config.id, "Credential could not be decrypted");
                GatewayError::Decryption {
                    config_id: config.id,
                    source,
                }
            })?;

        let params = AdapterParams::new(api_key, self.client.clone())
            .with_base_url(config.base_url.clone())
            .with_model(config.model_name.clone())
            .with_settings(self.settings.clone());
        let adapter = spec.build(params).map_err(|source| GatewayError::AdapterInit {
            provider: spec.id.to_string(),
            source,
        })?;

        let system_prompt = request.system_prompt.as_deref().unwrap_or(&self.system_prompt);
        debug!(
            user_id = %user_id,
            provider = spec.id,
            family = spec.family.label(),
            model = adapter.model(),
            mode = %mode,
            "Dispatching generation"
        );

        let result = self
            .dispatch(adapter.as_ref(), mode, &request.prompt, system_prompt)
            .await
            .inspect_err(|e| {
                if let Some(call) = e.provider_error() {
                    error!(
                        user_id = %user_id,
                        provider = spec.id,
                        mode = %mode,
                        kind = %call.kind,
                        status = ?call.status,
                        "Generation failed"
                    );
                }
            })?;

        if source != ConfigSource::Fallback {
            self.record_usage(user_id, config.id).await;
        }

        debug!(
            user_id = %user_id,
            provider = spec.id,
            mode = %mode,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Generation dispatched"
        );
        Ok(result)
    }

    async fn resolve_config(
        &self,
        request: &GenerationRequest,
    ) -> Result<(ProviderConfig, ConfigSource), GatewayError> {
        let user_id = request.user_id;

        if let Some(config) = &request.explicit_config {
            let foreign = || {
                warn!(user_id = %user_id, config_id = %config.id, "Explicit configuration belongs to another user");
                GatewayError::ForeignConfiguration {
                    user_id,
                    config_id: config.id,
                }
            };
            if config.owner != user_id {
                return Err(foreign());
            }
            if config.id == CredentialId::UNSTORED {
                return Ok((config.clone(), ConfigSource::Explicit));
            }
            // The caller's copy may have been edited; trust only the store.
            return match self.store.fetch_config(user_id, config.id).await? {
                Some(stored) => Ok((stored, ConfigSource::Explicit)),
                None => Err(foreign()),
            };
        }

        if let Some(config) = self.store.fetch_config_for_user(user_id).await? {
            return Ok((config, ConfigSource::Stored));
        }

        match &self.fallback {
            Some(config) => {
                debug!(user_id = %user_id, platform = %config.platform, "Using fallback configuration");
                Ok((config.clone(), ConfigSource::Fallback))
            }
            None => Err(GatewayError::NoConfiguration { user_id }),
        }
    }

    async fn dispatch(
        &self,
        adapter: &dyn ProviderAdapter,
        mode: GenerationMode,
        prompt: &str,
        system_prompt: &str,
    ) -> Result<GenerationResult, GatewayError> {
        match mode {
            GenerationMode::Complete => adapter
                .generate_complete(prompt, system_prompt)
                .await
                .map(GenerationResult::Complete)
                .map_err(|e| GatewayError::provider(mode, e)),
            GenerationMode::Stream => {
                let upstream = adapter
                    .generate_stream(prompt, system_prompt)
                    .await
                    .map_err(|e| GatewayError::provider(mode, e))?;
                Ok(GenerationResult::Stream(GenerationStream::spawn(
                    adapter.provider_id(),
                    adapter.model().to_string(),
                    upstream,
                    self.stream_buffer,
                    self.idle_timeout,
                )))
            }
        }
    }

    async fn record_usage(&self, user_id: UserId, config_id: CredentialId) {
        if let Err(e) = self.store.mark_used(user_id, config_id).await {
            warn!(user_id = %user_id, config_id = %config_id, error = %e, "Failed to record credential usage");
        }
    }
}

/// Fallback configuration from the `defaultProvider` section, with its key
/// encrypted under `cipher`. `None` unless both provider and key are set.
pub fn fallback_config(
    default: &DefaultProviderConfig,
    cipher: &dyn CredentialCipher,
) -> Option<ProviderConfig> {
    if !default.is_configured() {
        return None;
    }
    Some(
        ProviderConfig::new(
            CredentialId::UNSTORED,
            UserId(0),
            default.provider.trim(),
            cipher.encrypt(default.api_key.trim()),
        )
        .with_base_url(default.api_base.clone())
        .with_model(default.model.clone()),
    )
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use inkgate_core::{CallErrorKind, FernetCipher, InMemoryCredentialStore, StoreError};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY: &str = "cw_0x689RpI-jtRR7oE8h_eQsKImvJapLeSbXpwF4e4=";
    const USER: UserId = UserId(7);

    fn cipher() -> Arc<FernetCipher> {
        Arc::new(FernetCipher::new(KEY).unwrap())
    }

    fn orchestrator(store: Arc<dyn CredentialStore>) -> Orchestrator {
        Orchestrator::new(store, cipher(), &Config::default()).unwrap()
    }

    async fn store_with(platform: &str, plain_key: &str, base: &str) -> Arc<InMemoryCredentialStore> {
        let store = Arc::new(InMemoryCredentialStore::new());
        store
            .add(USER, platform, cipher().encrypt(plain_key), Some(base.to_string()), None)
            .await
            .unwrap();
        store
    }

    async fn mock_chat(server: &MockServer, content: &str) {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_complete_with_stored_config() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-user-7"))
            .and(body_partial_json(serde_json::json!({
                "messages": [
                    { "role": "system", "content": "You are a helpful assistant." },
                    { "role": "user", "content": "Say hi" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "content": "Hi." } }]
            })))
            .mount(&server)
            .await;

        let store = store_with("OpenAI", "sk-user-7", &server.uri()).await;
        let result = orchestrator(store.clone())
            .generate(GenerationRequest::complete(USER, "Say hi"))
            .await
            .unwrap();

        assert!(matches!(&result, GenerationResult::Complete(text) if text == "Hi."));
        let used = store.fetch_config_for_user(USER).await.unwrap().unwrap();
        assert!(used.last_used_at.is_some());
    }

    #[tokio::test]
    async fn test_stream_with_stored_config() {
        let body: String = [
            r#"{"choices":[{"delta":{"content":"He"}}]}"#,
            r#"{"choices":[{"delta":{"content":""}}]}"#,
            r#"{"choices":[{"delta":{"content":"llo"}}]}"#,
            "[DONE]",
        ]
        .iter()
        .map(|e| format!("data: {e}\n\n"))
        .collect();

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({ "stream": true })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let store = store_with("openai", "sk-user-7", &server.uri()).await;
        let result = orchestrator(store)
            .generate(GenerationRequest::stream(USER, "p"))
            .await
            .unwrap();
        let GenerationResult::Stream(stream) = result else {
            panic!("expected a stream");
        };
        assert_eq!(stream.provider(), "openai");
        let chunks: Vec<String> = stream.map(|c| c.unwrap().content).collect().await;
        assert_eq!(chunks, vec!["He", "llo"]);
    }

    #[tokio::test]
    async fn test_no_configuration() {
        let err = orchestrator(Arc::new(InMemoryCredentialStore::new()))
            .generate(GenerationRequest::complete(USER, "p"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NoConfiguration { user_id } if user_id == USER));
    }

    #[tokio::test]
    async fn test_fallback_used_when_user_has_none() {
        let server = MockServer::start().await;
        mock_chat(&server, "fallback").await;

        let default = DefaultProviderConfig {
            provider: "qwen".into(),
            api_key: "sk-deploy".into(),
            api_base: Some(server.uri()),
            model: None,
        };
        let fallback = fallback_config(&default, cipher().as_ref()).unwrap();
        let store = Arc::new(InMemoryCredentialStore::new());
        let text = orchestrator(store.clone())
            .with_fallback(fallback)
            .generate(GenerationRequest::complete(USER, "p"))
            .await
            .unwrap()
            .into_text()
            .await
            .unwrap();
        assert_eq!(text, "fallback");
        assert!(store.list_for_user(USER).await.is_empty());
    }

    #[test]
    fn test_fallback_requires_key() {
        let default = DefaultProviderConfig {
            provider: "qwen".into(),
            ..Default::default()
        };
        assert!(fallback_config(&default, cipher().as_ref()).is_none());
    }

    #[tokio::test]
    async fn test_explicit_config_of_other_user_rejected() {
        let store = store_with("openai", "sk-user-7", "https://api.example").await;
        let config = store.list_for_user(USER).await.remove(0);
        let err = orchestrator(store)
            .generate(GenerationRequest::complete(UserId(8), "p").with_config(config))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::ForeignConfiguration { .. }));
    }

    #[tokio::test]
    async fn test_explicit_config_owner_checked_against_store() {
        let store = store_with("openai", "sk-user-7", "https://api.example").await;
        let mut config = store.list_for_user(USER).await.remove(0);
        config.owner = UserId(8);
        let err = orchestrator(store)
            .generate(GenerationRequest::complete(UserId(8), "p").with_config(config))
            .await
            .unwrap_err();
        match err {
            GatewayError::ForeignConfiguration { user_id, config_id } => {
                assert_eq!(user_id, UserId(8));
                assert_eq!(config_id, CredentialId(1));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_explicit_config_uses_stored_record() {
        let stored = MockServer::start().await;
        mock_chat(&stored, "stored").await;

        let store = store_with("openai", "sk-a", &stored.uri()).await;
        let mut config = store.list_for_user(USER).await.remove(0);
        config.base_url = Some("http://127.0.0.1:9".into());

        let text = orchestrator(store)
            .generate(GenerationRequest::complete(USER, "p").with_config(config))
            .await
            .unwrap()
            .into_text()
            .await
            .unwrap();
        assert_eq!(text, "stored");
    }

    #[tokio::test]
    async fn test_explicit_config_wins_over_stored() {
        let stored = MockServer::start().await;
        mock_chat(&stored, "stored").await;
        let explicit = MockServer::start().await;
        mock_chat(&explicit, "explicit").await;

        let store = store_with("openai", "sk-a", &stored.uri()).await;
        let config = store
            .add(USER, "glm", cipher().encrypt("sk-b"), Some(explicit.uri()), None)
            .await
            .unwrap();
        store.mark_used(USER, CredentialId(1)).await.unwrap();

        let text = orchestrator(store)
            .generate(GenerationRequest::complete(USER, "p").with_config(config))
            .await
            .unwrap()
            .into_text()
            .await
            .unwrap();
        assert_eq!(text, "explicit");
    }

    #[tokio::test]
    async fn test_unsupported_platform() {
        let store = store_with("Mistral", "sk", "https://api.example").await;
        let err = orchestrator(store)
            .generate(GenerationRequest::complete(USER, "p"))
            .await
            .unwrap_err();
        match err {
            GatewayError::UnsupportedProvider(e) => {
                assert_eq!(e.requested, "mistral");
                assert_eq!(e.supported.len(), 8);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_undecryptable_credential() {
        let store = Arc::new(InMemoryCredentialStore::new());
        store
            .add(USER, "openai", "not-a-token".into(), None, None)
            .await
            .unwrap();
        let err = orchestrator(store)
            .generate(GenerationRequest::complete(USER, "p"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Decryption { .. }));
    }

    #[tokio::test]
    async fn test_empty_key_fails_construction() {
        let store = store_with("anthropic", "", "https://api.example").await;
        let err = orchestrator(store)
            .generate(GenerationRequest::complete(USER, "p"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::AdapterInit { source: AdapterInitError::MissingApiKey { .. }, .. }
        ));
    }

    #[tokio::test]
    async fn test_provider_failure_carries_mode() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": { "message": "Incorrect API key provided", "code": "invalid_api_key" }
            })))
            .mount(&server)
            .await;

        let store = store_with("openai", "sk-bad", &server.uri()).await;
        let err = orchestrator(store.clone())
            .generate(GenerationRequest::stream(USER, "p"))
            .await
            .unwrap_err();
        match &err {
            GatewayError::Provider { provider, mode, source } => {
                assert_eq!(provider, "openai");
                assert_eq!(*mode, GenerationMode::Stream);
                assert_eq!(source.kind, CallErrorKind::Authentication);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!err.is_retryable());
        let config = store.fetch_config_for_user(USER).await.unwrap().unwrap();
        assert!(config.last_used_at.is_none());
    }

    struct ReadOnlyStore(InMemoryCredentialStore);

    #[async_trait]
    impl CredentialStore for ReadOnlyStore {
        async fn fetch_config_for_user(
            &self,
            user_id: UserId,
        ) -> Result<Option<ProviderConfig>, StoreError> {
            self.0.fetch_config_for_user(user_id).await
        }

        async fn fetch_config(
            &self,
            user_id: UserId,
            config_id: CredentialId,
        ) -> Result<Option<ProviderConfig>, StoreError> {
            self.0.fetch_config(user_id, config_id).await
        }

        async fn mark_used(&self, _: UserId, _: CredentialId) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::other("read-only")))
        }
    }

    #[tokio::test]
    async fn test_usage_recording_failure_is_not_fatal() {
        let server = MockServer::start().await;
        mock_chat(&server, "ok").await;

        let inner = InMemoryCredentialStore::new();
        inner
            .add(USER, "openai", cipher().encrypt("sk"), Some(server.uri()), None)
            .await
            .unwrap();
        let text = orchestrator(Arc::new(ReadOnlyStore(inner)))
            .generate(GenerationRequest::complete(USER, "p"))
            .await
            .unwrap()
            .into_text()
            .await
            .unwrap();
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn test_request_system_prompt_overrides_default() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "messages": [{ "role": "system", "content": "Answer in French." }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "content": "Salut." } }]
            })))
            .mount(&server)
            .await;

        let store = store_with("openai", "sk", &server.uri()).await;
        let text = orchestrator(store)
            .generate(GenerationRequest::complete(USER, "Say hi").with_system_prompt("Answer in French."))
            .await
            .unwrap()
            .into_text()
            .await
            .unwrap();
        assert_eq!(text, "Salut.");
    }
}
