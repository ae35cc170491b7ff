//! OpenAI-compatible chat completions — OpenAI, Qwen (DashScope), Zhipu GLM.
//!
//! All three speak `POST {base}/chat/completions`; they differ only in a few
//! request fields, captured in [`Quirks`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use inkgate_core::{AdapterInitError, ProviderCallError};

use crate::http::{read_json, send_checked};
use crate::sse::{sse_events, SseEvent};
use crate::stream::{normalize, parse_event, Frame, FrameError};
use crate::traits::{AdapterBinding, ProviderAdapter, TextStream};

/// Per-provider request differences.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Quirks {
    /// Ask for a usage chunk at the end of a stream (DashScope).
    pub include_usage: bool,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

pub fn build_openai(binding: AdapterBinding) -> Result<Box<dyn ProviderAdapter>, AdapterInitError> {
    Ok(Box::new(OpenAiCompatAdapter::new(binding, Quirks::default())))
}

pub fn build_qwen(binding: AdapterBinding) -> Result<Box<dyn ProviderAdapter>, AdapterInitError> {
    let quirks = Quirks {
        include_usage: true,
        ..Quirks::default()
    };
    Ok(Box::new(OpenAiCompatAdapter::new(binding, quirks)))
}

pub fn build_glm(binding: AdapterBinding) -> Result<Box<dyn ProviderAdapter>, AdapterInitError> {
    let quirks = Quirks {
        include_usage: false,
        temperature: Some(0.7),
        max_tokens: Some(2048),
    };
    Ok(Box::new(OpenAiCompatAdapter::new(binding, quirks)))
}

// ─────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(crate) struct ChatMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Choice {
    #[serde(default)]
    pub message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChunkChoice {
    #[serde(default)]
    pub delta: Option<Delta>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Delta {
    #[serde(default)]
    pub content: Option<String>,
}

/// First choice's message content of a complete response.
pub(crate) fn completion_text(provider: &str, response: ChatResponse) -> Result<String, ProviderCallError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderCallError::invalid_response(provider, "response has no choices"))?;
    Ok(choice.message.and_then(|m| m.content).unwrap_or_default())
}

/// Interpret one `chat.completion.chunk` event.
///
/// A chunk with a `finish_reason` is the last one; its content, if any, is
/// still emitted. Chunks without choices (usage reports) carry no text.
pub(crate) fn chunk_frame(provider: &str, event: &SseEvent) -> Result<Frame, FrameError> {
    let value: Value = parse_event(provider, event)?;
    let chunk: ChatChunk = serde_json::from_value(value)?;

    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(Frame::Skip);
    };
    let text = choice.delta.and_then(|d| d.content).unwrap_or_default();
    if choice.finish_reason.is_some() {
        Ok(Frame::Last(text))
    } else {
        Ok(Frame::Text(text))
    }
}

// ─────────────────────────────────────────────
// OpenAiCompatAdapter
// ─────────────────────────────────────────────

/// Adapter for any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiCompatAdapter {
    binding: AdapterBinding,
    quirks: Quirks,
}

impl std::fmt::Debug for OpenAiCompatAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatAdapter")
            .field("provider", &self.binding.spec.display_name)
            .field("base_url", &self.binding.base_url)
            .field("model", &self.binding.model)
            .field("quirks", &self.quirks)
            .finish()
    }
}

impl OpenAiCompatAdapter {
    pub fn new(binding: AdapterBinding, quirks: Quirks) -> Self {
        Self { binding, quirks }
    }

    /// Full chat completions URL. A base that already ends in
    /// `/chat/completions` is used as is.
    fn completions_url(&self) -> String {
        let base = &self.binding.base_url;
        if base.ends_with("/chat/completions") {
            base.clone()
        } else {
            format!("{}/chat/completions", base)
        }
    }

    fn request<'a>(&'a self, prompt: &'a str, system_prompt: &'a str, stream: bool) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.binding.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            stream,
            stream_options: (stream && self.quirks.include_usage).then_some(StreamOptions {
                include_usage: true,
            }),
            temperature: self.quirks.temperature,
            max_tokens: self.quirks.max_tokens,
        }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatAdapter {
    fn provider_id(&self) -> &'static str {
        self.binding.provider()
    }

    fn model(&self) -> &str {
        &self.binding.model
    }

    fn base_url(&self) -> &str {
        &self.binding.base_url
    }

    async fn generate_complete(
        &self,
        prompt: &str,
        system_prompt: &str,
    ) -> Result<String, ProviderCallError> {
        let provider = self.provider_id();
        debug!(provider, model = %self.binding.model, "Calling chat completions");

        let request = self
            .binding
            .client
            .post(self.completions_url())
            .bearer_auth(self.binding.api_key.expose())
            .timeout(self.binding.settings.request_timeout)
            .json(&self.request(prompt, system_prompt, false));

        let response = send_checked(provider, request).await?;
        let body: ChatResponse = read_json(provider, response).await?;
        completion_text(provider, body)
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        system_prompt: &str,
    ) -> Result<TextStream, ProviderCallError> {
        let provider = self.provider_id();
        debug!(provider, model = %self.binding.model, "Opening chat completions stream");

        let request = self
            .binding
            .client
            .post(self.completions_url())
            .bearer_auth(self.binding.api_key.expose())
            .timeout(self.binding.settings.stream_timeout)
            .json(&self.request(prompt, system_prompt, true));

        let response = send_checked(provider, request).await?;
        Ok(normalize(
            provider,
            sse_events(provider, response),
            self.binding.settings.max_malformed_events,
            move |event| chunk_frame(provider, event),
        ))
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::resolve;
    use crate::traits::AdapterParams;
    use futures_util::StreamExt;
    use inkgate_core::{ApiKey, CallErrorKind};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(id: &str, base: &str) -> Box<dyn ProviderAdapter> {
        resolve(id)
            .unwrap()
            .build(
                AdapterParams::new(ApiKey::new("test-key-123"), reqwest::Client::new())
                    .with_base_url(Some(base.to_string())),
            )
            .unwrap()
    }

    fn sse_body(events: &[&str]) -> String {
        events.iter().map(|e| format!("data: {e}\n\n")).collect()
    }

    fn sse_response(events: &[&str]) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .insert_header("content-type", "text/event-stream")
            .set_body_string(sse_body(events))
    }

    async fn collect(stream: TextStream) -> Vec<Result<String, ProviderCallError>> {
        stream.collect().await
    }

    // ── Unit tests ──

    #[test]
    fn test_completions_url() {
        let binding_url = |base: &str| {
            let spec = resolve("glm").unwrap();
            let binding = AdapterParams::new(ApiKey::new("k"), reqwest::Client::new())
                .with_base_url(Some(base.to_string()))
                .bind(spec)
                .unwrap();
            OpenAiCompatAdapter::new(binding, Quirks::default()).completions_url()
        };
        assert_eq!(
            binding_url("https://open.bigmodel.cn/api/paas/v4/"),
            "https://open.bigmodel.cn/api/paas/v4/chat/completions"
        );
        assert_eq!(
            binding_url("https://open.bigmodel.cn/api/paas/v4/chat/completions"),
            "https://open.bigmodel.cn/api/paas/v4/chat/completions"
        );
    }

    #[test]
    fn test_qwen_requests_usage_only_when_streaming() {
        let spec = resolve("qwen").unwrap();
        let binding = AdapterParams::new(ApiKey::new("k"), reqwest::Client::new())
            .bind(spec)
            .unwrap();
        let adapter = OpenAiCompatAdapter::new(
            binding,
            Quirks {
                include_usage: true,
                ..Quirks::default()
            },
        );
        let streaming = serde_json::to_value(adapter.request("p", "s", true)).unwrap();
        assert_eq!(streaming["stream_options"]["include_usage"], true);
        let single = serde_json::to_value(adapter.request("p", "s", false)).unwrap();
        assert!(single.get("stream_options").is_none());
        assert!(single.get("stream").is_none());
    }

    // ── Integration tests with mock server ──

    #[tokio::test]
    async fn test_complete_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key-123"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-3.5-turbo",
                "messages": [
                    { "role": "system", "content": "Be brief." },
                    { "role": "user", "content": "Say hi" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-test",
                "choices": [{ "message": { "content": "Hi." }, "finish_reason": "stop" }]
            })))
            .mount(&server)
            .await;

        let text = adapter("openai", &server.uri())
            .generate_complete("Say hi", "Be brief.")
            .await
            .unwrap();
        assert_eq!(text, "Hi.");
    }

    #[tokio::test]
    async fn test_glm_sends_sampling_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "model": "glm-4",
                "temperature": 0.7,
                "max_tokens": 2048
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "content": "ok" } }]
            })))
            .mount(&server)
            .await;

        let text = adapter("glm", &server.uri())
            .generate_complete("p", "s")
            .await
            .unwrap();
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn test_status_classification() {
        for (status, kind) in [
            (401, CallErrorKind::Authentication),
            (429, CallErrorKind::RateLimited),
            (500, CallErrorKind::Upstream),
        ] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/chat/completions"))
                .respond_with(ResponseTemplate::new(status).set_body_json(serde_json::json!({
                    "error": { "message": "nope", "type": "some_error" }
                })))
                .mount(&server)
                .await;

            let err = adapter("openai", &server.uri())
                .generate_complete("p", "s")
                .await
                .unwrap_err();
            assert_eq!(err.kind, kind, "status {status}");
            assert_eq!(err.status, Some(status));
            assert_eq!(err.provider, "openai");
            assert_eq!(err.message, "nope");
        }
    }

    #[tokio::test]
    async fn test_empty_choices_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })))
            .mount(&server)
            .await;

        let err = adapter("openai", &server.uri())
            .generate_complete("p", "s")
            .await
            .unwrap_err();
        assert_eq!(err.kind, CallErrorKind::InvalidResponse);
    }

    #[tokio::test]
    async fn test_network_error() {
        let err = adapter("openai", "http://127.0.0.1:1")
            .generate_complete("p", "s")
            .await
            .unwrap_err();
        assert_eq!(err.kind, CallErrorKind::Network);
    }

    #[tokio::test]
    async fn test_stream_deltas_and_done() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({ "stream": true })))
            .respond_with(sse_response(&[
                r#"{"choices":[{"delta":{"role":"assistant","content":""}}]}"#,
                r#"{"choices":[{"delta":{"content":"He"}}]}"#,
                r#"{"choices":[{"delta":{"content":" "}}]}"#,
                r#"{"choices":[{"delta":{"content":"llo"}}]}"#,
                "[DONE]",
            ]))
            .mount(&server)
            .await;

        let stream = adapter("openai", &server.uri())
            .generate_stream("p", "s")
            .await
            .unwrap();
        let chunks: Vec<String> = collect(stream).await.into_iter().map(Result::unwrap).collect();
        assert_eq!(chunks, vec!["He", "llo"]);
    }

    #[tokio::test]
    async fn test_stream_stops_at_finish_reason() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(sse_response(&[
                r#"{"choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}"#,
                r#"{"choices":[{"delta":{"content":"lo"},"finish_reason":"stop"}]}"#,
                r#"{"choices":[],"usage":{"total_tokens":12}}"#,
                r#"{"choices":[{"delta":{"content":"ignored"}}]}"#,
            ]))
            .mount(&server)
            .await;

        let stream = adapter("qwen", &server.uri())
            .generate_stream("p", "s")
            .await
            .unwrap();
        let chunks: Vec<String> = collect(stream).await.into_iter().map(Result::unwrap).collect();
        assert_eq!(chunks, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_stream_skips_malformed_line() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(sse_response(&[
                r#"{"choices":[{"delta":{"content":"a"}}]}"#,
                "{not json",
                r#"{"choices":[{"delta":{"content":"b"}}]}"#,
                "[DONE]",
            ]))
            .mount(&server)
            .await;

        let stream = adapter("openai", &server.uri())
            .generate_stream("p", "s")
            .await
            .unwrap();
        let chunks: Vec<String> = collect(stream).await.into_iter().map(Result::unwrap).collect();
        assert_eq!(chunks, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_stream_rejected_before_first_byte() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": { "message": "Rate limit reached", "code": "rate_limit_exceeded" }
            })))
            .mount(&server)
            .await;

        let err = adapter("openai", &server.uri())
            .generate_stream("p", "s")
            .await
            .err()
            .unwrap();
        assert!(err.is_rate_limited());
        assert_eq!(err.code.as_deref(), Some("rate_limit_exceeded"));
    }
}
