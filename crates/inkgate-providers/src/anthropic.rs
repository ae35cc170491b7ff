//! Anthropic messages API.
//!
//! System prompt travels in its own field; streaming uses typed SSE events
//! of which only `content_block_delta` carries text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use inkgate_core::{AdapterInitError, ProviderCallError};

use crate::http::{read_json, send_checked};
use crate::sse::{sse_events, SseEvent};
use crate::stream::{normalize, parse_event, Frame, FrameError};
use crate::traits::{AdapterBinding, ProviderAdapter, TextStream};

const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

pub fn build(binding: AdapterBinding) -> Result<Box<dyn ProviderAdapter>, AdapterInitError> {
    Ok(Box::new(AnthropicAdapter { binding }))
}

#[derive(Debug, Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: [UserMessage<'a>; 1],
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Adapter for the Anthropic messages API.
pub struct AnthropicAdapter {
    binding: AdapterBinding,
}

impl AnthropicAdapter {
    /// `{base}/v1/messages`, tolerating a base that already includes `/v1`.
    fn messages_url(&self) -> String {
        let base = &self.binding.base_url;
        if base.ends_with("/v1/messages") {
            base.clone()
        } else if base.ends_with("/v1") {
            format!("{base}/messages")
        } else {
            format!("{base}/v1/messages")
        }
    }

    fn request(&self, prompt: &str, system_prompt: &str, stream: bool) -> reqwest::RequestBuilder {
        let body = MessagesRequest {
            model: &self.binding.model,
            max_tokens: MAX_TOKENS,
            system: system_prompt,
            messages: [UserMessage {
                role: "user",
                content: prompt,
            }],
            stream,
        };
        let timeout = if stream {
            self.binding.settings.stream_timeout
        } else {
            self.binding.settings.request_timeout
        };
        self.binding
            .client
            .post(self.messages_url())
            .header("x-api-key", self.binding.api_key.expose())
            .header("anthropic-version", API_VERSION)
            .timeout(timeout)
            .json(&body)
    }
}

/// Interpret one messages-stream event.
fn event_frame(provider: &str, event: &SseEvent) -> Result<Frame, FrameError> {
    let value: Value = parse_event(provider, event)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .or(event.event.as_deref())
        .unwrap_or_default();

    match kind {
        "content_block_delta" => Ok(value
            .pointer("/delta/text")
            .and_then(Value::as_str)
            .map(|t| Frame::Text(t.to_string()))
            .unwrap_or(Frame::Skip)),
        "message_stop" => Ok(Frame::Done),
        "" => Err(FrameError::Malformed("event has no type".into())),
        _ => Ok(Frame::Skip),
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
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
        debug!(provider, model = %self.binding.model, "Calling messages API");

        let response = send_checked(provider, self.request(prompt, system_prompt, false)).await?;
        let body: MessagesResponse = read_json(provider, response).await?;

        body.content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
            .ok_or_else(|| ProviderCallError::invalid_response(provider, "response has no text content block"))
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        system_prompt: &str,
    ) -> Result<TextStream, ProviderCallError> {
        let provider = self.provider_id();
        debug!(provider, model = %self.binding.model, "Opening messages stream");

        let response = send_checked(provider, self.request(prompt, system_prompt, true)).await?;
        Ok(normalize(
            provider,
            sse_events(provider, response),
            self.binding.settings.max_malformed_events,
            move |event| event_frame(provider, event),
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

    fn adapter(base: &str) -> Box<dyn ProviderAdapter> {
        resolve("anthropic")
            .unwrap()
            .build(
                AdapterParams::new(ApiKey::new("sk-ant-test"), reqwest::Client::new())
                    .with_base_url(Some(base.to_string())),
            )
            .unwrap()
    }

    fn typed_event(kind: &str, data: &str) -> String {
        format!("event: {kind}\ndata: {data}\n\n")
    }

    #[test]
    fn test_messages_url_variants() {
        let url = |base: &str| {
            let binding = AdapterParams::new(ApiKey::new("k"), reqwest::Client::new())
                .with_base_url(Some(base.to_string()))
                .bind(resolve("anthropic").unwrap())
                .unwrap();
            AnthropicAdapter { binding }.messages_url()
        };
        assert_eq!(url("https://api.anthropic.com"), "https://api.anthropic.com/v1/messages");
        assert_eq!(url("https://proxy.example/v1"), "https://proxy.example/v1/messages");
        assert_eq!(url("https://proxy.example/v1/messages"), "https://proxy.example/v1/messages");
    }

    #[tokio::test]
    async fn test_complete_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-ant-test"))
            .and(header("anthropic-version", "2023-06-01"))
            .and(body_partial_json(serde_json::json!({
                "model": "claude-3-haiku-20240307",
                "max_tokens": 1024,
                "system": "Be brief.",
                "messages": [{ "role": "user", "content": "Say hi" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "msg_01",
                "type": "message",
                "content": [{ "type": "text", "text": "Hi." }],
                "stop_reason": "end_turn"
            })))
            .mount(&server)
            .await;

        let text = adapter(&server.uri()).generate_complete("Say hi", "Be brief.").await.unwrap();
        assert_eq!(text, "Hi.");
    }

    #[tokio::test]
    async fn test_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "type": "error",
                "error": { "type": "authentication_error", "message": "invalid x-api-key" }
            })))
            .mount(&server)
            .await;

        let err = adapter(&server.uri()).generate_complete("p", "s").await.unwrap_err();
        assert_eq!(err.kind, CallErrorKind::Authentication);
        assert_eq!(err.code.as_deref(), Some("authentication_error"));
    }

    #[tokio::test]
    async fn test_stream_only_text_deltas() {
        let body = [
            typed_event("message_start", r#"{"type":"message_start","message":{"id":"msg_01"}}"#),
            typed_event("content_block_start", r#"{"type":"content_block_start","index":0}"#),
            typed_event("ping", r#"{"type":"ping"}"#),
            typed_event("content_block_delta", r#"{"type":"content_block_delta","delta":{"type":"text_delta","text":"He"}}"#),
            typed_event("content_block_delta", r#"{"type":"content_block_delta","delta":{"type":"text_delta","text":"llo"}}"#),
            typed_event("message_delta", r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"}}"#),
            typed_event("message_stop", r#"{"type":"message_stop"}"#),
            typed_event("content_block_delta", r#"{"type":"content_block_delta","delta":{"text":"late"}}"#),
        ]
        .concat();

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

        let stream = adapter(&server.uri()).generate_stream("p", "s").await.unwrap();
        let chunks: Vec<String> = stream.map(Result::unwrap).collect().await;
        assert_eq!(chunks, vec!["He", "llo"]);
    }

    #[tokio::test]
    async fn test_stream_error_event() {
        let body = [
            typed_event("content_block_delta", r#"{"type":"content_block_delta","delta":{"text":"partial"}}"#),
            typed_event("error", r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#),
        ]
        .concat();

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let mut stream = adapter(&server.uri()).generate_stream("p", "s").await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), "partial");
        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind, CallErrorKind::Upstream);
        assert_eq!(err.message, "Overloaded");
        assert!(stream.next().await.is_none());
    }
}
