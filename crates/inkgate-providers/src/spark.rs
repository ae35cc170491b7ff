//! iFlytek Spark HTTP API.
//!
//! Request and response bodies are OpenAI-shaped, but the endpoint is a
//! fixed URL and every body carries `code`/`message`; a non-zero `code` is
//! an error even on HTTP 200.

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use inkgate_core::{AdapterInitError, ProviderCallError};

use crate::http::{read_json, send_checked};
use crate::openai_compat::{chunk_frame, completion_text, ChatMessage, ChatResponse};
use crate::sse::sse_events;
use crate::stream::normalize;
use crate::traits::{AdapterBinding, ProviderAdapter, TextStream};

const MAX_TOKENS: u32 = 2048;
const TEMPERATURE: f32 = 0.7;

pub fn build(binding: AdapterBinding) -> Result<Box<dyn ProviderAdapter>, AdapterInitError> {
    Ok(Box::new(SparkAdapter { binding }))
}

#[derive(Debug, Serialize)]
struct SparkRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

/// Adapter for the Spark chat completions endpoint.
pub struct SparkAdapter {
    binding: AdapterBinding,
}

impl SparkAdapter {
    fn request(&self, prompt: &str, system_prompt: &str, stream: bool) -> reqwest::RequestBuilder {
        let body = SparkRequest {
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
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            stream,
        };
        let timeout = if stream {
            self.binding.settings.stream_timeout
        } else {
            self.binding.settings.request_timeout
        };
        self.binding
            .client
            .post(&self.binding.base_url)
            .bearer_auth(self.binding.api_key.expose())
            .timeout(timeout)
            .json(&body)
    }
}

#[async_trait]
impl ProviderAdapter for SparkAdapter {
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
        debug!(provider, model = %self.binding.model, "Calling Spark");

        let response = send_checked(provider, self.request(prompt, system_prompt, false)).await?;
        let body: ChatResponse = read_json(provider, response).await?;
        completion_text(provider, body)
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        system_prompt: &str,
    ) -> Result<TextStream, ProviderCallError> {
        let provider = self.provider_id();
        debug!(provider, model = %self.binding.model, "Opening Spark stream");

        let response = send_checked(provider, self.request(prompt, system_prompt, true)).await?;
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
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(base: &str) -> Box<dyn ProviderAdapter> {
        resolve("spark")
            .unwrap()
            .build(
                AdapterParams::new(ApiKey::new("spark-pass"), reqwest::Client::new())
                    .with_base_url(Some(base.to_string())),
            )
            .unwrap()
    }

    #[tokio::test]
    async fn test_complete_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer spark-pass"))
            .and(body_partial_json(serde_json::json!({
                "model": "spark-4.0",
                "max_tokens": 2048,
                "messages": [
                    { "role": "system", "content": "Be brief." },
                    { "role": "user", "content": "Say hi" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0,
                "message": "Success",
                "sid": "cha000b0001",
                "choices": [{ "message": { "role": "assistant", "content": "Hi." }, "index": 0 }]
            })))
            .mount(&server)
            .await;

        let text = adapter(&server.uri()).generate_complete("Say hi", "Be brief.").await.unwrap();
        assert_eq!(text, "Hi.");
    }

    #[tokio::test]
    async fn test_nonzero_code_on_200() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 11200,
                "message": "AppIdNoAuthError",
                "sid": "cha000b0002"
            })))
            .mount(&server)
            .await;

        let err = adapter(&server.uri()).generate_complete("p", "s").await.unwrap_err();
        assert_eq!(err.kind, CallErrorKind::Authentication);
        assert_eq!(err.code.as_deref(), Some("11200"));
    }

    #[tokio::test]
    async fn test_stream_until_done_sentinel() {
        let body = [
            r#"{"code":0,"message":"Success","choices":[{"delta":{"role":"assistant","content":"He"},"index":0}]}"#,
            r#"{"code":0,"message":"Success","choices":[{"delta":{"role":"assistant","content":"llo"},"index":0}]}"#,
            "[DONE]",
            r#"{"code":0,"message":"Success","choices":[{"delta":{"content":"late"},"index":0}]}"#,
        ]
        .iter()
        .map(|e| format!("data: {e}\n\n"))
        .collect::<String>();

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
    async fn test_stream_error_code_mid_stream() {
        let body = [
            r#"{"code":0,"message":"Success","choices":[{"delta":{"content":"He"},"index":0}]}"#,
            r#"{"code":11202,"message":"AppIdQpsOverFlowError"}"#,
        ]
        .iter()
        .map(|e| format!("data: {e}\n\n"))
        .collect::<String>();

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
        assert_eq!(stream.next().await.unwrap().unwrap(), "He");
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(err.is_rate_limited());
    }
}
